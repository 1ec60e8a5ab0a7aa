//! Answer composer: cache lookup, draft, optional verification, cache write.
//!
//! Linear per job. The composer never retries on its own and never sees an
//! upstream error: the clients below it already turned failures into values.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Datelike;
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::cache::AnswerCache;
use crate::client::{Completion, CompletionClient, CompletionOptions, SearchClient, url_in_allowlist};
use crate::config::{PipelineConfig, PromptConfig};
use crate::domain::{FailureKind, Job, Lang, PipelineEvent};
use crate::freshness;
use crate::messages;
use crate::ports::{
    ChatMessage, Clock, EventSink, HistoryProvider, NoHistory, NoopEventSink, SearchHit,
    SystemClock,
};
use crate::queue::JobState;

/// Sentinel the citation prompt asks the model to return when the documents
/// hold no relevant norm.
pub const NO_SOURCE_SENTINEL: &str = "NO SOURCE";

const AUGMENTED_TEMPERATURE: f32 = 0.35;
const VERIFY_TEMPERATURE: f32 = 0.2;
const CITATION_TEMPERATURE: f32 = 0.1;
const STRICT_CITATION_TEMPERATURE: f32 = 0.05;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)\]>]+").expect("static regex"));

/// "article 12", "статья 5", "пункт 3", "12-modda", ...
static ARTICLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(art\.|article|clause|section|стат(ья|ьи|ье|ью|ей)|пункт\w*|modda|модда|band)\s*\d+|\d+\s*-?\s*(modda|модда|band)",
    )
    .expect("static regex")
});

static SOURCES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*\**(источники|sources|manbalar)\**:").expect("static regex")
});

/// How a job's draft is produced. Chosen once, up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStrategy {
    Plain,
    SearchAugmented,
    CitationRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeOutcome {
    /// Fresh answer from the model.
    Answered,
    /// Served from the answer cache.
    Cached,
    /// Citation mode found nothing authoritative; a fixed text was returned.
    NoSource,
    /// A friendly error text was returned.
    Failed(FailureKind),
}

impl ComposeOutcome {
    pub fn job_state(self) -> JobState {
        match self {
            ComposeOutcome::Failed(_) => JobState::FailedDelivered,
            _ => JobState::Done,
        }
    }
}

/// Text ready for delivery plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub text: String,
    pub outcome: ComposeOutcome,
}

impl Composed {
    fn failed(kind: FailureKind, message: String) -> Self {
        Self {
            text: message,
            outcome: ComposeOutcome::Failed(kind),
        }
    }

    fn no_source(lang: Lang) -> Self {
        Self {
            text: messages::no_authoritative_source(lang).to_string(),
            outcome: ComposeOutcome::NoSource,
        }
    }
}

/// Knobs the composer reads from [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct ComposerSettings {
    pub prompts: PromptConfig,
    pub temperature: f32,
    pub force_live: bool,
    pub verify_dynamic: bool,
    pub verify_timeout: Duration,
    pub history_max_chars: usize,
    pub search_max_results: usize,
    pub citation_max_results: usize,
    pub citation_allowlist: Vec<String>,
    pub stamp_utc_offset_hours: i32,
}

impl ComposerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            prompts: config.prompts.clone(),
            temperature: config.openai.temperature,
            force_live: config.force_live,
            verify_dynamic: config.verify_dynamic,
            verify_timeout: config.verify_timeout(),
            history_max_chars: config.history_max_chars,
            search_max_results: config.search_max_results,
            citation_max_results: config.citation_max_results,
            citation_allowlist: config.citation_allowlist.clone(),
            stamp_utc_offset_hours: config.stamp_utc_offset_hours,
        }
    }
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

pub struct Composer {
    completion: Arc<CompletionClient>,
    search: Option<SearchClient>,
    cache: Arc<AnswerCache>,
    history: Arc<dyn HistoryProvider>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    settings: ComposerSettings,
}

impl Composer {
    pub fn new(
        completion: Arc<CompletionClient>,
        search: Option<SearchClient>,
        cache: Arc<AnswerCache>,
        settings: ComposerSettings,
    ) -> Self {
        Self {
            completion,
            search,
            cache,
            history: Arc::new(NoHistory),
            events: Arc::new(NoopEventSink),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.history = history;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &AnswerCache {
        &self.cache
    }

    pub fn strategy(&self, job: &Job) -> ComposeStrategy {
        let wants_search = job.require_search
            || self.settings.force_live
            || freshness::is_time_sensitive(&job.question, self.year());
        match (job.citation_required, self.search.is_some()) {
            (true, _) => ComposeStrategy::CitationRequired,
            (false, true) if wants_search => ComposeStrategy::SearchAugmented,
            _ => ComposeStrategy::Plain,
        }
    }

    /// Produce the text to deliver for `job`. Never fails.
    pub async fn answer(&self, job: &Job) -> Composed {
        self.compose(job, None).await
    }

    /// Like [`answer`](Self::answer), but the optional verification pass
    /// gives up at `deadline` so a finished draft is still delivered.
    pub async fn answer_by(&self, job: &Job, deadline: Instant) -> Composed {
        self.compose(job, Some(deadline)).await
    }

    #[instrument(skip_all, fields(job = %job.id, lang = job.lang.code()))]
    async fn compose(&self, job: &Job, deadline: Option<Instant>) -> Composed {
        let strategy = self.strategy(job);
        debug!(?strategy, "composing");

        if strategy != ComposeStrategy::CitationRequired
            && let Some(text) = self.cache.get(&job.question)
        {
            self.events.emit(PipelineEvent::CacheHit { job: job.id });
            return Composed {
                text,
                outcome: ComposeOutcome::Cached,
            };
        }

        let history = self
            .history
            .recent_history(&job.session_id, self.settings.history_max_chars)
            .await;

        let (draft, mut grounded) = match strategy {
            ComposeStrategy::CitationRequired => return self.cited(job, &history).await,
            ComposeStrategy::SearchAugmented => match self.grounded_draft(job, &history).await {
                Some(draft) => (draft, true),
                None => (self.plain_draft(job, &history).await, false),
            },
            ComposeStrategy::Plain => {
                let draft = self.plain_draft(job, &history).await;
                if draft.is_hedged() && self.search.is_some() {
                    info!("draft hedged on the knowledge cutoff; retrying with search");
                    match self.grounded_draft(job, &history).await {
                        Some(grounded) if !grounded.is_failed() => (grounded, true),
                        _ => (draft, false),
                    }
                } else {
                    (draft, false)
                }
            }
        };

        let mut text = match &draft {
            Completion::Failed { kind, message } => return Composed::failed(*kind, message.clone()),
            _ => match draft.answer() {
                Some(text) => text.to_string(),
                None => {
                    let kind = FailureKind::Generic;
                    return Composed::failed(kind, messages::friendly_error(kind, job.lang).to_string());
                }
            },
        };

        if self.should_verify(job, &text) {
            let limit = Instant::now() + self.settings.verify_timeout;
            let until = deadline.map_or(limit, |d| d.min(limit));
            match tokio::time::timeout_at(until, self.verify(job, &text)).await {
                Ok(Some(corrected)) => {
                    let changed = corrected != text;
                    self.events.emit(PipelineEvent::Verified {
                        job: job.id,
                        corrected: changed,
                    });
                    text = corrected;
                    grounded = true;
                }
                Ok(None) => debug!("verification produced nothing; keeping draft"),
                Err(_) => info!("verification ran out of time; keeping draft"),
            }
        }

        if grounded && freshness::looks_dynamic(&[&job.question, &text], self.year()) {
            text = format!("{text}\n\n{}", self.stamp(job.lang));
        }

        self.cache.set(&job.question, text.clone());
        Composed {
            text,
            outcome: ComposeOutcome::Answered,
        }
    }

    fn system_prompt(&self, base: &str, job: &Job) -> String {
        match &job.topic_hint {
            Some(hint) if !hint.trim().is_empty() => format!("{base}\n\n{}", hint.trim()),
            _ => base.to_string(),
        }
    }

    async fn plain_draft(&self, job: &Job, history: &[ChatMessage]) -> Completion {
        let system = self.system_prompt(&self.settings.prompts.general, job);
        let options = CompletionOptions::new(job.lang).temperature(self.settings.temperature);
        self.completion
            .complete(&system, history, &job.question, options)
            .await
    }

    /// Draft grounded in search snippets. `None` when search is unavailable
    /// or empty; the caller decides what to fall back to.
    async fn grounded_draft(&self, job: &Job, history: &[ChatMessage]) -> Option<Completion> {
        let hits = match &self.search {
            Some(search) => {
                search
                    .search(&job.question, self.settings.search_max_results, None)
                    .await
            }
            None => None,
        };
        let hits = match hits {
            Some(hits) if !hits.is_empty() => hits,
            _ => {
                self.events.emit(PipelineEvent::SearchDegraded { job: job.id });
                return None;
            }
        };

        let base = format!(
            "{}{}",
            self.settings.prompts.general, self.settings.prompts.augmented_suffix
        );
        let system = self.system_prompt(&base, job);
        let user_text = format!(
            "{}\n\nSearch summary (no links):\n{}",
            job.question,
            snippet_summary(&hits)
        );
        let options = CompletionOptions::new(job.lang).temperature(AUGMENTED_TEMPERATURE);
        Some(
            self.completion
                .complete(&system, history, &user_text, options)
                .await,
        )
    }

    fn should_verify(&self, job: &Job, draft: &str) -> bool {
        self.settings.verify_dynamic
            && self.search.is_some()
            && freshness::looks_dynamic(&[&job.question, draft], self.year())
    }

    /// Second pass: correct stale facts in `draft` against fresh snippets.
    /// `None` means "keep the draft".
    async fn verify(&self, job: &Job, draft: &str) -> Option<String> {
        let search = self.search.as_ref()?;
        let hits = search
            .search(&job.question, self.settings.search_max_results, None)
            .await?;
        if hits.is_empty() {
            return None;
        }

        let user_text = format!(
            "Question:\n{}\n\nDraft answer:\n{}\n\nFresh search snippets:\n{}",
            job.question,
            draft,
            snippet_summary(&hits)
        );
        let options = CompletionOptions::new(job.lang).temperature(VERIFY_TEMPERATURE);
        let checked = self
            .completion
            .complete(&self.settings.prompts.verify, &[], &user_text, options)
            .await;
        checked.answer().map(str::to_string)
    }

    async fn cited(&self, job: &Job, history: &[ChatMessage]) -> Composed {
        let Some(search) = &self.search else {
            return Composed::no_source(job.lang);
        };
        let allowlist = &self.settings.citation_allowlist;
        let hits = match search
            .search(&job.question, self.settings.citation_max_results, Some(allowlist))
            .await
        {
            Some(hits) if !hits.is_empty() => hits,
            Some(_) => return Composed::no_source(job.lang),
            None => {
                self.events.emit(PipelineEvent::SearchDegraded { job: job.id });
                return Composed::no_source(job.lang);
            }
        };

        let user_text = format!(
            "{}\n\nOfficial documents:\n{}",
            job.question,
            document_brief(&hits)
        );

        let prompts = &self.settings.prompts;
        let first = self
            .cited_attempt(job, history, &user_text, &prompts.citation, CITATION_TEMPERATURE)
            .await;
        let reply = match first {
            Completion::Failed { kind, message } => return Composed::failed(kind, message),
            first if has_citations(first.answer().unwrap_or_default(), allowlist) => first,
            _ => {
                debug!("first cited answer lacks citations; retrying strictly");
                let strict = format!("{}{}", prompts.citation, prompts.citation_strict_suffix);
                match self
                    .cited_attempt(job, history, &user_text, &strict, STRICT_CITATION_TEMPERATURE)
                    .await
                {
                    Completion::Failed { kind, message } => return Composed::failed(kind, message),
                    second => second,
                }
            }
        };

        match finish_cited(reply.answer().unwrap_or_default(), &hits, allowlist, job.lang) {
            Some(body) => Composed {
                text: format!("{body}\n\n{}", self.stamp(job.lang)),
                outcome: ComposeOutcome::Answered,
            },
            None => Composed::no_source(job.lang),
        }
    }

    async fn cited_attempt(
        &self,
        job: &Job,
        history: &[ChatMessage],
        user_text: &str,
        base_prompt: &str,
        temperature: f32,
    ) -> Completion {
        let system = self.system_prompt(base_prompt, job);
        let options = CompletionOptions::new(job.lang)
            .temperature(temperature)
            .allow_links(true);
        self.completion
            .complete(&system, history, user_text, options)
            .await
    }

    fn year(&self) -> i32 {
        self.clock.now().year()
    }

    fn stamp(&self, lang: Lang) -> String {
        let local =
            self.clock.now() + chrono::Duration::hours(i64::from(self.settings.stamp_utc_offset_hours));
        messages::checked_stamp(lang, &local.format("%d.%m.%Y").to_string())
    }
}

/// Snippet lines for a prompt. Titles and snippets only, never URLs.
fn snippet_summary(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| {
            format!(
                "- {}: {}",
                truncate_chars(&h.title, 100),
                truncate_chars(&h.snippet, 500)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Document lines for the citation prompt, URLs included.
fn document_brief(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| {
            format!(
                "- {}\n  {}\n  {}",
                truncate_chars(&h.title, 120),
                truncate_chars(&h.snippet, 600),
                h.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A cited answer names an article or clause and links at least one
/// allowlisted document.
fn has_citations(text: &str, allowlist: &[String]) -> bool {
    ARTICLE_REFERENCE.is_match(text)
        && URL
            .find_iter(text)
            .any(|m| url_in_allowlist(m.as_str().trim_end_matches(['.', ',', ';']), allowlist))
}

/// Accept a cited answer only if it is not the sentinel and carries
/// citations. Appends a sources block when the model left it out.
fn finish_cited(text: &str, hits: &[SearchHit], allowlist: &[String], lang: Lang) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || text.contains(NO_SOURCE_SENTINEL) || !has_citations(text, allowlist) {
        return None;
    }
    if SOURCES_HEADING.is_match(text) {
        return Some(text.to_string());
    }
    let sources = hits
        .iter()
        .map(|h| format!("- [{}]({})", truncate_chars(&h.title, 120), h.url))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!("{text}\n\n{}\n{sources}", messages::sources_heading(lang)))
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UpstreamError;
    use crate::ports::{ChannelEventSink, CompletionRequest, ManualClock};
    use crate::retry::RetryPolicy;
    use crate::testing::{CallLog, ScriptedCompletion, StubSearch, hit};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    struct Fixture {
        completion: Arc<ScriptedCompletion>,
        search: Option<Arc<StubSearch>>,
        log: Arc<CallLog>,
        settings: ComposerSettings,
        permits: usize,
    }

    impl Fixture {
        fn new(completion: ScriptedCompletion, search: Option<StubSearch>) -> Self {
            let log = Arc::new(CallLog::default());
            Self {
                completion: Arc::new(completion.with_log(Arc::clone(&log))),
                search: search.map(|s| Arc::new(s.with_log(Arc::clone(&log)))),
                log,
                settings: ComposerSettings::default(),
                permits: 2,
            }
        }

        fn composer(&self) -> Composer {
            let policy = RetryPolicy::new(1, Duration::from_millis(1));
            let completion = Arc::new(CompletionClient::new(
                self.completion.clone(),
                self.permits,
                policy.clone(),
            ));
            let clock = Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap(),
            ));
            let search = self
                .search
                .clone()
                .map(|s| SearchClient::new(s, policy.clone()).with_clock(clock.clone()));
            let cache = Arc::new(AnswerCache::with_clock(
                Duration::from_secs(3600),
                10,
                clock.clone(),
            ));
            Composer::new(completion, search, cache, self.settings.clone()).with_clock(clock)
        }
    }

    fn job(q: &str) -> Job {
        Job::new("s", "t", q)
    }

    fn is_verify(req: &CompletionRequest) -> bool {
        req.system_prompt == PromptConfig::default().verify
    }

    #[tokio::test(start_paused = true)]
    async fn plain_question_skips_search_and_is_cached() {
        let f = Fixture::new(
            ScriptedCompletion::replying("4"),
            Some(StubSearch::returning(vec![hit("t", "s", "https://a.com")])),
        );
        let composer = f.composer();

        let out = composer.answer(&job("what's 2+2")).await;

        assert_eq!(out.text, "4");
        assert_eq!(out.outcome, ComposeOutcome::Answered);
        assert!(f.search.as_ref().unwrap().calls().is_empty());
        assert_eq!(composer.cache().get("what's 2+2").as_deref(), Some("4"));
    }

    #[tokio::test(start_paused = true)]
    async fn time_sensitive_question_searches_before_completing() {
        let f = Fixture::new(
            ScriptedCompletion::echo(),
            Some(StubSearch::returning(vec![
                hit("Central bank", "USD is 12 700 sum", "https://cbu.uz/rates"),
                hit("Exchange office", "buying at 12 650", "https://bank.uz/fx"),
            ])),
        );
        let composer = f.composer();

        composer.answer(&job("what is today's exchange rate")).await;

        let entries = f.log.entries();
        assert_eq!(&entries[..2], &["search", "completion"]);
        let prompt = f.completion.calls()[0].user_text().to_string();
        assert!(prompt.contains("USD is 12 700 sum"));
        assert!(prompt.contains("buying at 12 650"));
        assert!(!prompt.contains("https://"));
    }

    #[tokio::test(start_paused = true)]
    async fn citation_mode_without_allowlisted_results_never_calls_model() {
        let f = Fixture::new(
            ScriptedCompletion::replying("made up"),
            Some(StubSearch::returning(vec![hit(
                "Forum",
                "someone said",
                "https://forum.example.com/t/1",
            )])),
        );
        let composer = f.composer();

        let out = composer
            .answer(&job("what is the fine for parking").with_citations())
            .await;

        assert_eq!(out.outcome, ComposeOutcome::NoSource);
        assert_eq!(out.text, messages::no_authoritative_source(Lang::En));
        assert!(f.completion.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn citation_answer_gets_sources_and_stamp() {
        let f = Fixture::new(
            ScriptedCompletion::replying(
                "The fine is set by article 128 of the [Code](https://lex.uz/docs/97664).",
            ),
            Some(StubSearch::returning(vec![hit(
                "Administrative Code",
                "Article 128 ...",
                "https://lex.uz/docs/97664",
            )])),
        );
        let composer = f.composer();

        let out = composer
            .answer(&job("what is the fine for parking").with_citations())
            .await;

        assert_eq!(out.outcome, ComposeOutcome::Answered);
        assert!(out.text.contains("https://lex.uz/docs/97664"));
        assert!(out.text.contains("**Sources:**"));
        assert!(out.text.ends_with("_Checked: 15.06.2025_"));
        assert!(composer.cache().is_empty());
        assert_eq!(f.completion.calls()[0].temperature, CITATION_TEMPERATURE);
    }

    #[rstest]
    #[case("NO SOURCE")]
    #[case("It is probably 100 000 sum, see https://blog.example.com")]
    #[case("See the [Code](https://lex.uz/docs/1) for the fine.")]
    #[tokio::test(start_paused = true)]
    async fn citation_without_article_and_link_becomes_no_source_after_strict_retry(
        #[case] reply: &str,
    ) {
        let f = Fixture::new(
            ScriptedCompletion::replying(reply),
            Some(StubSearch::returning(vec![hit("Code", "x", "https://lex.uz/docs/1")])),
        );

        let out = f.composer().answer(&job("fine for parking").with_citations()).await;

        assert_eq!(out.outcome, ComposeOutcome::NoSource);
        let temperatures: Vec<f32> = f.completion.calls().iter().map(|c| c.temperature).collect();
        assert_eq!(temperatures, vec![CITATION_TEMPERATURE, STRICT_CITATION_TEMPERATURE]);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_retry_can_rescue_an_uncited_answer() {
        let f = Fixture::new(
            ScriptedCompletion::with_fn(|req| {
                Ok(if req.temperature == STRICT_CITATION_TEMPERATURE {
                    "Under article 128 of the Code the fine is 10%. https://lex.uz/docs/97664"
                } else {
                    "The fine is set by the [Code](https://lex.uz/docs/97664)."
                }
                .to_string())
            }),
            Some(StubSearch::returning(vec![hit(
                "Administrative Code",
                "Article 128 ...",
                "https://lex.uz/docs/97664",
            )])),
        );

        let out = f.composer().answer(&job("fine for parking").with_citations()).await;

        assert_eq!(out.outcome, ComposeOutcome::Answered);
        assert!(out.text.starts_with("Under article 128"));
        assert!(out.text.contains("**Sources:**"));
        let calls = f.completion.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].system_prompt.ends_with(&PromptConfig::default().citation_strict_suffix));
    }

    #[tokio::test(start_paused = true)]
    async fn citation_mode_without_search_never_calls_model() {
        let f = Fixture::new(ScriptedCompletion::replying("made up"), None);

        let out = f.composer().answer(&job("fine for parking").with_citations()).await;

        assert_eq!(out.outcome, ComposeOutcome::NoSource);
        assert_eq!(out.text, messages::no_authoritative_source(Lang::En));
        assert!(f.completion.calls().is_empty());
    }

    fn hedging_model() -> ScriptedCompletion {
        ScriptedCompletion::with_fn(|req| {
            Ok(if req.user_text().contains("Search summary") {
                "Magnets align their domains.".to_string()
            } else {
                "My knowledge cutoff limits this answer. Magnets attract iron.".to_string()
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn hedged_draft_is_redone_with_search() {
        let f = Fixture::new(
            hedging_model(),
            Some(StubSearch::returning(vec![hit("Physics", "domains align", "https://phys.org")])),
        );

        let out = f.composer().answer(&job("how do magnets work")).await;

        assert_eq!(out.text, "Magnets align their domains.");
        assert_eq!(f.log.entries(), vec!["completion", "search", "completion"]);
    }

    #[tokio::test(start_paused = true)]
    async fn hedged_draft_without_search_keeps_redacted_text() {
        let f = Fixture::new(hedging_model(), None);

        let out = f.composer().answer(&job("how do magnets work")).await;

        assert_eq!(out.text, "Magnets attract iron.");
        assert_eq!(f.completion.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn topic_hint_is_appended_to_system_prompt() {
        let f = Fixture::new(ScriptedCompletion::replying("Arr, 4."), None);

        f.composer()
            .answer(&job("what's 2+2").with_topic_hint("  Answer like a pirate. "))
            .await;

        let system = &f.completion.calls()[0].system_prompt;
        assert!(system.starts_with(&PromptConfig::default().general));
        assert!(system.ends_with("\n\nAnswer like a pirate."));
    }

    #[tokio::test(start_paused = true)]
    async fn draft_and_verify_share_one_model_budget() {
        let mut f = Fixture::new(
            ScriptedCompletion::echo().with_delay(Duration::from_secs(1)),
            Some(StubSearch::returning(vec![hit("CBU", "USD 12 700", "https://cbu.uz")])),
        );
        f.permits = 1;
        let composer = f.composer();

        let (job_a, job_b) = (job("dollar rate in Tashkent"), job("euro rate in Samarkand"));
        tokio::join!(composer.answer(&job_a), composer.answer(&job_b));

        let calls = f.completion.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.iter().filter(|c| is_verify(c)).count(), 2);
        assert_eq!(f.completion.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_stops_at_the_job_deadline() {
        let f = Fixture::new(
            ScriptedCompletion::with_fn(|_| Ok("The tax rate is 12%.".to_string())).with_delay_fn(
                |req| {
                    if is_verify(req) {
                        Duration::from_secs(60)
                    } else {
                        Duration::from_secs(8)
                    }
                },
            ),
            Some(StubSearch::returning(vec![hit("Tax", "12%", "https://soliq.uz")])),
        );
        let composer = f.composer();
        let started = Instant::now();

        let out = composer
            .answer_by(&job("how is the tax rate applied"), started + Duration::from_secs(15))
            .await;

        assert!(out.text.starts_with("The tax rate is 12%."));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn search_failure_degrades_to_plain_draft() {
        let f = Fixture::new(
            ScriptedCompletion::echo(),
            Some(StubSearch::failing(UpstreamError::status(503, "down"))),
        );
        let (sink, mut rx) = ChannelEventSink::new();
        let composer = f.composer().with_events(Arc::new(sink));
        let out = composer
            .answer(&job("latest news about rust").with_required_search())
            .await;

        assert_eq!(out.outcome, ComposeOutcome::Answered);
        assert_eq!(f.completion.calls()[0].user_text(), "latest news about rust");
        let mut degraded = false;
        while let Ok(event) = rx.try_recv() {
            degraded |= matches!(event, PipelineEvent::SearchDegraded { .. });
        }
        assert!(degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_replaces_stale_draft_and_stamps_it() {
        let f = Fixture::new(
            ScriptedCompletion::with_fn(|req| {
                Ok(if is_verify(req) {
                    "The dollar rate is 12 700 sum in 2025.".to_string()
                } else {
                    "The dollar rate is 11 000 sum.".to_string()
                })
            }),
            Some(StubSearch::returning(vec![hit("CBU", "USD 12 700", "https://cbu.uz")])),
        );
        let composer = f.composer();

        let out = composer.answer(&job("dollar rate in Tashkent")).await;

        assert!(out.text.starts_with("The dollar rate is 12 700 sum in 2025."));
        assert!(out.text.ends_with("_Checked: 15.06.2025_"));
        assert!(f.completion.calls().iter().any(is_verify));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_verification_keeps_draft() {
        let f = Fixture::new(
            ScriptedCompletion::with_fn(|req| {
                if is_verify(req) {
                    Err(UpstreamError::status(401, "bad key"))
                } else {
                    Ok("The tax rate is 12%.".to_string())
                }
            }),
            Some(StubSearch::returning(vec![hit("Tax", "12%", "https://soliq.uz")])),
        );
        let composer = f.composer();

        let out = composer.answer(&job("how is the tax rate applied")).await;

        assert!(out.text.starts_with("The tax rate is 12%."));
        assert_eq!(out.outcome, ComposeOutcome::Answered);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_is_skipped_when_disabled() {
        let mut f = Fixture::new(
            ScriptedCompletion::replying("Inflation was 10%."),
            Some(StubSearch::returning(vec![hit("Stats", "10%", "https://stat.uz")])),
        );
        f.settings.verify_dynamic = false;
        let composer = f.composer();

        composer.answer(&job("explain inflation")).await;

        assert!(!f.completion.calls().iter().any(is_verify));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_draft_is_delivered_but_not_cached() {
        let f = Fixture::new(ScriptedCompletion::failing(UpstreamError::status(402, "pay")), None);
        let composer = f.composer();

        let out = composer.answer(&job("what's 2+2")).await;

        assert_eq!(out.outcome, ComposeOutcome::Failed(FailureKind::Billing));
        assert_eq!(out.outcome.job_state(), JobState::FailedDelivered);
        assert!(composer.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_short_circuits() {
        let f = Fixture::new(ScriptedCompletion::replying("fresh"), None);
        let composer = f.composer();
        composer.cache().set("What's  2+2", "cached 4");

        let out = composer.answer(&job("what's 2+2")).await;

        assert_eq!(out.text, "cached 4");
        assert_eq!(out.outcome, ComposeOutcome::Cached);
        assert!(f.completion.calls().is_empty());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
