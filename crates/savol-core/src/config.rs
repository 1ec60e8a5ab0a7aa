//! Pipeline configuration.
//!
//! Defaults < TOML file < environment variables. Every field has a default,
//! so an empty file (or no file) is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Longest accepted job or verification timeout.
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of long-lived workers.
    pub worker_count: usize,

    /// Completion calls allowed in flight at once, across all workers.
    pub model_concurrency: usize,

    /// Queue depth from which callers show position + ETA.
    pub queue_notice_threshold: usize,

    /// Wall-clock budget for one job, cache lookup to final answer.
    pub job_timeout_secs: u64,

    /// Run the verification pass on dynamic-looking answers.
    pub verify_dynamic: bool,
    pub verify_timeout_secs: u64,

    /// Ground every draft in search results, not only time-sensitive ones.
    pub force_live: bool,

    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,

    /// Smoothing factor of the service-time moving average.
    pub ema_alpha: f64,
    /// Assumed service time before the first job finishes.
    pub default_service_secs: u64,
    pub eta_min_secs: u64,
    pub eta_max_secs: u64,

    pub history_max_chars: usize,
    pub search_max_results: usize,
    pub citation_max_results: usize,
    /// Domains accepted as authoritative in citation-required mode.
    pub citation_allowlist: Vec<String>,

    /// Offset used for the date in "checked on" stamps.
    pub stamp_utc_offset_hours: i32,

    pub completion_retry: RetryPolicy,
    pub search_retry: RetryPolicy,

    pub prompts: PromptConfig,
    pub openai: OpenAiConfig,
    pub tavily: TavilyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            model_concurrency: 4,
            queue_notice_threshold: 3,
            job_timeout_secs: 15,
            verify_dynamic: true,
            verify_timeout_secs: 12,
            force_live: false,
            cache_ttl_secs: 24 * 60 * 60,
            cache_capacity: 500,
            ema_alpha: 0.3,
            default_service_secs: 6,
            eta_min_secs: 3,
            eta_max_secs: 300,
            history_max_chars: 6000,
            search_max_results: 4,
            citation_max_results: 5,
            citation_allowlist: vec!["lex.uz".to_string()],
            stamp_utc_offset_hours: 5,
            completion_retry: RetryPolicy::completion(),
            search_retry: RetryPolicy::search(),
            prompts: PromptConfig::default(),
            openai: OpenAiConfig::default(),
            tavily: TavilyConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the process env in production).
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { key, value })
        }
        fn flag(value: &str) -> bool {
            matches!(value.trim(), "1" | "true" | "yes")
        }

        if let Some(v) = lookup("WORKER_CONCURRENCY") {
            self.worker_count = parse("WORKER_CONCURRENCY", v)?;
        }
        if let Some(v) = lookup("MODEL_CONCURRENCY") {
            self.model_concurrency = parse("MODEL_CONCURRENCY", v)?;
        }
        if let Some(v) = lookup("QUEUE_NOTICE_THRESHOLD") {
            self.queue_notice_threshold = parse("QUEUE_NOTICE_THRESHOLD", v)?;
        }
        if let Some(v) = lookup("REPLY_TIMEOUT_SEC") {
            self.job_timeout_secs = parse("REPLY_TIMEOUT_SEC", v)?;
        }
        if let Some(v) = lookup("VERIFY_TIMEOUT_SEC") {
            self.verify_timeout_secs = parse("VERIFY_TIMEOUT_SEC", v)?;
        }
        if let Some(v) = lookup("VERIFY_DYNAMIC") {
            self.verify_dynamic = flag(&v);
        }
        if let Some(v) = lookup("FORCE_LIVE") {
            self.force_live = flag(&v);
        }
        if let Some(v) = lookup("OPENAI_API_BASE") {
            self.openai.api_base = v;
        }
        if let Some(v) = lookup("OPENAI_MODEL") {
            self.openai.model = v;
        }
        Ok(self)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.worker_count == 0 {
            return invalid("worker_count must be at least 1");
        }
        if self.model_concurrency == 0 {
            return invalid("model_concurrency must be at least 1");
        }
        if self.cache_capacity == 0 {
            return invalid("cache_capacity must be at least 1");
        }
        if self.job_timeout_secs == 0 {
            return invalid("job_timeout_secs must be at least 1");
        }
        if self.job_timeout_secs > MAX_TIMEOUT_SECS || self.verify_timeout_secs > MAX_TIMEOUT_SECS {
            return invalid("job_timeout_secs and verify_timeout_secs must not exceed one day");
        }
        if self.completion_retry.max_attempts == 0 || self.search_retry.max_attempts == 0 {
            return invalid("retry max_attempts must be at least 1");
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return invalid("ema_alpha must be in (0, 1]");
        }
        if self.eta_min_secs > self.eta_max_secs {
            return invalid("eta_min_secs must not exceed eta_max_secs");
        }
        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn default_service_time(&self) -> Duration {
        Duration::from_secs(self.default_service_secs)
    }

    pub fn eta_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.eta_min_secs),
            Duration::from_secs(self.eta_max_secs),
        )
    }
}

/// `[prompts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// System prompt of the everyday assistant.
    pub general: String,
    /// Appended to `general` when the draft is grounded in search snippets.
    pub augmented_suffix: String,
    /// System prompt of the verification pass.
    pub verify: String,
    /// System prompt of the citation-required mode.
    pub citation: String,
    /// Appended to `citation` for the second attempt when the first answer
    /// cited no article or no allowlisted document.
    pub citation_strict_suffix: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            general: "You are Savol, an everyday assistant. Answer naturally and to the point \
                      in 6-8 sentences, with examples or short lists where useful. Do not give \
                      instructions for illegal activity. For medical questions give general \
                      information only and recommend seeing a doctor. Reply in the language of \
                      the question. Do not include URLs or links. Never mention a knowledge \
                      cutoff date; if you are not sure, say so honestly."
                .to_string(),
            augmented_suffix: " Base the answer on the search summary provided with the \
                               question, in your own words and without links. Be brief."
                .to_string(),
            verify: "You are a fact checker. Compare the draft answer with the fresh search \
                     snippets. Correct outdated numbers, dates, rates and names; keep \
                     everything else, including language and tone. Return only the corrected \
                     answer, without links."
                .to_string(),
            citation: "You are a legal information assistant. Give general legal information, \
                       not individual advice. Rely only on the provided official documents: \
                       name the exact acts and article or clause numbers and link to them \
                       directly. Do not use other sources and do not invent anything. If the \
                       documents contain no relevant norm, reply exactly: NO SOURCE. Reply in \
                       the language of the question. Structure: short summary; what is allowed \
                       or forbidden; procedure (steps, documents, deadlines, authorities); \
                       liability if applicable; Sources."
                .to_string(),
            citation_strict_suffix: " Include at least one direct link to an official \
                                     document and name the article or clause. If the \
                                     documents do not support a specific norm, reply \
                                     exactly: NO SOURCE."
                .to_string(),
        }
    }
}

/// `[openai]` section: any OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub model: String,
    /// Name of the env var holding the API key (never the key itself).
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.6,
        }
    }
}

impl OpenAiConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

/// `[tavily]` section: web search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TavilyConfig {
    pub endpoint: String,
    pub api_key_env: String,
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.tavily.com/search".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
        }
    }
}

impl TavilyConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}
