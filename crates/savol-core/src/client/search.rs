//! Search client.
//!
//! Picks the search depth from the freshness heuristic, retries through the
//! shared retrier, filters by domain allowlist and turns every failure into
//! `None`. Callers decide how to degrade.

use std::sync::Arc;

use chrono::Datelike;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::freshness;
use crate::ports::{Clock, SearchBackend, SearchDepth, SearchHit, SearchQuery, SystemClock};
use crate::retry::{RetryPolicy, retry};

pub struct SearchClient {
    backend: Arc<dyn SearchBackend>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl SearchClient {
    pub fn new(backend: Arc<dyn SearchBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock whose year decides which mentioned years count as recent.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run a query.
    ///
    /// - `None`: the search service failed (after retries); degrade.
    /// - `Some(vec![])`: the search worked but nothing matched. With an
    ///   allowlist this means "no authoritative source", not a failure.
    #[instrument(skip(self, allowlist), fields(restricted = allowlist.is_some()))]
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        allowlist: Option<&[String]>,
    ) -> Option<Vec<SearchHit>> {
        let depth = match allowlist {
            Some(_) => SearchDepth::Advanced,
            None if freshness::is_time_sensitive(query, self.clock.now().year()) => {
                SearchDepth::Advanced
            }
            None => SearchDepth::Basic,
        };
        let request = SearchQuery {
            query: query.to_string(),
            depth,
            max_results,
            include_domains: allowlist.map(<[String]>::to_vec).unwrap_or_default(),
        };

        let hits = match retry(&self.policy, || self.backend.search(&request)).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "search failed");
                return None;
            }
        };

        let hits: Vec<SearchHit> = match allowlist {
            Some(domains) => hits
                .into_iter()
                .filter(|hit| url_in_allowlist(&hit.url, domains))
                .collect(),
            None => hits,
        };
        debug!(results = hits.len(), ?depth, "search finished");
        Some(hits.into_iter().take(max_results).collect())
    }
}

/// True if the URL's host is one of `domains` or a subdomain of one.
pub fn url_in_allowlist(url: &str, domains: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    domains.iter().any(|d| {
        let d = d.trim().trim_start_matches('.').to_ascii_lowercase();
        !d.is_empty() && (host == d || host.ends_with(&format!(".{d}")))
    })
}
