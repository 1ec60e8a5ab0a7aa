//! Search port - the web-search service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    pub query: String,
    pub depth: SearchDepth,
    pub max_results: usize,
    /// Restrict results to these domains (empty = no restriction).
    pub include_domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, UpstreamError>;
}
