//! Search backend for the Tavily search API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{build_client, ensure_success, transport_error};
use crate::config::TavilyConfig;
use crate::domain::UpstreamError;
use crate::ports::{SearchBackend, SearchDepth, SearchHit, SearchQuery};

pub struct TavilyBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl TavilyBackend {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// `None` when the configured key variable is unset.
    pub fn from_config(config: &TavilyConfig) -> Option<Result<Self, UpstreamError>> {
        let key = config.api_key()?;
        Some(Self::new(&config.endpoint, key))
    }
}

#[derive(Serialize)]
struct SearchBody<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: SearchDepth,
    max_results: usize,
    include_answer: bool,
    #[serde(skip_serializing_if = "no_domains")]
    include_domains: &'a [String],
}

fn no_domains(domains: &&[String]) -> bool {
    domains.is_empty()
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WireResult>,
}

#[derive(Deserialize)]
struct WireResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, UpstreamError> {
        let body = SearchBody {
            api_key: &self.api_key,
            query: &query.query,
            search_depth: query.depth,
            max_results: query.max_results,
            include_answer: false,
            include_domains: &query.include_domains,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;
        let parsed: SearchResponse = response.json().await.map_err(transport_error)?;

        let hits: Vec<SearchHit> = parsed
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty() || !r.content.is_empty())
            .map(|r| SearchHit {
                title: r.title.trim().to_string(),
                snippet: r.content.trim().to_string(),
                url: r.url.trim().to_string(),
            })
            .collect();
        debug!(results = hits.len(), "search received");
        Ok(hits)
    }
}
