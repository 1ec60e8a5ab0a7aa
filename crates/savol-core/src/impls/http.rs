//! Shared reqwest plumbing for the HTTP adapters.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::domain::UpstreamError;

/// Connection setup budget.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Whole-request budget. Longer than any job timeout, which stays binding.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body kept in an `UpstreamError`.
const MAX_ERROR_BODY: usize = 300;

pub fn build_client() -> Result<Client, UpstreamError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("savol/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UpstreamError::Transport(e.to_string()))
}

pub fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else if err.is_decode() {
        UpstreamError::Malformed(err.to_string())
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

/// Pass 2xx responses through; turn anything else into `UpstreamError::Status`.
pub async fn ensure_success(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(UpstreamError::status(status.as_u16(), body))
}
