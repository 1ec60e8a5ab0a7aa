//! Completion backend for OpenAI-compatible `/chat/completions` endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{build_client, ensure_success, transport_error};
use crate::config::OpenAiConfig;
use crate::domain::UpstreamError;
use crate::ports::{CompletionBackend, CompletionRequest, Role};

pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_client()?,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// `None` when the configured key variable is unset.
    pub fn from_config(config: &OpenAiConfig) -> Option<Result<Self, UpstreamError>> {
        let key = config.api_key()?;
        Some(Self::new(&config.api_base, key, &config.model))
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(WireMessage {
            role: Role::System,
            content: &request.system_prompt,
        });
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: m.role,
            content: &m.content,
        }));
        let body = ChatBody {
            model: &self.model,
            temperature: request.temperature,
            messages,
        };

        // a fresh request per call; the retrier never replays one
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;
        let parsed: ChatResponse = response.json().await.map_err(transport_error)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UpstreamError::Malformed("response has no choices".into()))?;
        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "be brief".into(),
            messages: vec![ChatMessage::assistant("hello"), ChatMessage::user("2+2?")],
            temperature: 0.35,
        }
    }

    async fn backend(server: &MockServer) -> OpenAiBackend {
        OpenAiBackend::new(&format!("{}/v1/", server.uri()), "sk-test", "gpt-test").unwrap()
    }

    #[tokio::test]
    async fn sends_system_prompt_first_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "2+2?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": " 4 \n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = backend(&server).await.complete(&request()).await.unwrap();

        assert_eq!(answer, "4");
    }

    #[tokio::test]
    async fn rate_limit_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = backend(&server).await.complete(&request()).await.unwrap_err();

        assert_eq!(err, UpstreamError::status(429, "slow down"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn missing_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = backend(&server).await.complete(&request()).await.unwrap_err();

        assert!(matches!(err, UpstreamError::Malformed(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = backend(&server).await.complete(&request()).await.unwrap_err();

        assert!(matches!(err, UpstreamError::Malformed(_)));
    }
}
