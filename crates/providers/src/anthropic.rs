//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Messages must start with a user turn and alternate roles

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tars_core::message::Role;
use tars_core::provider::{CompletionProvider, CompletionRequest, CompletionResponse, PromptMessage, Usage};
use tars_core::ProviderError;
use tracing::debug;

use crate::{check_status, transport_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider for `model`.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_timeout(api_key, model, Duration::from_secs(300))
    }

    /// Create a provider whose HTTP client gives up after `timeout`.
    pub fn with_timeout(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert messages to the API shape.
    ///
    /// Empty messages and leading assistant messages are dropped, and
    /// consecutive messages from the same role are merged.
    fn to_api_messages(messages: &[PromptMessage]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            if msg.content.trim().is_empty() {
                continue;
            }
            if result.is_empty() && msg.role == Role::Assistant {
                continue;
            }
            match result.last_mut() {
                Some(last) if last.role == msg.role.as_str() => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&msg.content);
                }
                _ => result.push(AnthropicMessage {
                    role: msg.role.as_str().into(),
                    content: msg.content.clone(),
                }),
            }
        }

        result
    }

    fn to_completion_response(resp: AnthropicResponse) -> CompletionResponse {
        let text = resp
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.as_str()),
                ResponseContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        CompletionResponse {
            text,
            model: resp.model,
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let messages = Self::to_api_messages(&request.messages);
        if messages.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "request has no user message".into(),
            ));
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::json!(request.system);
        }

        debug!(
            provider = "anthropic",
            model = %self.model,
            messages = messages.len(),
            max_tokens = request.max_tokens,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response, "Anthropic").await?;

        let api_resp: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse Anthropic response: {e}")))?;

        Ok(Self::to_completion_response(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    #[test]
    fn constructor_with_base_url() {
        let provider = AnthropicProvider::new("sk-ant-test", "claude-test")
            .unwrap()
            .with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), "claude-test");
    }

    #[test]
    fn messages_start_with_user_and_alternate() {
        let messages = vec![
            PromptMessage::assistant("Hello! How can I help?"),
            PromptMessage::user("What is Rust?"),
            PromptMessage::user("Be brief."),
            PromptMessage::assistant(""),
            PromptMessage::assistant("A systems language."),
        ];
        let api = AnthropicProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "user");
        assert_eq!(api[0].content, "What is Rust?\n\nBe brief.");
        assert_eq!(api[1].role, "assistant");
    }

    #[test]
    fn parses_text_blocks_and_ignores_others() {
        let raw = serde_json::json!({
            "id": "msg_1",
            "model": "claude-test",
            "content": [
                {"type": "text", "text": "KNOWLEDGE"},
                {"type": "thinking", "thinking": "hmm"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 1}
        });
        let resp: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let out = AnthropicProvider::to_completion_response(resp);
        assert_eq!(out.text, "KNOWLEDGE");
        assert_eq!(out.usage.unwrap().total_tokens, 13);
    }

    async fn echo(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> (StatusCode, Json<serde_json::Value>) {
        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("sk-good") {
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "bad key"})));
        }
        let text = format!(
            "system={} messages={} max_tokens={}",
            body["system"].as_str().unwrap_or(""),
            body["messages"].as_array().map(|m| m.len()).unwrap_or(0),
            body["max_tokens"]
        );
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": "msg_1",
                "model": body["model"],
                "content": [{"type": "text", "text": text}],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            })),
        )
    }

    #[tokio::test]
    async fn complete_round_trips_through_http() {
        let base = serve(Router::new().route("/v1/messages", post(echo))).await;
        let provider = AnthropicProvider::new("sk-good", "claude-test").unwrap().with_base_url(base);

        let request = CompletionRequest::new(
            "You are TARS.",
            vec![PromptMessage::user("hi"), PromptMessage::assistant("hello"), PromptMessage::user("bye")],
            64,
        );
        let resp = provider.complete(request).await.unwrap();
        assert_eq!(resp.text, "system=You are TARS. messages=3 max_tokens=64");
        assert_eq!(resp.model, "claude-test");
    }

    #[tokio::test]
    async fn bad_key_maps_to_authentication_failed() {
        let base = serve(Router::new().route("/v1/messages", post(echo))).await;
        let provider = AnthropicProvider::new("sk-bad", "claude-test").unwrap().with_base_url(base);

        let err = provider
            .complete(CompletionRequest::new("", vec![PromptMessage::user("hi")], 16))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn rate_limit_and_server_errors_are_mapped() {
        let router = Router::new()
            .route(
                "/limited/v1/messages",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "12")], "slow down") }),
            )
            .route(
                "/broken/v1/messages",
                post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
            );
        let base = serve(router).await;
        let request = CompletionRequest::new("", vec![PromptMessage::user("hi")], 16);

        let limited = AnthropicProvider::new("k", "m").unwrap().with_base_url(format!("{base}/limited"));
        assert!(matches!(
            limited.complete(request.clone()).await,
            Err(ProviderError::RateLimited { retry_after_secs: 12 })
        ));

        let broken = AnthropicProvider::new("k", "m").unwrap().with_base_url(format!("{base}/broken"));
        match broken.complete(request).await {
            Err(ProviderError::ApiError { status_code, message }) => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn assistant_only_request_is_rejected_locally() {
        let provider = AnthropicProvider::new("k", "m").unwrap().with_base_url("http://127.0.0.1:9");
        let err = provider
            .complete(CompletionRequest::new("", vec![PromptMessage::assistant("hi")], 16))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
