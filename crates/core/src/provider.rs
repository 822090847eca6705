//! Provider traits: the abstraction over LLM and embedding backends.
//!
//! The core never constructs network clients. Callers inject an
//! `Arc<dyn CompletionProvider>` and an `Arc<dyn EmbeddingProvider>` at
//! construction time, which keeps the engine testable with fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Role;

/// A single message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A text-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System instructions, sent separately from the message list.
    pub system: String,

    /// Conversation messages, oldest first.
    pub messages: Vec<PromptMessage>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, messages: Vec<PromptMessage>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            messages,
            max_tokens,
            temperature: default_temperature(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from a completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,

    /// Which model actually responded
    pub model: String,

    pub usage: Option<Usage>,
}

/// An opaque text-completion capability.
///
/// Used both for intent classification and for answer generation.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError>;
}

/// Maps text to a fixed-length vector.
///
/// Implementations are assumed deterministic for a given model version.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The model identifier, persisted alongside every stored vector.
    fn model_name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;

    /// Embed several texts. The default implementation embeds them one by one.
    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }

        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[test]
    fn completion_request_defaults() {
        let req = CompletionRequest::new("sys", vec![PromptMessage::user("hi")], 64);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn default_embed_batch_preserves_order() {
        let embedder = LengthEmbedder;
        let vectors = embedder
            .embed_batch(&["a".to_string(), "abc".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0]]);
    }
}
