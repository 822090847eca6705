//! Provider implementations for TARS.
//!
//! - [`AnthropicProvider`] implements `CompletionProvider` over the Messages API
//! - [`OpenAiCompatEmbedder`] implements `EmbeddingProvider` over any
//!   OpenAI-compatible `/embeddings` endpoint
//!
//! [`build_from_config`] builds both from an `AppConfig`.

pub mod anthropic;
pub mod factory;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use factory::{build_embedder, build_from_config};
pub use openai_compat::OpenAiCompatEmbedder;

use tars_core::ProviderError;

/// Map a non-success HTTP response to a `ProviderError`.
pub(crate) async fn check_status(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        429 => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            Err(ProviderError::RateLimited { retry_after_secs })
        }
        401 | 403 => Err(ProviderError::AuthenticationFailed(format!(
            "Invalid {provider} API key"
        ))),
        _ => {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(provider, status, body = %message, "Provider API error");
            Err(ProviderError::ApiError {
                status_code: status,
                message,
            })
        }
    }
}

/// Map a reqwest transport error.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}
