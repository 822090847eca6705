//! Build the configured providers.

use std::sync::Arc;

use tars_config::AppConfig;
use tars_core::provider::{CompletionProvider, EmbeddingProvider};
use tars_core::ProviderError;
use tracing::info;

use crate::{AnthropicProvider, OpenAiCompatEmbedder};

/// Construct the completion and embedding providers from config.
///
/// The completion provider requires an API key. The embedding endpoint may
/// run without one (local servers), so its key is optional.
pub fn build_from_config(
    config: &AppConfig,
) -> Result<(Arc<dyn CompletionProvider>, Arc<dyn EmbeddingProvider>), ProviderError> {
    let api_key = config
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            ProviderError::NotConfigured(
                "No API key set. Set ANTHROPIC_API_KEY or api_key in ~/.tars/config.toml".into(),
            )
        })?;

    let completion = AnthropicProvider::with_timeout(
        api_key,
        config.anthropic.model.clone(),
        config.timeouts.completion(),
    )?
    .with_base_url(config.anthropic.api_url.clone());

    let embedder = build_embedder(config)?;

    info!(
        completion_model = %config.anthropic.model,
        embedding_model = %config.embedding.model,
        "Providers configured"
    );

    Ok((Arc::new(completion), Arc::new(embedder)))
}

/// Construct only the embedding provider. Needs no completion API key.
pub fn build_embedder(config: &AppConfig) -> Result<OpenAiCompatEmbedder, ProviderError> {
    Ok(OpenAiCompatEmbedder::new(
        config.embedding.api_url.clone(),
        config.embedding.api_key.clone().filter(|k| !k.trim().is_empty()),
        config.embedding.model.clone(),
        config.timeouts.embedding(),
    )?
    .with_dimensions(config.embedding.dimensions))
}
