//! Answer generation: assemble a bounded prompt and call the completion
//! provider under a timeout.

use std::sync::Arc;
use std::time::Duration;

use tars_config::AppConfig;
use tars_core::{CompletionProvider, Error, ProviderError, Result};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::context::{AssembledPrompt, ContextManager};

/// Text produced for one query, with the prompt it was produced from.
#[derive(Debug, Clone)]
pub struct Generated {
    pub text: String,
    pub prompt: AssembledPrompt,
}

pub struct Responder {
    provider: Arc<dyn CompletionProvider>,
    max_prompt_tokens: usize,
    max_response_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl Responder {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            max_prompt_tokens: 180_000,
            max_response_tokens: 4096,
            temperature: 0.7,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(provider: Arc<dyn CompletionProvider>, config: &AppConfig) -> Self {
        Self {
            provider,
            max_prompt_tokens: config.context.max_prompt_tokens,
            max_response_tokens: config.anthropic.max_response_tokens,
            temperature: config.anthropic.temperature,
            timeout: config.timeouts.completion(),
        }
    }

    pub fn with_max_prompt_tokens(mut self, max: usize) -> Self {
        self.max_prompt_tokens = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a prompt from `context` and ask the provider for an answer.
    pub async fn generate(&self, system_prompt: &str, context: &ContextManager, query: &str) -> Result<Generated> {
        let prompt = context.build_prompt(system_prompt, query, self.max_prompt_tokens)?;
        debug!(
            provider = self.provider.name(),
            tokens = prompt.estimated_tokens,
            turns = prompt.turns_included,
            excerpts = prompt.excerpts_included,
            "Generating answer"
        );

        let request = prompt
            .clone()
            .into_request(self.max_response_tokens)
            .with_temperature(self.temperature);

        let response = match timeout(self.timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(provider = self.provider.name(), error = %e, "Completion failed");
                return Err(Error::CompletionUnavailable(e));
            }
            Err(_) => {
                warn!(provider = self.provider.name(), secs = self.timeout.as_secs(), "Completion timed out");
                return Err(Error::CompletionUnavailable(ProviderError::Timeout(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                ))));
            }
        };

        Ok(Generated {
            text: response.text.trim().to_string(),
            prompt,
        })
    }
}
