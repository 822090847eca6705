//! Intent routing: one constrained LLM call picks a label, then the
//! matching handler runs.
//!
//! Classification never fails from the caller's point of view. An
//! unrecognised label or a failed call falls back to [`Intent::Knowledge`].

use std::sync::Arc;
use std::time::Duration;

use tars_core::provider::{CompletionProvider, CompletionRequest, PromptMessage};
use tars_core::{Error, Intent, Result, Role};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::context::ContextManager;
use crate::handlers::{HandlerReply, IntentHandlers};

const CLASSIFIER_PROMPT: &str = "You classify requests sent to a personal assistant. \
Reply with exactly one word from this list and nothing else:
KNOWLEDGE - questions answered from the user's uploaded documents or general knowledge
CALENDAR - questions about meetings, appointments, events or schedule
EMAIL - requests to write, send or draft an email
ANALYSIS - requests to compare, summarise or analyse across many documents";

pub struct IntentRouter {
    classifier: Arc<dyn CompletionProvider>,
    classifier_max_tokens: u32,
    timeout: Duration,
    handlers: IntentHandlers,
}

impl IntentRouter {
    pub fn new(classifier: Arc<dyn CompletionProvider>, handlers: IntentHandlers) -> Self {
        Self {
            classifier,
            classifier_max_tokens: 10,
            timeout: Duration::from_secs(30),
            handlers,
        }
    }

    pub fn with_classifier_max_tokens(mut self, max: u32) -> Self {
        self.classifier_max_tokens = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn handlers(&self) -> &IntentHandlers {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut IntentHandlers {
        &mut self.handlers
    }

    /// Classify `query`. `history_hint` is a few recent turns so references
    /// like "that meeting" can resolve; it may be empty.
    pub async fn classify(&self, query: &str, history_hint: &str) -> Intent {
        let content = if history_hint.is_empty() {
            format!("Request: {query}")
        } else {
            format!("Recent conversation:\n{history_hint}\n\nRequest: {query}")
        };
        let request = CompletionRequest::new(CLASSIFIER_PROMPT, vec![PromptMessage::user(content)], self.classifier_max_tokens)
            .with_temperature(0.0);

        let raw = match timeout(self.timeout, self.classifier.complete(request)).await {
            Ok(Ok(response)) => response.text,
            Ok(Err(e)) => {
                warn!(error = %e, "Intent classification failed, defaulting to KNOWLEDGE");
                return Intent::Knowledge;
            }
            Err(_) => {
                warn!(secs = self.timeout.as_secs(), "Intent classification timed out, defaulting to KNOWLEDGE");
                return Intent::Knowledge;
            }
        };

        match parse_label(&raw) {
            Ok(intent) => {
                debug!(intent = %intent, "Query classified");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Defaulting to KNOWLEDGE");
                Intent::Knowledge
            }
        }
    }

    /// Run the handler for `intent`, then record the exchange in `context`.
    ///
    /// Nothing is recorded if the handler fails.
    pub async fn dispatch(&self, intent: Intent, query: &str, context: &mut ContextManager) -> Result<HandlerReply> {
        info!(intent = %intent, "Dispatching query");
        let reply = self.handlers.get(intent).handle(query, context).await?;
        context.record_turn(Role::User, query);
        context.record_turn(Role::Assistant, reply.text.clone());
        Ok(reply)
    }
}

/// Parse a classifier reply into an intent.
///
/// Accepts an exact label, or text in which exactly one distinct label
/// appears as a whole word. Anything else is `IntentClassificationAmbiguous`.
pub fn parse_label(raw: &str) -> Result<Intent> {
    if let Some(intent) = Intent::from_label(raw) {
        return Ok(intent);
    }

    let mut found: Vec<Intent> = Vec::new();
    for word in raw.split(|c: char| !c.is_ascii_alphanumeric()) {
        match Intent::from_label(word) {
            Some(intent) if !found.contains(&intent) => found.push(intent),
            _ => {}
        }
    }

    match found.as_slice() {
        [intent] => Ok(*intent),
        _ => Err(Error::IntentClassificationAmbiguous(raw.trim().to_string())),
    }
}
