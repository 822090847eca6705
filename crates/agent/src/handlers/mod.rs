//! Intent handlers.
//!
//! Each [`Intent`] has exactly one handler. [`IntentHandlers`] is the lookup
//! table; the exhaustive match in [`IntentHandlers::get`] means a new intent
//! cannot be added without a handler.

pub mod calendar;
pub mod email;
pub mod retrieval;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tars_core::{Intent, Result};

use crate::context::ContextManager;

pub use calendar::{CalendarHandler, days_ahead};
pub use email::{EmailHandler, ParsedEmail, parse_composition};
pub use retrieval::RetrievalHandler;

/// What a handler produced for one query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HandlerReply {
    pub text: String,
    /// Set when a retrieval intent answered without knowledge-base excerpts.
    pub context_free: bool,
    /// Distinct document sources behind the answer, best match first.
    pub sources: Vec<String>,
}

impl HandlerReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Handles queries of one intent.
///
/// Handlers may read and extend `context` (retrieval handlers record their
/// search results); the router records the conversation turns afterwards.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn handle(&self, query: &str, context: &mut ContextManager) -> Result<HandlerReply>;
}

/// One handler per intent.
pub struct IntentHandlers {
    knowledge: Arc<dyn IntentHandler>,
    calendar: Arc<dyn IntentHandler>,
    email: Arc<dyn IntentHandler>,
    analysis: Arc<dyn IntentHandler>,
}

impl IntentHandlers {
    pub fn new(
        knowledge: Arc<dyn IntentHandler>,
        calendar: Arc<dyn IntentHandler>,
        email: Arc<dyn IntentHandler>,
        analysis: Arc<dyn IntentHandler>,
    ) -> Self {
        Self {
            knowledge,
            calendar,
            email,
            analysis,
        }
    }

    pub fn get(&self, intent: Intent) -> &dyn IntentHandler {
        match intent {
            Intent::Knowledge => self.knowledge.as_ref(),
            Intent::Calendar => self.calendar.as_ref(),
            Intent::Email => self.email.as_ref(),
            Intent::Analysis => self.analysis.as_ref(),
        }
    }

    /// Swap in a different handler for `intent`.
    pub fn replace(&mut self, intent: Intent, handler: Arc<dyn IntentHandler>) {
        match intent {
            Intent::Knowledge => self.knowledge = handler,
            Intent::Calendar => self.calendar = handler,
            Intent::Email => self.email = handler,
            Intent::Analysis => self.analysis = handler,
        }
    }
}

#[cfg(test)]
pub(crate) struct FixedHandler {
    prefix: String,
    intent: Intent,
}

#[cfg(test)]
#[async_trait]
impl IntentHandler for FixedHandler {
    async fn handle(&self, _query: &str, _context: &mut ContextManager) -> Result<HandlerReply> {
        Ok(HandlerReply::text(format!("{} {}", self.prefix, self.intent)))
    }
}

#[cfg(test)]
impl IntentHandlers {
    /// Handlers that reply `"{prefix} {INTENT}"`.
    pub(crate) fn fixed(prefix: &str) -> Self {
        let make = |intent| -> Arc<dyn IntentHandler> {
            Arc::new(FixedHandler {
                prefix: prefix.to_string(),
                intent,
            })
        };
        Self::new(
            make(Intent::Knowledge),
            make(Intent::Calendar),
            make(Intent::Email),
            make(Intent::Analysis),
        )
    }
}
