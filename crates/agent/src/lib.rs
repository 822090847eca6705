//! The conversational side of TARS.
//!
//! For every query the assistant:
//!
//! 1. **Classifies** it into an [`Intent`](tars_core::Intent) with one
//!    constrained LLM call (falling back to KNOWLEDGE)
//! 2. **Dispatches** to that intent's handler; retrieval intents search the
//!    knowledge base first, calendar and email call their collaborators
//! 3. **Assembles** a token-bounded prompt from the session's history and
//!    recent excerpts, and generates the answer
//! 4. **Records** the exchange in the session's [`ContextManager`]

pub mod assistant;
pub mod context;
pub mod handlers;
pub mod responder;
pub mod router;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assistant::{Assistant, AssistantReply, Session};
pub use context::{AssembledPrompt, ContextManager, SearchBatch, TokenEstimator};
pub use handlers::{
    CalendarHandler, EmailHandler, HandlerReply, IntentHandler, IntentHandlers, RetrievalHandler,
};
pub use responder::{Generated, Responder};
pub use router::{IntentRouter, parse_label};
