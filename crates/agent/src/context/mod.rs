//! Session context: token estimation and bounded prompt assembly.

pub mod manager;
pub mod token;

pub use manager::{AssembledPrompt, ContextManager, HINT_CHARS_PER_TURN, SearchBatch};
pub use token::{MESSAGE_OVERHEAD, TokenEstimator};
