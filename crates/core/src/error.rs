//! Error types for the TARS domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! External dependencies (providers, storage, collaborators) each have their
//! own bounded-context error that folds into the top-level [`Error`].

use thiserror::Error;

/// The top-level error type for all TARS operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration ---
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // --- External providers ---
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(#[source] ProviderError),

    #[error("Completion provider unavailable: {0}")]
    CompletionUnavailable(#[source] ProviderError),

    // --- Index / store consistency ---
    #[error("Index corrupt: chunk {chunk_id} is indexed but missing from the document store")]
    IndexCorrupt { chunk_id: String },

    #[error("Vector search timed out after {secs}s")]
    SearchTimedOut { secs: u64 },

    // --- Routing ---
    #[error("Intent classification ambiguous: {0:?}")]
    IntentClassificationAmbiguous(String),

    // --- Context assembly ---
    #[error("Context budget exceeded: {required} tokens required, budget is {budget}")]
    ContextBudgetExceeded { required: usize, budget: usize },

    // --- Documents ---
    #[error("Document '{0}' has no text content")]
    EmptyDocument(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    // --- Bounded contexts ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller can reasonably retry or continue in degraded mode.
    ///
    /// Configuration and storage failures are fatal for the operation at hand.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingUnavailable(_)
                | Error::CompletionUnavailable(_)
                | Error::IndexCorrupt { .. }
                | Error::SearchTimedOut { .. }
                | Error::IntentClassificationAmbiguous(_)
                | Error::Collaborator(_)
        )
    }

    /// A short message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Error::EmbeddingUnavailable(_) | Error::SearchTimedOut { .. } => {
                "The knowledge base is temporarily unavailable. Answering without it.".into()
            }
            Error::CompletionUnavailable(_) => {
                "The language model is temporarily unavailable. Please try again shortly.".into()
            }
            Error::IndexCorrupt { .. } => {
                "Some search results were skipped because the index is out of date. Run `tars rebuild`.".into()
            }
            Error::Collaborator(e) => format!("That integration failed: {e}"),
            Error::EmptyDocument(name) => format!("'{name}' contains no text to index."),
            Error::ContextBudgetExceeded { .. } => {
                "Your message is too long for the model's context window.".into()
            }
            other => format!("Something went wrong: {other}"),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} integration is not configured")]
    NotConfigured(String),

    #[error("{service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("{service} timed out after {secs}s")]
    Timeout { service: String, secs: u64 },
}
