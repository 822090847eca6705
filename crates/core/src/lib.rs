//! # TARS Core
//!
//! Domain types, traits, and error definitions for the TARS knowledge assistant.
//! This crate has no I/O of its own: it defines the document model, the
//! provider and collaborator traits, and the error taxonomy that every other
//! crate implements against.
//!
//! ## Layout
//!
//! - [`document`]: documents, chunks, vector entries and search results
//! - [`provider`]: completion and embedding provider traits
//! - [`collaborator`]: calendar and email collaborator traits
//! - [`intent`]: the closed set of query intents
//! - [`message`]: conversation turns

pub mod collaborator;
pub mod document;
pub mod error;
pub mod intent;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use collaborator::{CalendarEvent, CalendarProvider, CalendarQuery, EmailDraft, EmailProvider, EmailStatus};
pub use document::{Chunk, Document, DocumentSummary, SearchResult, VectorEntry};
pub use error::{CollaboratorError, Error, ProviderError, Result, StorageError};
pub use intent::Intent;
pub use message::{ConversationTurn, Role};
pub use provider::{CompletionProvider, CompletionRequest, CompletionResponse, EmbeddingProvider, PromptMessage, Usage};
