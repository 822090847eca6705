//! Document, chunk and search-result types.
//!
//! A [`Document`] owns its [`Chunk`]s. The vector index owns the vectors.
//! The two sides are joined only through `chunk_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// An uploaded document. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_name: String,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub full_text: String,
    /// Hex SHA-256 of `full_text`, used to skip re-ingesting identical content.
    pub content_hash: String,
}

impl Document {
    pub fn new(
        source_name: impl Into<String>,
        mime_type: impl Into<String>,
        full_text: impl Into<String>,
    ) -> Self {
        let full_text = full_text.into();
        Self {
            id: Uuid::new_v4().to_string(),
            source_name: source_name.into(),
            mime_type: mime_type.into(),
            uploaded_at: Utc::now(),
            content_hash: content_hash(&full_text),
            full_text,
        }
    }

    /// Plain-text document with a `text/plain` mime type.
    pub fn plain(source_name: impl Into<String>, full_text: impl Into<String>) -> Self {
        Self::new(source_name, "text/plain", full_text)
    }
}

/// Hex-encoded SHA-256 of a text.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// A contiguous span of a document's text; the unit of retrieval.
///
/// `start_offset`/`end_offset` are byte offsets into the document's
/// `full_text`; `char_length` counts Unicode scalar values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub sequence_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub char_length: usize,
}

impl Chunk {
    /// Stable chunk id derived from the owning document and position.
    pub fn make_id(document_id: &str, sequence_index: usize) -> String {
        format!("{document_id}-{sequence_index:06}")
    }
}

/// One vector per chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

/// A ranked search hit, joined with its chunk text. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    /// Cosine similarity in [-1, 1]; higher is more relevant.
    pub score: f32,
    pub text: String,
    pub document_source: String,
}

/// Listing view of a stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub source_name: String,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub char_count: usize,
    pub preview: String,
}

impl DocumentSummary {
    pub const PREVIEW_CHARS: usize = 300;

    pub fn from_document(doc: &Document, chunk_count: usize) -> Self {
        let char_count = doc.full_text.chars().count();
        let mut preview: String = doc.full_text.chars().take(Self::PREVIEW_CHARS).collect();
        if char_count > Self::PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            id: doc.id.clone(),
            source_name: doc.source_name.clone(),
            mime_type: doc.mime_type.clone(),
            uploaded_at: doc.uploaded_at,
            chunk_count,
            char_count,
            preview,
        }
    }
}
