//! Document store trait.
//!
//! The store owns document and chunk text. It also persists each chunk's
//! vector and the embedding model that produced it, so the in-process
//! [`VectorIndex`](crate::vector::VectorIndex) can be restored on startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tars_core::{Chunk, Document, DocumentSummary, Result, VectorEntry};

/// A chunk joined with the name of its source document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub source_name: String,
}

/// A persisted vector together with the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name (e.g., "sqlite").
    fn name(&self) -> &str;

    /// Insert a document with its chunks and their vectors, all or nothing.
    ///
    /// `vectors` is keyed by chunk id and produced by `model`.
    async fn insert_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
        vectors: &[VectorEntry],
        model: &str,
    ) -> Result<()>;

    /// Delete a document and its chunks. Returns the removed chunk ids,
    /// or `None` if the document did not exist.
    async fn remove_document(&self, document_id: &str) -> Result<Option<Vec<String>>>;

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;

    /// Id of a stored document with this content hash, if any.
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<String>>;

    /// Documents ordered by upload time, newest first.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>>;

    /// Fetch several chunks. Missing ids are skipped.
    async fn get_chunks(&self, chunk_ids: &[String]) -> Result<Vec<ChunkRecord>> {
        let mut out = Vec::with_capacity(chunk_ids.len());
        for id in chunk_ids {
            if let Some(record) = self.get_chunk(id).await? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Every chunk, ordered by document then sequence.
    async fn all_chunks(&self) -> Result<Vec<Chunk>>;

    /// Every persisted vector.
    async fn load_vectors(&self) -> Result<Vec<StoredVector>>;

    /// Replace all persisted vectors in one transaction. Chunks without an
    /// entry in `vectors` are left without a vector.
    async fn replace_vectors(&self, vectors: &[VectorEntry], model: &str) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}
