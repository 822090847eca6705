//! In-memory document store, useful for testing and ephemeral sessions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tars_core::{Chunk, Document, DocumentSummary, Result, VectorEntry};
use tokio::sync::RwLock;

use crate::store::{ChunkRecord, DocumentStore, StoreStats, StoredVector};

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Document>,
    /// Keyed by chunk id; ids sort by document then sequence.
    chunks: BTreeMap<String, Chunk>,
    vectors: HashMap<String, (Vec<f32>, String)>,
}

/// A store that keeps everything behind one lock, so every write is atomic.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a chunk's text while leaving its vector behind.
    ///
    /// Simulates a store/index mismatch in tests.
    #[cfg(test)]
    pub(crate) async fn forget_chunk(&self, chunk_id: &str) {
        self.inner.write().await.chunks.remove(chunk_id);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
        vectors: &[VectorEntry],
        model: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.documents.insert(document.id.clone(), document.clone());
        for chunk in chunks {
            inner.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        for v in vectors {
            inner
                .vectors
                .insert(v.chunk_id.clone(), (v.vector.clone(), model.to_string()));
        }
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<Option<Vec<String>>> {
        let mut inner = self.inner.write().await;
        if inner.documents.remove(document_id).is_none() {
            return Ok(None);
        }
        let ids: Vec<String> = inner
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id.clone())
            .collect();
        for id in &ids {
            inner.chunks.remove(id);
            inner.vectors.remove(id);
        }
        Ok(Some(ids))
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(self.inner.read().await.documents.get(document_id).cloned())
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<String>> {
        Ok(self
            .inner
            .read()
            .await
            .documents
            .values()
            .find(|d| d.content_hash == content_hash)
            .map(|d| d.id.clone()))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for chunk in inner.chunks.values() {
            *counts.entry(chunk.document_id.as_str()).or_default() += 1;
        }
        let mut out: Vec<DocumentSummary> = inner
            .documents
            .values()
            .map(|d| DocumentSummary::from_document(d, counts.get(d.id.as_str()).copied().unwrap_or(0)))
            .collect();
        out.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.chunks.get(chunk_id).map(|chunk| ChunkRecord {
            source_name: inner
                .documents
                .get(&chunk.document_id)
                .map(|d| d.source_name.clone())
                .unwrap_or_default(),
            chunk: chunk.clone(),
        }))
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().await;
        let mut chunks: Vec<Chunk> = inner.chunks.values().cloned().collect();
        chunks.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.sequence_index.cmp(&b.sequence_index))
        });
        Ok(chunks)
    }

    async fn load_vectors(&self) -> Result<Vec<StoredVector>> {
        let inner = self.inner.read().await;
        let mut out: Vec<StoredVector> = inner
            .vectors
            .iter()
            .map(|(id, (vector, model))| StoredVector {
                chunk_id: id.clone(),
                vector: vector.clone(),
                model: model.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(out)
    }

    async fn replace_vectors(&self, vectors: &[VectorEntry], model: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let next: HashMap<String, (Vec<f32>, String)> = vectors
            .iter()
            .filter(|v| inner.chunks.contains_key(&v.chunk_id))
            .map(|v| (v.chunk_id.clone(), (v.vector.clone(), model.to_string())))
            .collect();
        inner.vectors = next;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().await;
        Ok(StoreStats {
            documents: inner.documents.len(),
            chunks: inner.chunks.len(),
            embedded_chunks: inner.vectors.len(),
        })
    }
}
