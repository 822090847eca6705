//! The knowledge base: chunker, embedder, vector index and document store
//! wired together.
//!
//! Ingestion, removal and rebuild are serialized by a writer lock. Searches
//! run against an index snapshot and only wait on that lock to confirm a
//! hit whose chunk has vanished from the store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tars_config::AppConfig;
use tars_core::{
    Document, DocumentSummary, EmbeddingProvider, Error, ProviderError, Result, SearchResult, VectorEntry,
};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::chunker::{Chunker, ChunkerConfig};
use crate::store::DocumentStore;
use crate::vector::{self, VectorIndex};

/// Runtime knobs for a [`KnowledgeBase`].
#[derive(Debug, Clone)]
pub struct KnowledgeOptions {
    pub chunker: ChunkerConfig,
    /// Concurrent embedding requests during ingestion and rebuild
    pub embed_concurrency: usize,
    pub embedding_timeout: Duration,
    pub search_timeout: Duration,
}

impl Default for KnowledgeOptions {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            embed_concurrency: 4,
            embedding_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(10),
        }
    }
}

impl KnowledgeOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            chunker: ChunkerConfig::new(config.knowledge.chunk_size, config.knowledge.chunk_overlap)?,
            embed_concurrency: config.knowledge.embed_concurrency.max(1),
            embedding_timeout: config.timeouts.embedding(),
            search_timeout: config.timeouts.search(),
        })
    }
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub source_name: String,
    pub chunks: usize,
    /// True when identical content was already stored and nothing was written.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub chunks: usize,
    pub model: String,
}

/// Consistency between the document store and the vector index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexHealth {
    pub chunks: usize,
    pub indexed_vectors: usize,
    /// Chunks with no vector in the index
    pub missing_vectors: usize,
    /// Index entries whose chunk is gone from the store
    pub orphan_vectors: usize,
    /// Stored vectors produced by a different embedding model
    pub stale_model_vectors: usize,
    /// More than one vector length in the index
    pub mixed_dimensions: bool,
    /// A search hit a chunk missing from the store since the last rebuild
    pub flagged_by_search: bool,
}

impl IndexHealth {
    pub fn is_healthy(&self) -> bool {
        self.missing_vectors == 0
            && self.orphan_vectors == 0
            && self.stale_model_vectors == 0
            && !self.mixed_dimensions
            && !self.flagged_by_search
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    pub store: String,
    pub documents: usize,
    pub chunks: usize,
    pub indexed_vectors: usize,
    pub embedding_model: String,
}

pub struct KnowledgeBase {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: VectorIndex,
    chunker: Chunker,
    options: KnowledgeOptions,
    writer: Mutex<()>,
    needs_rebuild: AtomicBool,
}

impl KnowledgeBase {
    /// Open a knowledge base, loading persisted vectors into the index.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: KnowledgeOptions,
    ) -> Result<Self> {
        let chunker = Chunker::new(options.chunker)?;
        let stored = store.load_vectors().await?;

        let stale = stored.iter().filter(|v| v.model != embedder.model_name()).count();
        if stale > 0 {
            warn!(
                stale,
                model = embedder.model_name(),
                "Stored vectors come from a different embedding model; run a rebuild"
            );
        }

        let index = VectorIndex::from_entries(stored.into_iter().map(|v| VectorEntry {
            chunk_id: v.chunk_id,
            vector: v.vector,
        }));
        let vectors = index.len().await;
        info!(store = store.name(), vectors, "Knowledge base opened");

        Ok(Self {
            store,
            embedder,
            index,
            chunker,
            options,
            writer: Mutex::new(()),
            needs_rebuild: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &KnowledgeOptions {
        &self.options
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Whether a search has seen an index/store mismatch since the last rebuild.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild.load(Ordering::Relaxed)
    }

    // ── Ingestion ──────────────────────────────────────────────────────────

    /// Chunk, embed and store one document.
    ///
    /// Nothing is written unless every chunk embeds successfully.
    pub async fn ingest(&self, document: Document) -> Result<IngestReport> {
        if document.full_text.trim().is_empty() {
            return Err(Error::EmptyDocument(document.source_name));
        }

        let _guard = self.writer.lock().await;

        if let Some(existing) = self.store.find_by_hash(&document.content_hash).await? {
            info!(
                source = %document.source_name,
                document_id = %existing,
                "Identical content already indexed, skipping"
            );
            return Ok(IngestReport {
                document_id: existing,
                source_name: document.source_name,
                chunks: 0,
                deduplicated: true,
            });
        }

        let chunks = self.chunker.chunk_document(&document.id, &document.full_text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_texts(&texts).await?;

        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(c, vector)| VectorEntry {
                chunk_id: c.id.clone(),
                vector,
            })
            .collect();

        self.store
            .insert_document(&document, &chunks, &entries, self.embedder.model_name())
            .await?;
        self.index.upsert_batch(entries).await;

        info!(
            document_id = %document.id,
            source = %document.source_name,
            chunks = chunks.len(),
            "Document ingested"
        );

        Ok(IngestReport {
            document_id: document.id,
            source_name: document.source_name,
            chunks: chunks.len(),
            deduplicated: false,
        })
    }

    /// Ingest several documents. A failure affects only its own document.
    pub async fn ingest_many(&self, documents: Vec<Document>) -> Vec<(String, Result<IngestReport>)> {
        let mut out = Vec::with_capacity(documents.len());
        for document in documents {
            let source = document.source_name.clone();
            let result = self.ingest(document).await;
            if let Err(e) = &result {
                warn!(source = %source, error = %e, "Document ingestion failed");
            }
            out.push((source, result));
        }
        out
    }

    /// Remove a document, its chunks and their vectors.
    pub async fn remove_document(&self, document_id: &str) -> Result<usize> {
        let _guard = self.writer.lock().await;

        let chunk_ids = self
            .store
            .remove_document(document_id)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;
        self.index.remove_batch(&chunk_ids).await;

        info!(document_id, chunks = chunk_ids.len(), "Document removed");
        Ok(chunk_ids.len())
    }

    // ── Search ─────────────────────────────────────────────────────────────

    /// Embed `query` and return the best matching chunks.
    pub async fn search(&self, query: &str, top_k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
        let vector = self.embed_one(query).await?;
        self.search_vector(vector, top_k, min_score).await
    }

    /// Search with a precomputed query vector.
    ///
    /// Hits whose chunk is missing from the store are dropped and flag the
    /// index for rebuild.
    pub async fn search_vector(&self, query: Vec<f32>, top_k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
        let snapshot = self.index.snapshot().await;
        if snapshot.is_empty() {
            debug!("Search against empty index");
            return Ok(Vec::new());
        }

        let scan = tokio::task::spawn_blocking(move || vector::rank(&snapshot, &query, top_k, min_score));
        let hits = match timeout(self.options.search_timeout, scan).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => return Err(Error::Internal(format!("vector scan task failed: {e}"))),
            Err(_) => {
                return Err(Error::SearchTimedOut {
                    secs: self.options.search_timeout.as_secs(),
                });
            }
        };

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let records = self.store.get_chunks(&ids).await?;
        let by_id: HashMap<&str, _> = records.iter().map(|r| (r.chunk.id.as_str(), r)).collect();

        let mut results = Vec::with_capacity(hits.len());
        for (chunk_id, score) in hits {
            let Some(record) = by_id.get(chunk_id.as_str()) else {
                if self.is_orphan(&chunk_id).await {
                    let err = Error::IndexCorrupt { chunk_id };
                    warn!(error = %err, "Skipping search hit; index rebuild recommended");
                    self.needs_rebuild.store(true, Ordering::Relaxed);
                }
                continue;
            };
            results.push(SearchResult {
                chunk_id,
                score,
                text: record.chunk.text.clone(),
                document_source: record.source_name.clone(),
            });
        }

        debug!(results = results.len(), top_k, min_score, "Search complete");
        Ok(results)
    }

    /// Whether an indexed chunk is really missing from the store, as opposed
    /// to caught mid-removal. Waits for any in-flight write before deciding.
    async fn is_orphan(&self, chunk_id: &str) -> bool {
        if !self.index.contains(chunk_id).await {
            return false;
        }
        let _guard = self.writer.lock().await;
        if !self.index.contains(chunk_id).await {
            return false;
        }
        match self.store.get_chunk(chunk_id).await {
            Ok(record) => record.is_none(),
            Err(e) => {
                debug!(chunk_id, error = %e, "Could not re-check search hit");
                false
            }
        }
    }

    // ── Maintenance ────────────────────────────────────────────────────────

    /// Re-embed every stored chunk and replace all vectors at once.
    ///
    /// Document and chunk rows are untouched, so this can be run repeatedly.
    /// If embedding fails, the existing index is kept.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let _guard = self.writer.lock().await;

        let chunks = self.store.all_chunks().await?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        info!(chunks = chunks.len(), model = self.embedder.model_name(), "Rebuilding vector index");

        let vectors = self.embed_texts(&texts).await?;
        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(c, vector)| VectorEntry {
                chunk_id: c.id.clone(),
                vector,
            })
            .collect();

        self.store
            .replace_vectors(&entries, self.embedder.model_name())
            .await?;
        self.index.replace_all(entries).await;
        self.needs_rebuild.store(false, Ordering::Relaxed);

        info!(chunks = chunks.len(), "Vector index rebuilt");
        Ok(RebuildReport {
            chunks: chunks.len(),
            model: self.embedder.model_name().to_string(),
        })
    }

    /// Compare the index against the store.
    pub async fn verify(&self) -> Result<IndexHealth> {
        let chunks = self.store.all_chunks().await?;
        let stored = self.store.load_vectors().await?;
        let snapshot = self.index.snapshot().await;

        let chunk_ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let dimensions: HashSet<usize> = snapshot.values().map(Vec::len).collect();
        let model = self.embedder.model_name();

        Ok(IndexHealth {
            chunks: chunks.len(),
            indexed_vectors: snapshot.len(),
            missing_vectors: chunk_ids.iter().filter(|id| !snapshot.contains_key(**id)).count(),
            orphan_vectors: snapshot.keys().filter(|id| !chunk_ids.contains(id.as_str())).count(),
            stale_model_vectors: stored.iter().filter(|v| v.model != model).count(),
            mixed_dimensions: dimensions.len() > 1,
            flagged_by_search: self.needs_rebuild(),
        })
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.store.list_documents().await
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Document> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))
    }

    pub async fn stats(&self) -> Result<KnowledgeStats> {
        let stats = self.store.stats().await?;
        Ok(KnowledgeStats {
            store: self.store.name().to_string(),
            documents: stats.documents,
            chunks: stats.chunks,
            indexed_vectors: self.index.len().await,
            embedding_model: self.embedder.model_name().to_string(),
        })
    }

    // ── Embedding ──────────────────────────────────────────────────────────

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        match timeout(self.options.embedding_timeout, self.embedder.embed(text)).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(e)) => Err(Error::EmbeddingUnavailable(e)),
            Err(_) => Err(Error::EmbeddingUnavailable(ProviderError::Timeout(format!(
                "embedding took longer than {}s",
                self.options.embedding_timeout.as_secs()
            )))),
        }
    }

    /// Embed texts with bounded concurrency, preserving order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        stream::iter(texts)
            .map(|text| self.embed_one(text))
            .buffered(self.options.embed_concurrency.max(1))
            .try_collect()
            .await
    }
}
