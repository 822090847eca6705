//! Knowledge retrieval for TARS: chunking, vector indexing and document storage.
//!
//! - [`chunker`] splits text into overlapping, sentence-aligned chunks
//! - [`vector`] holds chunk vectors and ranks them by cosine similarity
//! - [`store`] persists documents, chunks and vectors
//! - [`knowledge`] ties them together behind [`KnowledgeBase`]

pub mod chunker;
pub mod in_memory;
pub mod knowledge;
pub mod store;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chunker::{ChunkSpan, Chunker, ChunkerConfig, chunk};
pub use in_memory::InMemoryDocumentStore;
pub use knowledge::{IndexHealth, IngestReport, KnowledgeBase, KnowledgeOptions, KnowledgeStats, RebuildReport};
pub use store::{ChunkRecord, DocumentStore, StoreStats, StoredVector};
pub use vector::{VectorIndex, cosine_similarity};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;
