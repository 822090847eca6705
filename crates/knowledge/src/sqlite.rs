//! SQLite document store.
//!
//! Uses a single SQLite database file with two tables:
//! - `documents`: one row per uploaded document
//! - `chunks`: chunk text, offsets and the chunk's embedding
//!
//! Deleting a document cascades to its chunks. Embeddings are stored as
//! little-endian `f32` blobs next to the name of the model that produced them.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tars_core::{Chunk, Document, DocumentSummary, Result, StorageError, VectorEntry};
use tracing::{debug, info};

use crate::store::{ChunkRecord, DocumentStore, StoreStats, StoredVector};

/// A persistent document store backed by SQLite.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite document store initialized at {}", path.display());
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create tables and indexes. Safe to run repeatedly.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id           TEXT PRIMARY KEY NOT NULL,
                source_name  TEXT NOT NULL,
                mime_type    TEXT NOT NULL,
                uploaded_at  TEXT NOT NULL,
                full_text    TEXT NOT NULL,
                content_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("documents table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id              TEXT PRIMARY KEY NOT NULL,
                document_id     TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                sequence_index  INTEGER NOT NULL,
                text            TEXT NOT NULL,
                start_offset    INTEGER NOT NULL,
                end_offset      INTEGER NOT NULL,
                char_length     INTEGER NOT NULL,
                embedding       BLOB,
                embedding_model TEXT,
                UNIQUE (document_id, sequence_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("chunks table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(content_hash)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(format!("hash index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, sequence_index)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(format!("chunk index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Serialize an embedding vector to bytes.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    fn row_to_document(row: &SqliteRow) -> Result<Document> {
        let uploaded_at: String = get(row, "uploaded_at")?;
        Ok(Document {
            id: get(row, "id")?,
            source_name: get(row, "source_name")?,
            mime_type: get(row, "mime_type")?,
            uploaded_at: chrono::DateTime::parse_from_rfc3339(&uploaded_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StorageError::QueryFailed(format!("uploaded_at column: {e}")))?,
            full_text: get(row, "full_text")?,
            content_hash: get(row, "content_hash")?,
        })
    }

    fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
        let sequence_index: i64 = get(row, "sequence_index")?;
        let start_offset: i64 = get(row, "start_offset")?;
        let end_offset: i64 = get(row, "end_offset")?;
        let char_length: i64 = get(row, "char_length")?;
        Ok(Chunk {
            id: get(row, "id")?,
            document_id: get(row, "document_id")?,
            sequence_index: sequence_index as usize,
            text: get(row, "text")?,
            start_offset: start_offset as usize,
            end_offset: end_offset as usize,
            char_length: char_length as usize,
        })
    }
}

/// Read a column, mapping failures to `StorageError::QueryFailed`.
fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StorageError::QueryFailed(format!("{column} column: {e}")).into())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
        vectors: &[VectorEntry],
        model: &str,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, source_name, mime_type, uploaded_at, full_text, content_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&document.id)
        .bind(&document.source_name)
        .bind(&document.mime_type)
        .bind(document.uploaded_at.to_rfc3339())
        .bind(&document.full_text)
        .bind(&document.content_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Storage(format!("INSERT document failed: {e}")))?;

        for chunk in chunks {
            let blob = vectors
                .iter()
                .find(|v| v.chunk_id == chunk.id)
                .map(|v| Self::embedding_to_blob(&v.vector));
            let chunk_model = blob.as_ref().map(|_| model);

            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, sequence_index, text, start_offset,
                                    end_offset, char_length, embedding, embedding_model)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.sequence_index as i64)
            .bind(&chunk.text)
            .bind(chunk.start_offset as i64)
            .bind(chunk.end_offset as i64)
            .bind(chunk.char_length as i64)
            .bind(blob)
            .bind(chunk_model)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Storage(format!("INSERT chunk failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(document_id = %document.id, chunks = chunks.len(), "Stored document");
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<Option<Vec<String>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Storage(format!("BEGIN failed: {e}")))?;

        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("chunk ids: {e}")))?;

        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Storage(format!("DELETE failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Storage(format!("COMMIT failed: {e}")))?;

        Ok((result.rows_affected() > 0).then_some(ids))
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("get document: {e}")))?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<String>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE content_hash = ?1 LIMIT 1")
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("hash lookup: {e}")))?;
        Ok(id)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT d.*, (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count
            FROM documents d
            ORDER BY d.uploaded_at DESC, d.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("list documents: {e}")))?;

        rows.iter()
            .map(|row| {
                let doc = Self::row_to_document(row)?;
                let count: i64 = get(row, "chunk_count")?;
                Ok(DocumentSummary::from_document(&doc, count as usize))
            })
            .collect()
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query(
            r#"
            SELECT c.*, d.source_name
            FROM chunks c JOIN documents d ON d.id = c.document_id
            WHERE c.id = ?1
            "#,
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("get chunk: {e}")))?;

        row.as_ref()
            .map(|row| {
                Ok(ChunkRecord {
                    chunk: Self::row_to_chunk(row)?,
                    source_name: get(row, "source_name")?,
                })
            })
            .transpose()
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let rows = sqlx::query("SELECT * FROM chunks ORDER BY document_id, sequence_index")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("all chunks: {e}")))?;
        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn load_vectors(&self) -> Result<Vec<StoredVector>> {
        let rows = sqlx::query(
            "SELECT id, embedding, embedding_model FROM chunks WHERE embedding IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("load vectors: {e}")))?;

        rows.iter()
            .map(|row| {
                let blob: Vec<u8> = get(row, "embedding")?;
                let model: Option<String> = get(row, "embedding_model")?;
                Ok(StoredVector {
                    chunk_id: get(row, "id")?,
                    vector: Self::blob_to_embedding(&blob),
                    model: model.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn replace_vectors(&self, vectors: &[VectorEntry], model: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query("UPDATE chunks SET embedding = NULL, embedding_model = NULL")
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Storage(format!("clear vectors: {e}")))?;

        for v in vectors {
            sqlx::query("UPDATE chunks SET embedding = ?1, embedding_model = ?2 WHERE id = ?3")
                .bind(Self::embedding_to_blob(&v.vector))
                .bind(model)
                .bind(&v.chunk_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Storage(format!("update vector: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Storage(format!("COMMIT failed: {e}")))?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM documents) AS documents,
                (SELECT COUNT(*) FROM chunks) AS chunks,
                (SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL) AS embedded
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("stats: {e}")))?;

        let documents: i64 = get(&row, "documents")?;
        let chunks: i64 = get(&row, "chunks")?;
        let embedded: i64 = get(&row, "embedded")?;
        Ok(StoreStats {
            documents: documents as usize,
            chunks: chunks as usize,
            embedded_chunks: embedded as usize,
        })
    }
}
