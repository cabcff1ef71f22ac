//! SQLite-backed knowledge store.
//!
//! Persists the Document → Chunk → Embedding graph in SQLite via sqlx, with
//! embedding vectors as little-endian f32 BLOBs. Two optional capabilities
//! are probed once at open time:
//!
//! - FTS5: a `chunks_fts` virtual table backing lexical search. When the
//!   probe fails the keyword path reports unavailable and hybrid queries
//!   degrade to vector-only ranking.
//! - sqlite-vec: a `vec_chunks` virtual table backing native nearest-neighbor
//!   ordering, probed only when a loadable extension is configured.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::KnowledgeError;
use crate::sources::{ScopeFilter, SourceDetail, SourceType};

/// Document payload for one build-pass insertion.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub source_type: SourceType,
    pub source_id: String,
    pub home_id: Option<String>,
    pub room_id: Option<String>,
    pub floor_plan_id: Option<String>,
    pub floor_level: Option<i64>,
    pub title: String,
    pub body: String,
    pub detail: SourceDetail,
}

/// A stored chunk hydrated with its document's scope references.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: i64,
    pub content: String,
    pub title: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub home_id: Option<String>,
    pub room_id: Option<String>,
    pub floor_plan_id: Option<String>,
    pub floor_level: Option<i64>,
}

/// Store open options; the embedding dimension sizes the native vector table.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub vector_extension: Option<String>,
    pub embedding_dim: usize,
}

pub struct KnowledgeStore {
    pool: SqlitePool,
    fts_available: bool,
    vec_available: bool,
}

impl KnowledgeStore {
    pub async fn open(
        db_path: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self, KnowledgeError> {
        let mut connect = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        if let Some(extension) = &options.vector_extension {
            connect = connect.extension(extension.clone());
        }

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(connect)
            .await
            .map_err(KnowledgeError::internal)?;

        let mut store = Self {
            pool,
            fts_available: false,
            vec_available: false,
        };
        store.init_schema().await?;
        store.probe_fts().await;
        store.probe_vec(options.embedding_dim).await;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), KnowledgeError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                source_type TEXT NOT NULL,
                source_id   TEXT NOT NULL,
                home_id     TEXT,
                room_id     TEXT,
                floor_plan_id TEXT,
                floor_level INTEGER,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                detail      TEXT NOT NULL DEFAULT '{}',
                created_at  TEXT NOT NULL,
                UNIQUE (source_type, source_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id    TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                ordinal     INTEGER NOT NULL,
                content     TEXT NOT NULL,
                UNIQUE (document_id, ordinal)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embeddings (
                chunk_id TEXT NOT NULL REFERENCES chunks(chunk_id) ON DELETE CASCADE,
                model_id TEXT NOT NULL,
                dim      INTEGER NOT NULL,
                vector   BLOB NOT NULL,
                PRIMARY KEY (chunk_id, model_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_home ON documents(home_id)")
            .execute(&self.pool)
            .await
            .map_err(KnowledgeError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&self.pool)
            .await
            .map_err(KnowledgeError::internal)?;

        Ok(())
    }

    async fn probe_fts(&mut self) {
        let result = sqlx::query(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                content,
                chunk_id UNINDEXED,
                document_id UNINDEXED
            )",
        )
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.fts_available = true,
            Err(err) => {
                tracing::warn!("FTS5 unavailable, keyword search disabled: {}", err);
                self.fts_available = false;
            }
        }
    }

    async fn probe_vec(&mut self, embedding_dim: usize) {
        if embedding_dim == 0 {
            self.vec_available = false;
            return;
        }

        let version: Result<String, _> = sqlx::query_scalar("SELECT vec_version()")
            .fetch_one(&self.pool)
            .await;

        let version = match version {
            Ok(version) => version,
            Err(_) => {
                tracing::debug!("sqlite-vec not loaded, native vector search disabled");
                self.vec_available = false;
                return;
            }
        };

        let result = sqlx::query(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(
                embedding float[{embedding_dim}],
                +chunk_id TEXT
            )"
        ))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!("sqlite-vec {} active, using native vector search", version);
                self.vec_available = true;
            }
            Err(err) => {
                tracing::warn!("Failed to create vec_chunks table: {}", err);
                self.vec_available = false;
            }
        }
    }

    pub fn keyword_available(&self) -> bool {
        self.fts_available
    }

    pub fn native_vector_available(&self) -> bool {
        self.vec_available
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a document with its chunks and embeddings as one logical unit.
    ///
    /// An existing document for the same `(source_type, source_id)` is
    /// replaced in the same transaction, so repeated build passes converge
    /// instead of accumulating duplicates.
    pub async fn upsert_document(
        &self,
        document: &NewDocument,
        chunks: &[(String, Vec<f32>)],
        model_id: &str,
        dim: usize,
    ) -> Result<String, KnowledgeError> {
        for (_, vector) in chunks {
            if vector.len() != dim {
                return Err(KnowledgeError::Internal(format!(
                    "embedding length {} does not match declared dimension {dim}",
                    vector.len()
                )));
            }
        }

        let mut tx = self.pool.begin().await.map_err(KnowledgeError::internal)?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT document_id FROM documents WHERE source_type = ?1 AND source_id = ?2",
        )
        .bind(document.source_type.as_str())
        .bind(&document.source_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(KnowledgeError::internal)?;

        if let Some(old_id) = existing {
            if self.fts_available {
                sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?1")
                    .bind(&old_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(KnowledgeError::internal)?;
            }
            if self.vec_available {
                sqlx::query(
                    "DELETE FROM vec_chunks WHERE chunk_id IN
                     (SELECT chunk_id FROM chunks WHERE document_id = ?1)",
                )
                .bind(&old_id)
                .execute(&mut *tx)
                .await
                .map_err(KnowledgeError::internal)?;
            }
            sqlx::query("DELETE FROM documents WHERE document_id = ?1")
                .bind(&old_id)
                .execute(&mut *tx)
                .await
                .map_err(KnowledgeError::internal)?;
        }

        let document_id = uuid::Uuid::new_v4().to_string();
        let detail =
            serde_json::to_string(&document.detail).map_err(KnowledgeError::internal)?;
        let created_at = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO documents
             (document_id, source_type, source_id, home_id, room_id, floor_plan_id,
              floor_level, title, body, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&document_id)
        .bind(document.source_type.as_str())
        .bind(&document.source_id)
        .bind(&document.home_id)
        .bind(&document.room_id)
        .bind(&document.floor_plan_id)
        .bind(document.floor_level)
        .bind(&document.title)
        .bind(&document.body)
        .bind(&detail)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(KnowledgeError::internal)?;

        for (ordinal, (content, vector)) in chunks.iter().enumerate() {
            let chunk_id = uuid::Uuid::new_v4().to_string();

            sqlx::query(
                "INSERT INTO chunks (chunk_id, document_id, ordinal, content)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&chunk_id)
            .bind(&document_id)
            .bind(ordinal as i64)
            .bind(content)
            .execute(&mut *tx)
            .await
            .map_err(KnowledgeError::internal)?;

            sqlx::query(
                "INSERT INTO embeddings (chunk_id, model_id, dim, vector)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&chunk_id)
            .bind(model_id)
            .bind(dim as i64)
            .bind(serialize_embedding(vector))
            .execute(&mut *tx)
            .await
            .map_err(KnowledgeError::internal)?;

            if self.fts_available {
                sqlx::query(
                    "INSERT INTO chunks_fts (content, chunk_id, document_id)
                     VALUES (?1, ?2, ?3)",
                )
                .bind(content)
                .bind(&chunk_id)
                .bind(&document_id)
                .execute(&mut *tx)
                .await
                .map_err(KnowledgeError::internal)?;
            }

            if self.vec_available {
                let encoded =
                    serde_json::to_string(vector).map_err(KnowledgeError::internal)?;
                sqlx::query("INSERT INTO vec_chunks (embedding, chunk_id) VALUES (vec_f32(?1), ?2)")
                    .bind(&encoded)
                    .bind(&chunk_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(KnowledgeError::internal)?;
            }
        }

        tx.commit().await.map_err(KnowledgeError::internal)?;
        Ok(document_id)
    }

    /// All stored embeddings for one model, hydrated for the in-process scan.
    pub async fn embedding_rows(
        &self,
        model_id: &str,
    ) -> Result<Vec<(StoredChunk, Vec<f32>)>, KnowledgeError> {
        let rows = sqlx::query(
            "SELECT c.chunk_id, c.document_id, c.ordinal, c.content, e.vector,
                    d.title, d.source_type, d.source_id, d.home_id, d.room_id,
                    d.floor_plan_id, d.floor_level
             FROM embeddings e
             JOIN chunks c ON c.chunk_id = e.chunk_id
             JOIN documents d ON d.document_id = c.document_id
             WHERE e.model_id = ?1",
        )
        .bind(model_id)
        .fetch_all(&self.pool)
        .await
        .map_err(KnowledgeError::internal)?;

        rows.iter()
            .map(|row| {
                let vector_bytes: Vec<u8> = row.get("vector");
                Ok((row_to_chunk(row)?, deserialize_embedding(&vector_bytes)))
            })
            .collect()
    }

    /// Lexical relevance search over chunk text via FTS5 bm25 ranking.
    ///
    /// Returns an empty list when the keyword capability is unavailable or
    /// the query has no searchable tokens.
    pub async fn lexical_search(
        &self,
        query_text: &str,
        filters: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<(StoredChunk, f32)>, KnowledgeError> {
        if !self.fts_available || limit == 0 {
            return Ok(Vec::new());
        }
        let Some(match_expr) = fts_match_expression(query_text) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT chunks_fts.chunk_id AS chunk_id, bm25(chunks_fts) AS rank,
                    c.document_id, c.ordinal, c.content,
                    d.title, d.source_type, d.source_id, d.home_id, d.room_id,
                    d.floor_plan_id, d.floor_level
             FROM chunks_fts
             JOIN chunks c ON c.chunk_id = chunks_fts.chunk_id
             JOIN documents d ON d.document_id = c.document_id
             WHERE chunks_fts MATCH ?1
               AND (?2 IS NULL OR d.home_id = ?2)
               AND (?3 IS NULL OR d.room_id = ?3)
               AND (?4 IS NULL OR d.floor_level = ?4)
             ORDER BY rank
             LIMIT ?5",
        )
        .bind(&match_expr)
        .bind(&filters.home_id)
        .bind(&filters.room_id)
        .bind(filters.floor_level)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(KnowledgeError::internal)?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                // bm25() is better when smaller; negate so relevance sorts
                // descending like similarity.
                Ok((row_to_chunk(row)?, -rank as f32))
            })
            .collect()
    }

    pub async fn count_documents(&self) -> Result<usize, KnowledgeError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(KnowledgeError::internal)?;
        Ok(count as usize)
    }

    pub async fn count_chunks(&self) -> Result<usize, KnowledgeError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(KnowledgeError::internal)?;
        Ok(count as usize)
    }
}

/// Serialize an embedding to little-endian f32 bytes.
pub(crate) fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize an embedding from little-endian f32 bytes.
pub(crate) fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Build an FTS5 MATCH expression from free text: each alphanumeric token
/// quoted, implicit AND between tokens. None when nothing is searchable.
fn fts_match_expression(query_text: &str) -> Option<String> {
    let tokens: Vec<String> = query_text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{}\"", token.to_lowercase()))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

pub(crate) fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<StoredChunk, KnowledgeError> {
    let source_type_raw: String = row.get("source_type");
    let source_type = SourceType::parse(&source_type_raw).ok_or_else(|| {
        KnowledgeError::Internal(format!("unknown source type in store: {source_type_raw}"))
    })?;

    Ok(StoredChunk {
        chunk_id: row.get("chunk_id"),
        document_id: row.get("document_id"),
        ordinal: row.get("ordinal"),
        content: row.get("content"),
        title: row.get("title"),
        source_type,
        source_id: row.get("source_id"),
        home_id: row.get("home_id"),
        room_id: row.get("room_id"),
        floor_plan_id: row.get("floor_plan_id"),
        floor_level: row.get("floor_level"),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn temp_store() -> KnowledgeStore {
        let path = std::env::temp_dir().join(format!(
            "renova-knowledge-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        KnowledgeStore::open(path, StoreOptions::default())
            .await
            .unwrap()
    }

    pub fn sample_document(source_id: &str, home_id: &str, title: &str) -> NewDocument {
        NewDocument {
            source_type: SourceType::StructuralRecord,
            source_id: source_id.to_string(),
            home_id: Some(home_id.to_string()),
            room_id: Some(format!("room-{source_id}")),
            floor_plan_id: Some("fp-1".to_string()),
            floor_level: Some(1),
            title: title.to_string(),
            body: title.to_string(),
            detail: SourceDetail::StructuralRecord {
                room_type: "kitchen".to_string(),
                area_sqm: 12.0,
                window_count: 1,
                door_count: 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{sample_document, temp_store};
    use super::*;

    #[tokio::test]
    async fn upsert_replaces_documents_for_the_same_source() {
        let store = temp_store().await;
        let document = sample_document("s1", "h1", "Kitchen on floor 1");
        let chunks = vec![("kitchen with hardwood floors".to_string(), vec![1.0, 0.0])];

        store
            .upsert_document(&document, &chunks, "feature-hash-2", 2)
            .await
            .unwrap();
        store
            .upsert_document(&document, &chunks, "feature-hash-2", 2)
            .await
            .unwrap();

        assert_eq!(store.count_documents().await.unwrap(), 1);
        assert_eq!(store.count_chunks().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn embedding_rows_round_trip_vectors() {
        let store = temp_store().await;
        let document = sample_document("s1", "h1", "Bathroom");
        let chunks = vec![
            ("double vanity".to_string(), vec![0.5, -1.5, 2.0]),
            ("walk-in shower".to_string(), vec![1.0, 0.0, 0.0]),
        ];

        store
            .upsert_document(&document, &chunks, "feature-hash-3", 3)
            .await
            .unwrap();

        let mut rows = store.embedding_rows("feature-hash-3").await.unwrap();
        rows.sort_by_key(|(chunk, _)| chunk.ordinal);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, vec![0.5, -1.5, 2.0]);
        assert_eq!(rows[0].0.content, "double vanity");
        assert_eq!(rows[0].0.home_id.as_deref(), Some("h1"));

        assert!(store.embedding_rows("other-model").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mismatched_dimension_is_rejected() {
        let store = temp_store().await;
        let document = sample_document("s1", "h1", "Kitchen");
        let chunks = vec![("text".to_string(), vec![1.0, 0.0])];

        let err = store
            .upsert_document(&document, &chunks, "feature-hash-3", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Internal(_)));
        assert_eq!(store.count_documents().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lexical_search_ranks_matching_chunks() {
        let store = temp_store().await;
        assert!(store.keyword_available());

        for (id, text) in [
            ("s1", "kitchen flooring: hardwood, wide plank"),
            ("s2", "kitchen flooring: ceramic tile"),
            ("s3", "bathroom fixture: double vanity"),
        ] {
            let document = sample_document(id, "h1", text);
            store
                .upsert_document(
                    &document,
                    &[(text.to_string(), vec![0.0, 0.0])],
                    "feature-hash-2",
                    2,
                )
                .await
                .unwrap();
        }

        let hits = store
            .lexical_search("hardwood flooring", &ScopeFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].0.content.contains("hardwood"));

        let filtered = store
            .lexical_search(
                "flooring",
                &ScopeFilter {
                    home_id: Some("h2".to_string()),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn lexical_search_with_no_tokens_is_empty() {
        let store = temp_store().await;
        let hits = store
            .lexical_search("!!! ???", &ScopeFilter::default(), 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
