//! Native vector search backend over the sqlite-vec `vec0` virtual table.
//!
//! Issues a single ordered KNN query using the extension's distance operator
//! and applies scope filters in the same SQL statement. Because the KNN
//! constraint limits rows before the scope join, candidates are over-fetched
//! by a fixed factor.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;

use super::{QueryBackend, ScoredChunk};
use crate::core::errors::KnowledgeError;
use crate::sources::ScopeFilter;
use crate::store::{row_to_chunk, KnowledgeStore};

const KNN_OVERFETCH: usize = 4;

pub struct NativeVectorBackend {
    store: Arc<KnowledgeStore>,
}

impl NativeVectorBackend {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl QueryBackend for NativeVectorBackend {
    fn name(&self) -> &'static str {
        "native-vector"
    }

    async fn nearest(
        &self,
        query_vector: &[f32],
        filters: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, KnowledgeError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let encoded = serde_json::to_string(query_vector).map_err(KnowledgeError::internal)?;
        let knn_limit = (limit.saturating_mul(KNN_OVERFETCH)) as i64;

        let rows = sqlx::query(
            "SELECT v.chunk_id AS chunk_id, v.distance AS distance,
                    c.document_id, c.ordinal, c.content,
                    d.title, d.source_type, d.source_id, d.home_id, d.room_id,
                    d.floor_plan_id, d.floor_level
             FROM (SELECT chunk_id, distance
                   FROM vec_chunks
                   WHERE embedding MATCH vec_f32(?1) AND k = ?2
                   ORDER BY distance) v
             JOIN chunks c ON c.chunk_id = v.chunk_id
             JOIN documents d ON d.document_id = c.document_id
             WHERE (?3 IS NULL OR d.home_id = ?3)
               AND (?4 IS NULL OR d.room_id = ?4)
               AND (?5 IS NULL OR d.floor_level = ?5)
             ORDER BY v.distance
             LIMIT ?6",
        )
        .bind(&encoded)
        .bind(knn_limit)
        .bind(&filters.home_id)
        .bind(&filters.room_id)
        .bind(filters.floor_level)
        .bind(limit as i64)
        .fetch_all(self.store.pool())
        .await
        .map_err(KnowledgeError::internal)?;

        rows.iter()
            .map(|row| {
                let distance: f64 = row.get("distance");
                Ok(ScoredChunk {
                    chunk: row_to_chunk(row)?,
                    score: 1.0 - distance as f32,
                })
            })
            .collect()
    }
}
