//! Query backends and hybrid ranking.
//!
//! `QueryBackend` abstracts nearest-neighbor retrieval over the store; two
//! variants exist (native sqlite-vec ordering and an in-process cosine scan),
//! selected once by a capability probe at construction. `HybridRanker` fuses
//! the vector list with lexical search results via Reciprocal Rank Fusion.

mod engine;
mod fusion;
mod native;
mod scan;

pub use engine::HybridRanker;
pub use fusion::{rrf_fuse, RRF_K0};
pub use native::NativeVectorBackend;
pub use scan::InMemoryScanBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::KnowledgeError;
use crate::sources::{ScopeFilter, SourceType};
use crate::store::StoredChunk;

/// A retrieved chunk with its retrieval score (similarity, relevance, or a
/// fused rank score depending on the stage).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub score: f32,
}

/// Ranked nearest-neighbor retrieval over stored embeddings.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn nearest(
        &self,
        query_vector: &[f32],
        filters: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, KnowledgeError>;
}

/// One entry of a hybrid query result, shaped for the conversational layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub score: f32,
    pub chunk_id: String,
    pub text: String,
    pub document_id: String,
    pub title: String,
    pub source_type: SourceType,
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor_plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_id: Option<String>,
}

impl From<ScoredChunk> for QueryMatch {
    fn from(scored: ScoredChunk) -> Self {
        let chunk = scored.chunk;
        QueryMatch {
            score: scored.score,
            chunk_id: chunk.chunk_id,
            text: chunk.content,
            document_id: chunk.document_id,
            title: chunk.title,
            source_type: chunk.source_type,
            source_id: chunk.source_id,
            room_id: chunk.room_id,
            floor_plan_id: chunk.floor_plan_id,
            home_id: chunk.home_id,
        }
    }
}
