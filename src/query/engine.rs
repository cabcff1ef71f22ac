//! Hybrid query engine.
//!
//! Retrieves 3k candidates from the vector backend and, when the keyword
//! index is available, 3k lexical candidates over the same filters, then
//! fuses both lists with Reciprocal Rank Fusion. Native backend failures and
//! timeouts fall back to the in-process scan transparently.

use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::KnowledgeError;
use crate::embedding::EmbeddingService;
use crate::sources::ScopeFilter;
use crate::store::KnowledgeStore;

use super::fusion::{rrf_fuse, RRF_K0};
use super::{InMemoryScanBackend, NativeVectorBackend, QueryBackend, QueryMatch, ScoredChunk};

const CANDIDATE_FACTOR: usize = 3;

pub struct HybridRanker {
    embedder: Arc<EmbeddingService>,
    store: Arc<KnowledgeStore>,
    backend: Arc<dyn QueryBackend>,
    scan_fallback: Option<Arc<InMemoryScanBackend>>,
    query_timeout: Duration,
}

impl HybridRanker {
    /// Select the vector backend once, by capability probe: native sqlite-vec
    /// ordering when the store reports it, the in-process scan otherwise.
    pub fn new(
        embedder: Arc<EmbeddingService>,
        store: Arc<KnowledgeStore>,
        query_timeout: Duration,
    ) -> Self {
        let scan = Arc::new(InMemoryScanBackend::new(
            store.clone(),
            embedder.model_id(),
        ));

        if store.native_vector_available() {
            tracing::info!("Query backend: native vector search");
            Self {
                embedder,
                store: store.clone(),
                backend: Arc::new(NativeVectorBackend::new(store)),
                scan_fallback: Some(scan),
                query_timeout,
            }
        } else {
            tracing::info!("Query backend: in-process scan");
            Self {
                embedder,
                store,
                backend: scan,
                scan_fallback: None,
                query_timeout,
            }
        }
    }

    /// Explicit backend wiring, used by tests.
    pub fn with_backend(
        embedder: Arc<EmbeddingService>,
        store: Arc<KnowledgeStore>,
        backend: Arc<dyn QueryBackend>,
        scan_fallback: Option<Arc<InMemoryScanBackend>>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            backend,
            scan_fallback,
            query_timeout,
        }
    }

    /// Top-k hybrid matches for a query. Non-throwing for "no results":
    /// empty corpus, all-excluding filters, and blank queries yield an empty
    /// list. Fails fast only on malformed input.
    pub async fn query(
        &self,
        query_text: &str,
        filters: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<QueryMatch>, KnowledgeError> {
        if k == 0 {
            return Err(KnowledgeError::BadRequest(
                "k must be at least 1".to_string(),
            ));
        }
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query_text).await?;
        let candidate_limit = k.saturating_mul(CANDIDATE_FACTOR);

        let vector_list = self
            .nearest_with_fallback(&query_vector, filters, candidate_limit)
            .await?;

        let keyword_list: Vec<ScoredChunk> = match self
            .store
            .lexical_search(query_text, filters, candidate_limit)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .map(|(chunk, relevance)| ScoredChunk {
                    chunk,
                    score: relevance,
                })
                .collect(),
            Err(err) => {
                tracing::warn!("Keyword search failed, using vector-only ranking: {}", err);
                Vec::new()
            }
        };

        let ranked = if keyword_list.is_empty() {
            let mut vector_list = vector_list;
            vector_list.truncate(k);
            vector_list
        } else {
            let mut fused = rrf_fuse(&[vector_list, keyword_list], RRF_K0);
            fused.truncate(k);
            fused
        };

        Ok(ranked.into_iter().map(QueryMatch::from).collect())
    }

    async fn nearest_with_fallback(
        &self,
        query_vector: &[f32],
        filters: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, KnowledgeError> {
        let attempt = tokio::time::timeout(
            self.query_timeout,
            self.backend.nearest(query_vector, filters, limit),
        )
        .await;

        let error = match attempt {
            Ok(Ok(hits)) => return Ok(hits),
            Ok(Err(err)) => err,
            Err(_) => KnowledgeError::Internal(format!(
                "{} backend timed out after {:?}",
                self.backend.name(),
                self.query_timeout
            )),
        };

        match &self.scan_fallback {
            Some(scan) => {
                tracing::warn!(
                    "{} backend unavailable, falling back to scan: {}",
                    self.backend.name(),
                    error
                );
                scan.nearest(query_vector, filters, limit).await
            }
            None => Err(error),
        }
    }
}
