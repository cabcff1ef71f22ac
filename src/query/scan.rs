//! In-process cosine scan backend.
//!
//! Loads every stored embedding for the active model, scores against the
//! query vector in the host process, sorts descending, and applies scope
//! filters as a post-filter. The default backend wherever the native vector
//! extension is not loaded.

use std::sync::Arc;

use async_trait::async_trait;

use super::{QueryBackend, ScoredChunk};
use crate::core::errors::KnowledgeError;
use crate::sources::ScopeFilter;
use crate::store::KnowledgeStore;

pub struct InMemoryScanBackend {
    store: Arc<KnowledgeStore>,
    model_id: String,
}

impl InMemoryScanBackend {
    pub fn new(store: Arc<KnowledgeStore>, model_id: impl Into<String>) -> Self {
        Self {
            store,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl QueryBackend for InMemoryScanBackend {
    fn name(&self) -> &'static str {
        "in-memory-scan"
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

        let rows = self.store.embedding_rows(&self.model_id).await?;

        let mut scored: Vec<ScoredChunk> = rows
            .into_iter()
            .map(|(chunk, vector)| ScoredChunk {
                score: cosine_similarity(query_vector, &vector),
                chunk,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(scored
            .into_iter()
            .filter(|item| {
                filters.matches(
                    item.chunk.home_id.as_deref(),
                    item.chunk.room_id.as_deref(),
                    item.chunk.floor_level,
                )
            })
            .take(limit)
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{sample_document, temp_store};

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_identity_and_orthogonality() {
        assert!(approx_eq(
            cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]),
            1.0
        ));
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
        assert!(approx_eq(cosine_similarity(&[], &[]), 0.0));
        assert!(approx_eq(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0));
    }

    #[tokio::test]
    async fn empty_corpus_returns_empty_list() {
        let store = Arc::new(temp_store().await);
        let backend = InMemoryScanBackend::new(store, "feature-hash-2");

        let hits = backend
            .nearest(&[1.0, 0.0], &ScopeFilter::default(), 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn ranks_by_similarity_and_post_filters_scope() {
        let store = Arc::new(temp_store().await);

        for (id, home, vector) in [
            ("s1", "h1", vec![1.0, 0.0]),
            ("s2", "h1", vec![0.7, 0.7]),
            ("s3", "h2", vec![0.99, 0.01]),
        ] {
            let document = sample_document(id, home, &format!("doc {id}"));
            store
                .upsert_document(
                    &document,
                    &[(format!("chunk {id}"), vector)],
                    "feature-hash-2",
                    2,
                )
                .await
                .unwrap();
        }

        let backend = InMemoryScanBackend::new(store.clone(), "feature-hash-2");

        let all = backend
            .nearest(&[1.0, 0.0], &ScopeFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].chunk.source_id, "s1");
        assert!(all[0].score >= all[1].score && all[1].score >= all[2].score);

        let scoped = backend
            .nearest(
                &[1.0, 0.0],
                &ScopeFilter {
                    home_id: Some("h1".to_string()),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|s| s.chunk.home_id.as_deref() == Some("h1")));

        let excluded = backend
            .nearest(
                &[1.0, 0.0],
                &ScopeFilter {
                    home_id: Some("h9".to_string()),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert!(excluded.is_empty());
    }
}
