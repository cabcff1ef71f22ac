//! Embedding providers.
//!
//! `EmbeddingBackend` is the strategy interface; `EmbeddingService` walks an
//! ordered fallback chain (remote semantic provider, local server, terminal
//! hash backend) and absorbs per-backend failures and timeouts. The hash
//! backend cannot fail, so `embed` never surfaces a provider error for
//! non-empty chains ending in it.

mod hash;
mod http;

pub use hash::HashEmbeddingBackend;
pub use http::HttpEmbeddingBackend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::config::EmbeddingConfig;
use crate::core::errors::KnowledgeError;

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Identifier persisted with each embedding (model id).
    fn model_id(&self) -> &str;

    /// Dimensionality of vectors this backend produces.
    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError>;
}

/// Ordered fallback chain over interchangeable embedding backends.
///
/// The first configured backend determines the service's dimension and model
/// id for its whole lifetime; vectors produced by a further-down fallback are
/// conformed (truncated or zero-padded) to that dimension so stored vectors
/// stay comparable within one configured instance.
pub struct EmbeddingService {
    backends: Vec<Arc<dyn EmbeddingBackend>>,
    timeout: Duration,
    dim: usize,
    model_id: String,
}

impl EmbeddingService {
    pub fn new(backends: Vec<Arc<dyn EmbeddingBackend>>, timeout: Duration) -> Self {
        let first = backends
            .first()
            .expect("embedding chain must contain at least one backend");
        let dim = first.dim();
        let model_id = first.model_id().to_string();
        Self {
            backends,
            timeout,
            dim,
            model_id,
        }
    }

    /// Build the chain from configuration: primary remote provider, local
    /// provider, then the deterministic hash backend as the terminal link.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let mut backends: Vec<Arc<dyn EmbeddingBackend>> = Vec::new();
        if let Some(endpoint) = &config.primary {
            backends.push(Arc::new(HttpEmbeddingBackend::new(endpoint.clone())));
        }
        if let Some(endpoint) = &config.local {
            backends.push(Arc::new(HttpEmbeddingBackend::new(endpoint.clone())));
        }
        backends.push(Arc::new(HashEmbeddingBackend::new(config.hash_dim)));

        Self::new(backends, Duration::from_secs(config.timeout_secs))
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Embed one text. Blank input short-circuits to a zero vector without
    /// invoking any backend. Backend failures and timeouts advance the chain.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dim]);
        }

        let mut last_error = None;
        for backend in &self.backends {
            match tokio::time::timeout(self.timeout, backend.embed(text)).await {
                Ok(Ok(vector)) => return Ok(conform(vector, self.dim)),
                Ok(Err(err)) => {
                    tracing::warn!(
                        "Embedding backend {} failed, trying next: {}",
                        backend.model_id(),
                        err
                    );
                    last_error = Some(err);
                }
                Err(_) => {
                    tracing::warn!(
                        "Embedding backend {} timed out after {:?}, trying next",
                        backend.model_id(),
                        self.timeout
                    );
                    last_error = Some(KnowledgeError::Embedding(format!(
                        "{} timed out",
                        backend.model_id()
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            KnowledgeError::Embedding("embedding chain is empty".to_string())
        }))
    }
}

/// Truncate or zero-pad to the service dimension.
fn conform(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    if vector.len() != dim {
        vector.resize(dim, 0.0);
    }
    vector
}


#[cfg(test)]
mod tests {
    use super::test_support::CountingBackend;
    use super::*;

    #[tokio::test]
    async fn blank_input_returns_zero_vector_without_backend_calls() {
        let backend = Arc::new(CountingBackend::succeeding(8));
        let service = EmbeddingService::new(vec![backend.clone()], Duration::from_secs(1));

        for input in ["", "   ", "\n\t"] {
            let vector = service.embed(input).await.unwrap();
            assert_eq!(vector.len(), 8);
            assert!(vector.iter().all(|v| *v == 0.0));
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn failing_primary_advances_to_fallback() {
        let primary = Arc::new(CountingBackend::failing(8));
        let fallback = Arc::new(CountingBackend::succeeding(8));
        let service = EmbeddingService::new(
            vec![primary.clone(), fallback.clone()],
            Duration::from_secs(1),
        );

        let vector = service.embed("kitchen flooring").await.unwrap();
        assert_eq!(vector.len(), 8);
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn fallback_vector_is_conformed_to_service_dim() {
        let primary = Arc::new(CountingBackend::failing(16));
        let fallback = Arc::new(CountingBackend::succeeding(4));
        let service = EmbeddingService::new(vec![primary, fallback], Duration::from_secs(1));

        assert_eq!(service.dim(), 16);
        let vector = service.embed("hardwood").await.unwrap();
        assert_eq!(vector.len(), 16);
    }

    #[tokio::test]
    async fn exhausted_chain_surfaces_last_error() {
        let only = Arc::new(CountingBackend::failing(8));
        let service = EmbeddingService::new(vec![only], Duration::from_secs(1));

        let err = service.embed("anything").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::Embedding(_)));
    }

    #[tokio::test]
    async fn from_config_terminates_in_hash_backend() {
        let service = EmbeddingService::from_config(&EmbeddingConfig::default());
        assert_eq!(service.dim(), 256);

        let vector = service.embed("hardwood wide plank").await.unwrap();
        assert_eq!(vector.len(), 256);
        assert!(vector.iter().any(|v| *v != 0.0));
    }
}
