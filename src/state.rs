//! Shared service state.
//!
//! Every component is constructed exactly once here and handed out by `Arc`;
//! call sites receive references instead of reaching for globals.

use std::sync::Arc;
use std::time::Duration;

use crate::context::ContextAssembler;
use crate::core::config::{AppPaths, KnowledgeConfig};
use crate::core::errors::KnowledgeError;
use crate::embedding::EmbeddingService;
use crate::indexer::IndexBuilder;
use crate::query::HybridRanker;
use crate::sources::{MediaRegistry, SourceRegistry};
use crate::store::{KnowledgeStore, StoreOptions};

pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: KnowledgeConfig,
    pub store: Arc<KnowledgeStore>,
    pub embedder: Arc<EmbeddingService>,
    pub builder: Arc<IndexBuilder>,
    pub ranker: Arc<HybridRanker>,
    pub assembler: Arc<ContextAssembler>,
}

impl AppState {
    /// Wire the engine: embedding chain, store (with capability probes),
    /// query backend selection, builder, and the cached context assembler.
    pub async fn initialize(
        paths: AppPaths,
        sources: Arc<dyn SourceRegistry>,
        media: Arc<dyn MediaRegistry>,
    ) -> Result<Arc<Self>, KnowledgeError> {
        let paths = Arc::new(paths);
        let config = KnowledgeConfig::load(&paths);

        let embedder = Arc::new(EmbeddingService::from_config(&config.embedding));

        let store = Arc::new(
            KnowledgeStore::open(
                &paths.db_path,
                StoreOptions {
                    vector_extension: config.vector_extension.clone(),
                    embedding_dim: embedder.dim(),
                },
            )
            .await?,
        );

        let builder = Arc::new(IndexBuilder::new(
            store.clone(),
            embedder.clone(),
            sources,
            config.chunk_max_chars,
        ));

        let ranker = Arc::new(HybridRanker::new(
            embedder.clone(),
            store.clone(),
            Duration::from_secs(config.query_timeout_secs),
        ));

        let assembler = Arc::new(ContextAssembler::new(
            ranker.clone(),
            media,
            &config.cache,
            config.max_media,
        ));

        Ok(Arc::new(Self {
            paths,
            config,
            store,
            embedder,
            builder,
            ranker,
            assembler,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{InMemoryMediaRegistry, InMemorySourceRegistry, ScopeFilter};

    #[tokio::test]
    async fn initialize_wires_a_working_engine() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted_at(dir.path());

        let state = AppState::initialize(
            paths,
            Arc::new(InMemorySourceRegistry::new()),
            Arc::new(InMemoryMediaRegistry::new()),
        )
        .await
        .unwrap();

        // Default config: hash chain, keyword index on, no native vectors.
        assert_eq!(state.embedder.dim(), 256);
        assert!(state.store.keyword_available());
        assert!(!state.store.native_vector_available());

        let matches = state
            .ranker
            .query("anything", &ScopeFilter::default(), 3)
            .await
            .unwrap();
        assert!(matches.is_empty());
    }
}
