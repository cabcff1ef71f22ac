//! Knowledge indexing and hybrid retrieval engine for the Renova
//! home-renovation assistant.
//!
//! Converts structured home records into searchable text chunks, embeds them
//! through a fallback chain of providers, and answers ranked queries by
//! fusing vector and keyword search, with a cached context assembler on top
//! for the conversational layer.

pub mod chunker;
pub mod context;
pub mod core;
pub mod embedding;
pub mod indexer;
pub mod query;
pub mod server;
pub mod sources;
pub mod state;
pub mod store;

pub use crate::core::config::{AppPaths, KnowledgeConfig};
pub use crate::core::errors::KnowledgeError;
pub use context::{ContextAssembler, ContextBundle, ContextMetadata};
pub use embedding::{EmbeddingBackend, EmbeddingService, HashEmbeddingBackend, HttpEmbeddingBackend};
pub use indexer::{BuildReport, CancelToken, IndexBuilder};
pub use query::{HybridRanker, QueryBackend, QueryMatch};
pub use sources::{MediaRegistry, ScopeFilter, SourceRegistry, SourceType};
pub use state::AppState;
pub use store::{KnowledgeStore, StoreOptions};
