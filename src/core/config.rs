//! Paths and service configuration.
//!
//! `AppPaths` resolves where the knowledge database and logs live;
//! `KnowledgeConfig` is the tunable surface of the engine, loaded from an
//! optional `config.yml` next to the data directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        let log_dir = data_dir.join("logs");
        let db_path = data_dir.join("renova_knowledge.db");
        let config_path = data_dir.join("config.yml");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            db_path,
            config_path,
        }
    }

    /// Paths rooted at an explicit directory (used by tests).
    pub fn rooted_at(dir: &Path) -> Self {
        AppPaths {
            data_dir: dir.to_path_buf(),
            log_dir: dir.join("logs"),
            db_path: dir.join("renova_knowledge.db"),
            config_path: dir.join("config.yml"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("RENOVA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Renova").join("knowledge");
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("renova")
        .join("knowledge")
}

/// Endpoint of one OpenAI-compatible embedding server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingEndpoint {
    pub base_url: String,
    pub model: String,
    pub dim: usize,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Primary semantic provider (remote).
    #[serde(default)]
    pub primary: Option<EmbeddingEndpoint>,
    /// Secondary local provider (e.g. a llama.cpp server).
    #[serde(default)]
    pub local: Option<EmbeddingEndpoint>,
    /// Per-backend timeout before the chain advances.
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    /// Dimension of the terminal hash backend.
    #[serde(default = "default_hash_dim")]
    pub hash_dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            primary: None,
            local: None,
            timeout_secs: default_embed_timeout_secs(),
            hash_dim: default_hash_dim(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Upper bound on chunk size, in characters.
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Loadable sqlite-vec extension; native vector search is probed only
    /// when this is set.
    #[serde(default)]
    pub vector_extension: Option<String>,
    /// Timeout for a single native vector query before falling back to the
    /// in-process scan.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Media references attached to a context bundle, at most.
    #[serde(default = "default_max_media")]
    pub max_media: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            chunk_max_chars: default_chunk_max_chars(),
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig::default(),
            vector_extension: None,
            query_timeout_secs: default_query_timeout_secs(),
            max_media: default_max_media(),
        }
    }
}

impl KnowledgeConfig {
    /// Load from `config.yml` if present, defaults otherwise.
    pub fn load(paths: &AppPaths) -> Self {
        match fs::read_to_string(&paths.config_path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("Invalid config.yml, using defaults: {}", err);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

fn default_chunk_max_chars() -> usize {
    800
}

fn default_embed_timeout_secs() -> u64 {
    20
}

fn default_hash_dim() -> usize {
    256
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    100
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_max_media() -> usize {
    6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = KnowledgeConfig::default();
        assert_eq!(config.chunk_max_chars, 800);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.embedding.hash_dim, 256);
        assert!(config.vector_extension.is_none());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let raw = "chunk_max_chars: 300\ncache:\n  ttl_secs: 60\n";
        let config: KnowledgeConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.chunk_max_chars, 300);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.capacity, 100);
    }
}
