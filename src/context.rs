//! Context assembly for the conversational layer.
//!
//! Wraps the hybrid ranker: concatenates ranked chunk texts into a prompt
//! context, attaches best-effort media references for home-scoped requests,
//! and serves repeated calls from a TTL cache so a hit skips the whole query
//! pipeline, embedding included.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::config::CacheConfig;
use crate::core::errors::KnowledgeError;
use crate::query::{HybridRanker, QueryMatch};
use crate::sources::{MediaRegistry, ScopeFilter, SourceType};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextMetadata {
    pub chunk_count: usize,
    /// Distinct source types represented, in first-appearance order.
    pub source_types: Vec<SourceType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBundle {
    pub context_text: String,
    pub chunks: Vec<QueryMatch>,
    pub metadata: ContextMetadata,
    pub media_urls: Vec<String>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query_text: String,
    filters: ScopeFilter,
    k: usize,
    include_media: bool,
}

struct CacheEntry {
    bundle: ContextBundle,
    inserted_at: Instant,
}

/// Insertion-ordered TTL cache. Mutation is serialized behind a mutex; the
/// oldest-inserted entry is evicted once the capacity is exceeded.
struct ContextCache {
    ttl: Duration,
    capacity: usize,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<CacheKey>,
}

impl ContextCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // A poisoned cache is just a cache anomaly; recover and let lookups
        // miss rather than propagate a panic to the caller.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, key: &CacheKey) -> Option<ContextBundle> {
        let mut state = self.lock_state();

        let expired = match state.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            state.entries.remove(key);
            state.order.retain(|k| k != key);
            return None;
        }
        state.entries.get(key).map(|entry| entry.bundle.clone())
    }

    fn insert(&self, key: CacheKey, bundle: ContextBundle) {
        let mut state = self.lock_state();

        if state.entries.contains_key(&key) {
            state.order.retain(|k| k != &key);
        }
        state.order.push_back(key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                bundle,
                inserted_at: Instant::now(),
            },
        );

        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock_state().entries.len()
    }
}

pub struct ContextAssembler {
    ranker: Arc<HybridRanker>,
    media: Arc<dyn MediaRegistry>,
    cache: ContextCache,
    max_media: usize,
}

impl ContextAssembler {
    pub fn new(
        ranker: Arc<HybridRanker>,
        media: Arc<dyn MediaRegistry>,
        cache: &CacheConfig,
        max_media: usize,
    ) -> Self {
        Self {
            ranker,
            media,
            cache: ContextCache::new(Duration::from_secs(cache.ttl_secs), cache.capacity),
            max_media,
        }
    }

    /// Build (or serve from cache) the context bundle for a query. Always
    /// returns a structurally valid bundle; "no results" is an empty one.
    pub async fn assemble_context(
        &self,
        query_text: &str,
        filters: &ScopeFilter,
        k: usize,
        include_media: bool,
    ) -> Result<ContextBundle, KnowledgeError> {
        if k == 0 {
            return Err(KnowledgeError::BadRequest(
                "k must be at least 1".to_string(),
            ));
        }

        let key = CacheKey {
            query_text: query_text.to_string(),
            filters: filters.clone(),
            k,
            include_media,
        };

        if let Some(bundle) = self.cache.get(&key) {
            tracing::debug!("Context cache hit");
            return Ok(bundle);
        }

        let chunks = self.ranker.query(query_text, filters, k).await?;

        let context_text = chunks
            .iter()
            .map(|m| format!("[{}] {}", m.source_type, m.text))
            .collect::<Vec<_>>()
            .join("\n");

        let mut source_types: Vec<SourceType> = Vec::new();
        for m in &chunks {
            if !source_types.contains(&m.source_type) {
                source_types.push(m.source_type);
            }
        }

        let media_urls = if include_media {
            self.attach_media(filters).await
        } else {
            Vec::new()
        };

        let bundle = ContextBundle {
            context_text,
            metadata: ContextMetadata {
                chunk_count: chunks.len(),
                source_types,
            },
            chunks,
            media_urls,
        };

        self.cache.insert(key, bundle.clone());
        Ok(bundle)
    }

    /// Best-effort: a failure here only costs the media references.
    async fn attach_media(&self, filters: &ScopeFilter) -> Vec<String> {
        let Some(home_id) = &filters.home_id else {
            return Vec::new();
        };

        match self.media.media_for_home(home_id, self.max_media).await {
            Ok(media) => media.into_iter().map(|m| m.url).collect(),
            Err(err) => {
                tracing::warn!("Media lookup failed, omitting media: {}", err);
                Vec::new()
            }
        }
    }
}
