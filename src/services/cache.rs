use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::EstimateResult;
use crate::services::store::{CacheStore, StoreError, StoreInfo};

/// Namespace shared by text and image estimates
pub const KEY_NAMESPACE: &str = "carbon_footprint";

/// 7 days
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Stored form of an estimate: the result fields plus bookkeeping, flattened
/// into one JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub result: EstimateResult,
    pub cached_at: String,
    pub cache_key: String,
}

impl CacheEntry {
    fn new(result: &EstimateResult, cache_key: String) -> Self {
        let now = Utc::now();
        Self {
            result: result.clone(),
            cached_at: format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros()),
            cache_key,
        }
    }
}

/// Snapshot returned by [`ResultCache::stats`]. Serializes either as the
/// store numbers or as `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CacheStats {
    Available(StoreInfo),
    Unavailable { error: String },
}

/// Lower-cases and trims a dish name.
pub fn normalize_dish_name(dish_name: &str) -> String {
    dish_name.to_lowercase().trim().to_string()
}

/// `carbon_footprint:<md5 of normalized name>:<normalized name>`
pub fn cache_key(dish_name: &str) -> String {
    let normalized = normalize_dish_name(dish_name);
    let digest = hex::encode(md5::compute(normalized.as_bytes()).0);
    format!("{}:{}:{}", KEY_NAMESPACE, digest, normalized)
}

/// Best-effort memoization of estimates keyed by normalized dish name.
///
/// Store failures never reach the caller: reads degrade to a miss and
/// writes to `false`, so an unreachable store only costs extra LLM calls.
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, dish_name: &str) -> Option<EstimateResult> {
        let key = cache_key(dish_name);

        match self.lookup(&key).await {
            Ok(Some(entry)) => {
                log::debug!("🎯 Cache hit: {} (cached at {})", key, entry.cached_at);
                Some(entry.result)
            }
            Ok(None) => {
                log::debug!("🕳️ Cache miss: {}", key);
                None
            }
            Err(e) => {
                log::warn!("⚠️ Cache get failed for {}, treating as miss: {}", key, e);
                None
            }
        }
    }

    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Malformed(e.to_string())),
            None => Ok(None),
        }
    }

    /// Overwrites any existing entry for the dish; last write wins.
    pub async fn put(&self, dish_name: &str, result: &EstimateResult) -> bool {
        let key = cache_key(dish_name);
        let entry = CacheEntry::new(result, key.clone());

        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("⚠️ Could not serialize cache entry for {}: {}", key, e);
                return false;
            }
        };

        match self.store.set_ex(&key, &payload, self.ttl).await {
            Ok(()) => {
                log::debug!("💾 Cached {} ({} bytes, ttl {:?})", key, payload.len(), self.ttl);
                true
            }
            Err(e) => {
                log::warn!("⚠️ Cache put failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Deleting a key that isn't there still counts as success.
    pub async fn invalidate(&self, dish_name: &str) -> bool {
        let key = cache_key(dish_name);

        match self.store.delete(&key).await {
            Ok(removed) => {
                log::info!("🗑️ Invalidated {} (existed: {})", key, removed);
                true
            }
            Err(e) => {
                log::warn!("⚠️ Cache invalidation failed for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        match self.store.info().await {
            Ok(info) => CacheStats::Available(info),
            Err(e) => {
                log::warn!("⚠️ Cache stats unavailable: {}", e);
                CacheStats::Unavailable {
                    error: e.to_string(),
                }
            }
        }
    }
}
