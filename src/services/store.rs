//! Key-value backends for the result cache.
//!
//! Every operation returns an explicit [`StoreResult`]; deciding what a
//! failure means (miss, no-op) is left to [`crate::services::ResultCache`].

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection, protocol or timeout failure
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be decoded
    #[error("malformed cache entry: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Server-side numbers reported by `stats()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub total_keys: i64,
    pub used_memory: String,
    pub connected_clients: i64,
    pub redis_version: String,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value`, replacing whatever is stored under `key`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Returns whether a key was actually removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn info(&self) -> StoreResult<StoreInfo>;
}

/// Redis-backed store.
///
/// The connection is opened on first use and shared afterwards. A failed
/// attempt leaves the cell empty so the next operation tries again.
pub struct RedisStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl RedisStore {
    /// Validates the URL only; no connection is made here.
    pub fn new(
        redis_url: &str,
        connect_timeout: Duration,
        operation_timeout: Duration,
    ) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            conn: OnceCell::new(),
            connect_timeout,
            operation_timeout,
        })
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                log::info!("🔌 Connecting to Redis at {}", self.client.get_connection_info().addr);
                match tokio::time::timeout(
                    self.connect_timeout,
                    ConnectionManager::new(self.client.clone()),
                )
                .await
                {
                    Ok(Ok(conn)) => {
                        log::info!("✅ Redis connection established");
                        Ok(conn)
                    }
                    Ok(Err(e)) => Err(StoreError::Unavailable(format!(
                        "Redis connection error: {}",
                        e
                    ))),
                    Err(_) => Err(StoreError::Unavailable(format!(
                        "Redis connection timed out after {:?}",
                        self.connect_timeout
                    ))),
                }
            })
            .await?;

        Ok(conn.clone())
    }

    async fn run<T, F>(&self, command: &str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(format!(
                "Redis {} error: {}",
                command, e
            ))),
            Err(_) => Err(StoreError::Unavailable(format!(
                "Redis {} timed out after {:?}",
                command, self.operation_timeout
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        self.run("GET", conn.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection().await?;

        // SETEX only takes whole seconds; short test TTLs go through PSETEX
        if ttl.subsec_nanos() == 0 {
            self.run("SETEX", conn.set_ex(key, value, ttl.as_secs())).await
        } else {
            self.run("PSETEX", conn.pset_ex(key, value, pset_millis(ttl)))
                .await
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = self.run("DEL", conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        let mut conn = self.connection().await?;

        let info: redis::InfoDict = self
            .run("INFO", redis::cmd("INFO").query_async(&mut conn))
            .await?;
        let total_keys: i64 = self
            .run("DBSIZE", redis::cmd("DBSIZE").query_async(&mut conn))
            .await?;

        Ok(StoreInfo {
            total_keys,
            used_memory: info
                .get("used_memory_human")
                .unwrap_or_else(|| "Unknown".to_string()),
            connected_clients: info.get("connected_clients").unwrap_or(0),
            redis_version: info
                .get("redis_version")
                .unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}

/// PSETEX rejects 0, so anything under a millisecond is rounded up.
fn pset_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process store with per-entry expiry.
///
/// Used by the test suite and by `CACHE_BACKEND=memory` for running the API
/// without a Redis server. Nothing is shared between processes.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Unavailable(format!("ttl {:?} is out of range", ttl)))?;

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .map(|entry| entry.expires_at > Instant::now())
            .unwrap_or(false))
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let live: Vec<&MemoryEntry> = entries.values().filter(|e| e.expires_at > now).collect();
        let bytes: usize = live.iter().map(|e| e.value.len()).sum();

        Ok(StoreInfo {
            total_keys: live.len() as i64,
            used_memory: format!("{}B", bytes),
            connected_clients: 0,
            redis_version: "in-memory".to_string(),
        })
    }
}
