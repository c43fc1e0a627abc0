//! Two-tier cache engine.
//!
//! Reads hit an in-memory map first and fall back to the persistent
//! store; writes go through to both. The engine is advisory by design:
//! every public method absorbs its own failures and returns a safe
//! default, so callers never need a recovery path for cache trouble.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::store::KeyValueStore;

use super::entry::{CacheEntry, CacheStats};

// ============================================================================
// Constants
// ============================================================================

/// Compiled-in schema version. Bump on any breaking change to the entry
/// format; every persisted entry is invalidated wholesale at startup when
/// the stored marker disagrees.
pub const CACHE_VERSION: u32 = 2;

/// Namespace prefix for entry keys in the store.
const ENTRY_PREFIX: &str = "cache:";

/// Persisted version marker key
const VERSION_KEY: &str = "cache_version";

/// Persisted stats blob key
const STATS_KEY: &str = "cache_stats";

/// Concurrent store operations during batch get/set.
/// Matches the fan-out the store primitive handles comfortably on
/// low-end devices without starving the UI thread pool.
const MAX_CONCURRENT_STORE_OPS: usize = 10;

fn entry_key(key: &str) -> String {
    format!("{}{}", ENTRY_PREFIX, key)
}

// ============================================================================
// Engine
// ============================================================================

/// Two-tier (memory + persistent) cache with TTL expiry.
///
/// Clone is cheap: all state is behind `Arc`, so handles can be passed
/// to background tasks freely. The memory tier is a disposable
/// accelerator; the store is the source of truth and the memory map can
/// always be rebuilt from it.
#[derive(Clone)]
pub struct CacheEngine {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    memory: Arc<RwLock<HashMap<String, CacheEntry<Value>>>>,
    stats: Arc<Mutex<CacheStats>>,
}

impl CacheEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            memory: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Run the startup sequence: version check, stats restore, cleanup.
    ///
    /// A version mismatch wipes the cache before anything else runs; this
    /// is the only migration strategy across app releases.
    pub async fn init(&self) {
        let stored_version = match self.store.get_string(VERSION_KEY).await {
            Ok(Some(raw)) => raw.parse::<u32>().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Could not read cache version marker");
                None
            }
        };

        if stored_version != Some(CACHE_VERSION) {
            info!(
                stored = ?stored_version,
                current = CACHE_VERSION,
                "Cache version changed, invalidating all entries"
            );
            self.clear_all().await;
        } else {
            self.restore_stats().await;
        }

        self.cleanup().await;
    }

    // =========================================================================
    // Single-key operations
    // =========================================================================

    /// Look up a value, memory tier first.
    ///
    /// Fresh entries count as hits and are promoted into memory. Expired
    /// entries count as misses but are still returned when
    /// stale-while-revalidate is on; deciding whether to refresh is the
    /// caller's business.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Utc::now();

        let memory_entry = self.memory.read().await.get(key).cloned();
        if let Some(entry) = memory_entry {
            if entry.is_fresh(now) {
                return self.finish_read(key, entry.data, true).await;
            }
            if self.config.stale_while_revalidate {
                return self.finish_read(key, entry.data, false).await;
            }
            self.record_miss().await;
            return None;
        }

        let entry = match self.read_entry(key).await {
            Some(entry) => entry,
            None => {
                self.record_miss().await;
                return None;
            }
        };

        if entry.is_fresh(now) {
            self.memory
                .write()
                .await
                .insert(key.to_string(), entry.clone());
            self.finish_read(key, entry.data, true).await
        } else if self.config.stale_while_revalidate {
            self.finish_read(key, entry.data, false).await
        } else {
            self.record_miss().await;
            None
        }
    }

    /// Write a value into both tiers. Returns false (and writes nothing)
    /// when serialization fails, the entry exceeds the size ceiling, or
    /// the store rejects the write.
    pub async fn set<T: Serialize>(&self, key: &str, data: &T, ttl: Option<Duration>) -> bool {
        let value = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Cache write failed to serialize");
                return false;
            }
        };

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let entry = CacheEntry::new(value, ttl, CACHE_VERSION);

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Cache entry failed to serialize");
                return false;
            }
        };

        if raw.len() > self.config.max_entry_bytes {
            warn!(
                key,
                bytes = raw.len(),
                ceiling = self.config.max_entry_bytes,
                "Cache entry exceeds size ceiling, not stored"
            );
            return false;
        }

        if let Err(e) = self.store.set_string(&entry_key(key), &raw).await {
            warn!(key, error = %e, "Cache write failed");
            return false;
        }

        self.memory.write().await.insert(key.to_string(), entry);

        {
            let mut stats = self.stats.lock().await;
            stats.total_entries += 1;
        }
        self.persist_stats().await;

        true
    }

    /// Drop a key from both tiers.
    pub async fn remove(&self, key: &str) -> bool {
        self.memory.write().await.remove(key);
        match self.store.delete(&entry_key(key)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    pub async fn has(&self, key: &str) -> bool {
        self.get::<Value>(key).await.is_some()
    }

    /// Serve the cached value immediately and refresh it in the
    /// background when the stored copy has gone stale.
    ///
    /// With nothing cached the call blocks on `fetcher`, stores the
    /// result, and returns it. Background fetch failures are logged and
    /// swallowed; the stale value stays serveable until cleanup.
    pub async fn get_with_revalidate<T, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Option<Duration>,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let now = Utc::now();

        // Staleness is judged on the stored entry, not the memory copy:
        // the memory tier may hold a promotion from before the expiry.
        if let Some(entry) = self.read_entry(key).await {
            if entry.is_fresh(now) {
                self.memory
                    .write()
                    .await
                    .insert(key.to_string(), entry.clone());
                return self.finish_read(key, entry.data, true).await;
            }

            if self.config.stale_while_revalidate {
                let engine = self.clone();
                let owned_key = key.to_string();
                let fetch = fetcher();
                tokio::spawn(async move {
                    match fetch.await {
                        Ok(data) => {
                            engine.set(&owned_key, &data, ttl).await;
                            debug!(key = %owned_key, "Background revalidation stored fresh data");
                        }
                        Err(e) => {
                            debug!(key = %owned_key, error = %e, "Background revalidation failed");
                        }
                    }
                });
                return self.finish_read(key, entry.data, false).await;
            }
            // Stale with revalidation disabled: nothing serveable, fall
            // through to a blocking fetch.
        }

        self.record_miss().await;
        match fetcher().await {
            Ok(data) => {
                self.set(key, &data, ttl).await;
                Some(data)
            }
            Err(e) => {
                warn!(key, error = %e, "Fetch failed with nothing cached");
                None
            }
        }
    }

    // =========================================================================
    // Batch operations
    // =========================================================================

    /// Fetch several keys concurrently. Keys that are missing, expired
    /// past policy, or unreadable are simply absent from the result.
    pub async fn get_many<T: DeserializeOwned>(&self, keys: &[&str]) -> HashMap<String, T> {
        let lookups = keys.iter().map(|key| {
            let engine = self.clone();
            let key = (*key).to_string();
            async move {
                let value = engine.get::<T>(&key).await;
                (key, value)
            }
        });

        stream::iter(lookups)
            .buffer_unordered(MAX_CONCURRENT_STORE_OPS)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect()
    }

    /// Write several entries concurrently; one key failing does not
    /// block the rest. Returns per-key success.
    pub async fn set_many<T: Serialize>(
        &self,
        entries: &[(String, T)],
        ttl: Option<Duration>,
    ) -> HashMap<String, bool> {
        let writes = entries.iter().map(|(key, data)| {
            let engine = self.clone();
            async move {
                let ok = engine.set(key, data, ttl).await;
                (key.clone(), ok)
            }
        });

        stream::iter(writes)
            .buffer_unordered(MAX_CONCURRENT_STORE_OPS)
            .collect::<HashMap<_, _>>()
            .await
    }

    // =========================================================================
    // Bulk invalidation and maintenance
    // =========================================================================

    /// Wipe every cache entry from both tiers, zero the stats, and
    /// re-write the version marker so the next startup does not treat
    /// the empty cache as outdated.
    pub async fn clear_all(&self) {
        match self.store.get_all_keys().await {
            Ok(keys) => {
                for key in keys.iter().filter(|k| k.starts_with(ENTRY_PREFIX)) {
                    if let Err(e) = self.store.delete(key).await {
                        warn!(key = %key, error = %e, "Failed to delete cache entry");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not enumerate store keys for clear"),
        }

        self.memory.write().await.clear();

        {
            let mut stats = self.stats.lock().await;
            *stats = CacheStats::default();
        }
        self.persist_stats().await;

        if let Err(e) = self
            .store
            .set_string(VERSION_KEY, &CACHE_VERSION.to_string())
            .await
        {
            warn!(error = %e, "Could not persist cache version marker");
        }
    }

    /// Remove every entry whose logical key starts with `prefix`,
    /// leaving unrelated keys untouched. Returns how many were removed.
    pub async fn clear_by_prefix(&self, prefix: &str) -> usize {
        let keys = match self.store.get_all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Could not enumerate store keys for prefix clear");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            let logical = match key.strip_prefix(ENTRY_PREFIX) {
                Some(logical) if logical.starts_with(prefix) => logical.to_string(),
                _ => continue,
            };
            if let Err(e) = self.store.delete(&key).await {
                warn!(key = %key, error = %e, "Failed to delete cache entry");
                continue;
            }
            self.memory.write().await.remove(&logical);
            removed += 1;
        }

        debug!(prefix, removed, "Prefix clear complete");
        removed
    }

    /// Startup scan: hard-delete entries that are expired past their
    /// grace period, plus anything that no longer deserializes.
    pub async fn cleanup(&self) {
        let keys = match self.store.get_all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Could not enumerate store keys for cleanup");
                return;
            }
        };

        let now = Utc::now();
        let mut removed = 0;

        for key in keys.iter().filter(|k| k.starts_with(ENTRY_PREFIX)) {
            let raw = match self.store.get_string(key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping unreadable entry during cleanup");
                    continue;
                }
            };

            let expired = match serde_json::from_str::<CacheEntry<Value>>(&raw) {
                Ok(entry) => entry.is_past_grace(now),
                // Corrupt entries can never be served again
                Err(_) => true,
            };

            if expired {
                if self.store.delete(key).await.is_ok() {
                    removed += 1;
                }
            }
        }

        {
            let mut stats = self.stats.lock().await;
            stats.last_cleanup_at = Some(now);
        }
        self.persist_stats().await;

        debug!(removed, "Cache cleanup complete");
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Read and parse the stored entry without touching stats.
    async fn read_entry(&self, key: &str) -> Option<CacheEntry<Value>> {
        let raw = match self.store.get_string(&entry_key(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(key, error = %e, "Cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(key, error = %e, "Cache entry corrupt, treating as miss");
                None
            }
        }
    }

    /// Decode the payload and record the hit or miss. A payload that no
    /// longer matches the requested type counts as a miss.
    async fn finish_read<T: DeserializeOwned>(
        &self,
        key: &str,
        data: Value,
        fresh: bool,
    ) -> Option<T> {
        match serde_json::from_value(data) {
            Ok(value) => {
                if fresh {
                    self.record_hit().await;
                } else {
                    self.record_miss().await;
                }
                Some(value)
            }
            Err(e) => {
                debug!(key, error = %e, "Cached payload does not match requested type");
                self.record_miss().await;
                None
            }
        }
    }

    async fn record_hit(&self) {
        {
            let mut stats = self.stats.lock().await;
            stats.hit_count += 1;
        }
        self.persist_stats().await;
    }

    async fn record_miss(&self) {
        {
            let mut stats = self.stats.lock().await;
            stats.miss_count += 1;
        }
        self.persist_stats().await;
    }

    async fn persist_stats(&self) {
        let raw = {
            let stats = self.stats.lock().await;
            match serde_json::to_string(&*stats) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(error = %e, "Could not serialize cache stats");
                    return;
                }
            }
        };
        if let Err(e) = self.store.set_string(STATS_KEY, &raw).await {
            debug!(error = %e, "Could not persist cache stats");
        }
    }

    async fn restore_stats(&self) {
        let raw = match self.store.get_string(STATS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "Could not read persisted cache stats");
                return;
            }
        };
        match serde_json::from_str::<CacheStats>(&raw) {
            Ok(persisted) => {
                let mut stats = self.stats.lock().await;
                *stats = persisted;
            }
            Err(e) => debug!(error = %e, "Persisted cache stats unreadable, starting fresh"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
