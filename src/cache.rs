//! Cache manager: bounded LRU + TTL + byte-budget + single-flight,
//! digest-keyed by `Fingerprint`.
//!
//! The LRU table is grounded in the `lru` crate, used for the same
//! entry-map role by several retrieval-pack repos (`cswinter-LocustDB`,
//! `maskdotdev-sombra`, `DataDog-datadog-agent`). Single-flight coalescing
//! follows the shared-map-plus-waiter pattern in the pack's
//! `vkalintiris-netdata` `IndexCache`.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{QueryError, Result};
use crate::model::{DataSet, Fingerprint, Metadata};

const OVERHEAD_BYTES: u64 = 256;
const BYTES_PER_ROW_ESTIMATE: u64 = 128;

#[derive(Clone)]
pub struct CacheEntry {
    pub payload: Arc<DataSet>,
    pub metadata: Metadata,
    pub size_bytes: u64,
    pub created_at: Instant,
    pub last_access: Instant,
    pub hit_count: u64,
}

fn estimate_size(rows: usize) -> u64 {
    OVERHEAD_BYTES + rows as u64 * BYTES_PER_ROW_ESTIMATE
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

struct Inner {
    entries: LruCache<Fingerprint, CacheEntry>,
    size_bytes: u64,
}

/// Pending single-flight computation: the first caller populates it, later
/// callers for the same fingerprint await its `Notify` and read the result.
struct Pending {
    notify: Arc<Notify>,
    result: Mutex<Option<std::result::Result<(Arc<DataSet>, Metadata), QueryError>>>,
}

pub struct Cache {
    inner: Mutex<Inner>,
    pending: Mutex<HashMap<Fingerprint, Arc<Pending>>>,
    size_limit_bytes: u64,
    ttl: Duration,
    enabled: bool,
    stats: CacheStats,
}

impl Cache {
    pub fn new(size_limit_bytes: u64, ttl: Duration, enabled: bool) -> Self {
        let entry_limit = ((size_limit_bytes as f64).sqrt() * 10.0).max(16.0) as usize;
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(NonZeroUsize::new(entry_limit).unwrap()),
                size_bytes: 0,
            }),
            pending: Mutex::new(HashMap::new()),
            size_limit_bytes,
            ttl,
            enabled,
            stats: CacheStats::default(),
        }
    }

    /// Look up `key`. Expired entries are evicted on access.
    pub fn get(&self, key: &Fingerprint) -> Option<(Arc<DataSet>, Metadata)> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock();
        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.created_at.elapsed() >= self.ttl,
            None => false,
        };
        if expired {
            if let Some(entry) = inner.entries.pop(key) {
                inner.size_bytes = inner.size_bytes.saturating_sub(entry.size_bytes);
            }
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = Instant::now();
                entry.hit_count += 1;
                let mut metadata = entry.metadata.clone();
                metadata.cache_hit = true;
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some((entry.payload.clone(), metadata))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert `payload` for `key`, evicting LRU entries until back within
    /// 90% of the byte budget.
    pub fn insert(&self, key: Fingerprint, payload: Arc<DataSet>, metadata: Metadata) {
        if !self.enabled {
            return;
        }
        let size = estimate_size(payload.rows.len());
        let mut inner = self.inner.lock();

        if let Some(old) = inner.entries.push(
            key,
            CacheEntry {
                payload,
                metadata,
                size_bytes: size,
                created_at: Instant::now(),
                last_access: Instant::now(),
                hit_count: 0,
            },
        ) {
            // `push` evicts the LRU entry itself if the map was at its soft
            // entry-count limit; account for whichever entry was displaced.
            inner.size_bytes = inner.size_bytes.saturating_sub(old.1.size_bytes);
        }
        inner.size_bytes += size;

        let target = (self.size_limit_bytes as f64 * 0.9) as u64;
        while inner.size_bytes > target {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.size_bytes = inner.size_bytes.saturating_sub(evicted.size_bytes);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Drop all entries atomically.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.size_bytes = 0;
    }

    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().size_bytes
    }

    pub fn entries(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn hits(&self) -> u64 {
        self.stats.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.stats.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.stats.evictions.load(Ordering::Relaxed)
    }

    /// Full read path for one fingerprint: cache hit short-circuits;
    /// otherwise single-flight the miss and publish the result on success
    /// (the cache is never populated on error).
    pub async fn get_or_compute<F, Fut>(&self, key: Fingerprint, compute: F) -> Result<(Arc<DataSet>, Metadata)>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(Arc<DataSet>, Metadata)>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let result = self.single_flight(key.clone(), compute).await?;
        self.insert(key, result.0.clone(), result.1.clone());
        Ok(result)
    }

    /// Run `compute` as the single owner of `key`'s in-flight computation.
    /// Concurrent callers for the same key await the first caller's result
    /// instead of recomputing.
    pub async fn single_flight<F, Fut>(&self, key: Fingerprint, compute: F) -> Result<(Arc<DataSet>, Metadata)>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(Arc<DataSet>, Metadata)>>,
    {
        let (pending, is_owner) = {
            let mut table = self.pending.lock();
            if let Some(existing) = table.get(&key) {
                (existing.clone(), false)
            } else {
                let slot = Arc::new(Pending {
                    notify: Arc::new(Notify::new()),
                    result: Mutex::new(None),
                });
                table.insert(key.clone(), slot.clone());
                (slot, true)
            }
        };

        if is_owner {
            let result = compute().await;
            *pending.result.lock() = Some(result.clone());
            self.pending.lock().remove(&key);
            pending.notify.notify_waiters();
            result
        } else {
            // Register interest in the notification *before* checking whether
            // the owner already finished: `notify_waiters()` wakes only
            // listeners that exist at the time it's called, so checking first
            // and creating the `Notified` future second would miss a
            // notification that lands in between (the owner finishes and
            // publishes the result right after our check but before we start
            // waiting). Tokio's `Notify` tracks a `notify_waiters()` call
            // count from the moment the future is created, so awaiting a
            // future created before the race window still observes it.
            let notified = pending.notify.notified();
            if let Some(result) = pending.result.lock().clone() {
                return result;
            }
            notified.await;
            pending
                .result
                .lock()
                .clone()
                .unwrap_or_else(|| Err(QueryError::read_failed("single-flight slot resolved without a result")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicU32;

    fn metadata() -> Metadata {
        Metadata {
            cache_hit: false,
            tier_used: Tier::Raw,
            bucket_width_used: Duration::from_secs(1),
            execution_time_ms: 1,
            truncated: false,
            actual_end: Utc.timestamp_opt(0, 0).unwrap(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn hit_then_miss_after_clear() {
        let cache = Cache::new(1024 * 1024, Duration::from_secs(3600), true);
        let key = Fingerprint("k1".to_string());
        cache.insert(key.clone(), Arc::new(DataSet::default()), metadata());

        assert!(cache.get(&key).unwrap().1.cache_hit);

        cache.clear();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = Cache::new(1024 * 1024, Duration::from_millis(1), true);
        let key = Fingerprint("k1".to_string());
        cache.insert(key.clone(), Arc::new(DataSet::default()), metadata());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn disabled_cache_is_a_no_op() {
        let cache = Cache::new(1024 * 1024, Duration::from_secs(3600), false);
        let key = Fingerprint("k1".to_string());
        cache.insert(key.clone(), Arc::new(DataSet::default()), metadata());
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn eviction_keeps_size_within_limit() {
        let cache = Cache::new(2048, Duration::from_secs(3600), true);
        for i in 0..50 {
            let key = Fingerprint(format!("k{i}"));
            let rows: Vec<crate::model::Row> = Vec::new();
            cache.insert(key, Arc::new(DataSet { rows }), metadata());
        }
        assert!(cache.size_bytes() <= (2048.0 * 1.25) as u64);
    }

    #[tokio::test]
    async fn single_flight_coalesces_concurrent_misses() {
        let cache = Arc::new(Cache::new(1024 * 1024, Duration::from_secs(3600), true));
        let call_count = Arc::new(AtomicU32::new(0));
        let key = Fingerprint("shared".to_string());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let call_count = call_count.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .single_flight(key, || async {
                        call_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok((Arc::new(DataSet::default()), metadata()))
                    })
                    .await
            }));
        }

        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_flight_propagates_error_to_all_waiters() {
        let cache = Arc::new(Cache::new(1024 * 1024, Duration::from_secs(3600), true));
        let key = Fingerprint("shared-err".to_string());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .single_flight(key, || async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err(QueryError::read_failed("boom"))
                    })
                    .await
            }));
        }

        for h in handles {
            let result = h.await.unwrap();
            assert!(result.is_err());
        }
    }
}
