//! Process-wide counters backing `Engine::stats()`/`health()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::model::Tier;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TierCounts {
    pub raw: u64,
    pub minute: u64,
    pub hour: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub query_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    pub avg_execution_ms: f64,
    pub tier_counts: TierCounts,
    pub cache_size_bytes: u64,
    pub cache_entries: usize,
    pub uptime_seconds: u64,
}

pub struct EngineStats {
    started_at: Instant,
    query_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_execution_ms: AtomicU64,
    tier_counts: Mutex<TierCounts>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            query_count: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            total_execution_ms: AtomicU64::new(0),
            tier_counts: Mutex::new(TierCounts::default()),
        }
    }

    pub fn record_query(&self, tier: Tier, cache_hit: bool, execution_ms: u64) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.total_execution_ms.fetch_add(execution_ms, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
        let mut counts = self.tier_counts.lock();
        match tier {
            Tier::Raw => counts.raw += 1,
            Tier::Minute => counts.minute += 1,
            Tier::Hour => counts.hour += 1,
        }
    }

    pub fn snapshot(&self, cache_size_bytes: u64, cache_entries: usize) -> Stats {
        let query_count = self.query_count.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let total_ms = self.total_execution_ms.load(Ordering::Relaxed);

        let hit_rate = if cache_hits + cache_misses == 0 {
            0.0
        } else {
            cache_hits as f64 / (cache_hits + cache_misses) as f64
        };
        let avg_execution_ms = if query_count == 0 { 0.0 } else { total_ms as f64 / query_count as f64 };

        Stats {
            query_count,
            cache_hits,
            cache_misses,
            hit_rate,
            avg_execution_ms,
            tier_counts: self.tier_counts.lock().clone(),
            cache_size_bytes,
            cache_entries,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_zero_with_no_queries() {
        let stats = EngineStats::new();
        let snap = stats.snapshot(0, 0);
        assert_eq!(snap.hit_rate, 0.0);
        assert_eq!(snap.avg_execution_ms, 0.0);
    }

    #[test]
    fn hit_rate_and_tier_counts_accumulate() {
        let stats = EngineStats::new();
        stats.record_query(Tier::Raw, false, 10);
        stats.record_query(Tier::Raw, true, 2);
        stats.record_query(Tier::Hour, true, 4);

        let snap = stats.snapshot(1024, 3);
        assert_eq!(snap.query_count, 3);
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.cache_misses, 1);
        assert!((snap.hit_rate - (2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(snap.tier_counts.raw, 2);
        assert_eq!(snap.tier_counts.hour, 1);
    }
}
