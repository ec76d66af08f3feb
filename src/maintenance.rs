//! Background maintenance task: periodic stats logging via a fire-and-forget
//! `tokio::spawn` + `tokio::time::interval` loop.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;

/// Spawn the maintenance loop as a background task. `interval` controls how
/// often a stats snapshot is logged; the asset-list cache expires on its own
/// TTL and needs no separate sweep.
pub fn spawn_maintenance(engine: Arc<Engine>, interval: Duration) {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "maintenance task: started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let stats = engine.stats();
            tracing::info!(
                query_count = stats.query_count,
                hit_rate = stats.hit_rate,
                cache_entries = stats.cache_entries,
                cache_size_bytes = stats.cache_size_bytes,
                avg_execution_ms = stats.avg_execution_ms,
                "maintenance: stats snapshot"
            );

            let health = engine.health().await;
            if !health.ok {
                tracing::warn!(backend_statuses = ?health.backend_statuses, "maintenance: backend health degraded");
            }
        }
    });
}
