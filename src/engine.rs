//! Query engine: orchestrates plan → cache → read → aggregate →
//! truncate → answer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::aggregate::aggregate;
use crate::backend::{HealthStatus, Registry};
use crate::cache::Cache;
use crate::columnar::read_partitions;
use crate::config::EngineConfig;
use crate::error::{QueryError, Result};
use crate::model::{Aggregation, DataSet, Fingerprint, Metadata, Plan, Query, Tier};
use crate::partition::{locate, AssetListCache};
use crate::planner::plan_bucket_width;
use crate::stats::{EngineStats, Stats};
use crate::tier::select_tier;

/// Overall health snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Health {
    pub ok: bool,
    pub backend_statuses: Vec<(String, HealthStatusView)>,
    pub cache_ok: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatusView {
    pub ok: bool,
    pub issues: Vec<String>,
}

impl From<HealthStatus> for HealthStatusView {
    fn from(h: HealthStatus) -> Self {
        Self { ok: h.ok, issues: h.issues }
    }
}

/// Injected handle owning the cache and backend registry, lifetime = service
/// lifetime.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<Registry>,
    asset_cache: AssetListCache,
    cache: Arc<Cache>,
    admission: Arc<Semaphore>,
    stats: Arc<EngineStats>,
}

impl Engine {
    pub fn new(config: EngineConfig, registry: Registry) -> Self {
        let cache = Arc::new(Cache::new(
            config.cache.size_bytes,
            Duration::from_secs(config.cache.ttl_seconds),
            config.cache.enabled,
        ));
        let asset_cache = AssetListCache::new(config.storage_root.clone());
        let admission = Arc::new(Semaphore::new(config.max_concurrent_queries));
        Self {
            config,
            registry: Arc::new(registry),
            asset_cache,
            cache,
            admission,
            stats: Arc::new(EngineStats::new()),
        }
    }

    /// Validate a Query against the request/error-contract invariants.
    /// `max_points == 0` is rejected outright rather than silently filled in
    /// from `default_max_points` — callers that want the configured default
    /// must read `EngineConfig::default_max_points` themselves before
    /// constructing the `Query`.
    fn validate(&self, query: Query) -> Result<Query> {
        if query.range.start >= query.range.end {
            return Err(QueryError::invalid_time_range("range.start must be strictly before range.end"));
        }
        if query.range.duration() > self.config.max_query_duration() {
            return Err(QueryError::invalid_time_range("range.duration exceeds max_query_duration"));
        }
        if query.sensors.is_empty() {
            return Err(QueryError::invalid_parameter("sensors must be non-empty", "sensors"));
        }
        if query.max_points == 0 {
            return Err(QueryError::invalid_parameter("max_points must be greater than zero", "max_points"));
        }
        if query.max_points > self.config.absolute_max_points {
            return Err(QueryError::invalid_parameter(
                format!("max_points exceeds absolute_max_points ({})", self.config.absolute_max_points),
                "max_points",
            ));
        }
        if let Some(interval) = query.interval {
            if interval < Duration::from_secs(1) {
                return Err(QueryError::invalid_parameter("interval must be at least 1 second", "interval"));
            }
        }
        Ok(query)
    }

    fn derive_plan(&self, query: &Query) -> Plan {
        let duration = query.range.duration();
        let sensor_count = query.sensors.len() as u64;

        let requested_width = match query.interval {
            Some(interval) => crate::planner::snap_up(interval),
            None => plan_bucket_width(duration, sensor_count, query.max_points),
        };

        let selection = select_tier(query.aggregation, query.want_raw, requested_width, duration, &self.config.tier);

        let expected_points = if selection.tier == Tier::Raw || query.aggregation == Aggregation::Raw {
            (duration.as_secs_f64().ceil() as u64) * sensor_count
        } else {
            let buckets = (duration.as_secs_f64() / selection.bucket_width.as_secs_f64()).ceil() as u64;
            buckets * sensor_count
        };

        Plan {
            tier: selection.tier,
            bucket_width: selection.bucket_width,
            effective_range: query.range,
            sensors: query.sensors.clone(),
            assets: query.assets.clone(),
            aggregation: query.aggregation,
            expected_points,
            resolution_promoted: selection.promoted,
        }
    }

    /// Entry point: `execute(Query, Deadline) → (DataSet, Metadata) | Error`.
    pub async fn execute(&self, query: Query, deadline: Duration) -> Result<(Arc<DataSet>, Metadata)> {
        let started = Instant::now();
        let query = self.validate(query)?;

        let _permit = tokio::time::timeout(deadline, self.admission.acquire())
            .await
            .map_err(|_| QueryError::capacity_exceeded("admission wait exceeded deadline"))?
            .map_err(|_| QueryError::capacity_exceeded("admission semaphore closed"))?;

        let remaining = deadline.saturating_sub(started.elapsed());
        let mut plan = self.derive_plan(&query);
        let tier_used = plan.tier;

        let result = tokio::time::timeout(remaining, self.run_plan(&mut plan, query.max_points)).await;

        let (dataset, mut metadata) = match result {
            Ok(inner) => inner?,
            Err(_elapsed) => return Err(QueryError::deadline_exceeded("query deadline exceeded")),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        metadata.execution_time_ms = elapsed_ms;
        self.stats.record_query(tier_used, metadata.cache_hit, elapsed_ms);
        Ok((dataset, metadata))
    }

    async fn run_plan(&self, plan: &mut Plan, max_points: u64) -> Result<(Arc<DataSet>, Metadata)> {
        // Raw-tier pre-enforcement: shrink the range before
        // reading anything if the naive raw cardinality would blow the budget.
        let mut truncated = false;
        if plan.aggregation == Aggregation::Raw {
            let sensor_count = plan.sensors.len() as u64;
            let duration_secs = plan.effective_range.duration().as_secs();
            let expected = duration_secs * sensor_count;
            if expected > max_points {
                let allowed_secs = max_points / sensor_count.max(1);
                let new_end = plan.effective_range.start + chrono::Duration::seconds(allowed_secs as i64);
                plan.effective_range = plan.effective_range.with_end(new_end);
                truncated = true;
            }
        }

        let fingerprint = Fingerprint::compute(plan);
        let plan_snapshot = plan.clone();
        let registry = self.registry.clone();
        let asset_cache_root = self.config.storage_root.clone();
        let ext = self.config.partition_extension.clone();
        let parallelism = self.config.partition_read_parallelism;
        let per_partition_deadline = self.config.per_partition_deadline();
        let max_points_for_compute = max_points;

        // `locate`/`read_partitions` need a live reference to the shared
        // asset-list cache, which single_flight's 'static closure can't
        // borrow across an await on `self` — clone the pieces it needs.
        let asset_cache = &self.asset_cache;

        self.cache
            .get_or_compute(fingerprint, move || async move {
                let columns = projected_columns(plan_snapshot.aggregation);
                let partitions = locate(
                    &asset_cache_root,
                    asset_cache,
                    &registry,
                    &plan_snapshot.sensors,
                    plan_snapshot.assets.as_ref(),
                    plan_snapshot.effective_range,
                    plan_snapshot.tier,
                    &ext,
                )
                .await?;

                let outcome = read_partitions(
                    registry,
                    partitions,
                    plan_snapshot.effective_range,
                    columns,
                    parallelism,
                    per_partition_deadline,
                )
                .await?;

                let mut rows = if plan_snapshot.aggregation == Aggregation::Raw {
                    outcome.rows
                } else {
                    aggregate(
                        &outcome.rows,
                        plan_snapshot.effective_range.start,
                        plan_snapshot.bucket_width,
                        plan_snapshot.aggregation,
                    )
                };

                let mut truncated_here = truncated;
                let mut actual_end = plan_snapshot.effective_range.end;
                if rows.len() as u64 > max_points_for_compute {
                    rows.truncate(max_points_for_compute as usize);
                    truncated_here = true;
                    actual_end = rows.last().map(|r| r.timestamp).unwrap_or(actual_end);
                }

                let metadata = Metadata {
                    cache_hit: false,
                    tier_used: plan_snapshot.tier,
                    bucket_width_used: plan_snapshot.bucket_width,
                    // Overwritten by `execute()` with the measured wall-clock
                    // latency of this call once it returns.
                    execution_time_ms: 0,
                    truncated: truncated_here,
                    actual_end,
                    warnings: outcome.warnings,
                };

                Ok((Arc::new(DataSet { rows }), metadata))
            })
            .await
    }

    /// Drop all cache entries, including the asset-list cache.
    pub async fn clear_cache(&self) {
        self.cache.clear();
        self.asset_cache.invalidate().await;
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot(self.cache.size_bytes(), self.cache.entries())
    }

    pub async fn health(&self) -> Health {
        let backend_statuses: Vec<(String, HealthStatusView)> =
            self.registry.health().await.into_iter().map(|(name, status)| (name, status.into())).collect();
        let ok = backend_statuses.iter().all(|(_, s)| s.ok);
        Health { ok, backend_statuses, cache_ok: true }
    }
}

/// The engine doesn't carry an explicit measurement-column allowlist on
/// `Query`, so projection is just `timestamp` plus "every
/// measurement column this partition has" — the reader treats an empty
/// non-timestamp projection list as a wildcard.
fn projected_columns(_aggregation: Aggregation) -> Vec<String> {
    vec!["timestamp".to_string()]
}
