//! Partition locator: maps `(sensor, assets, range, tier)` to the
//! minimal set of partition paths that could contain matching rows.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use tokio::sync::RwLock;

use crate::backend::Registry;
use crate::error::Result;
use crate::model::{AssetId, SensorId, Tier, TimeRange};

/// One partition path, together with the `(sensor, asset)` it was located
/// for — the reader needs this because `sensor_id` isn't a column in
/// storage, it's injected from the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRef {
    pub path: String,
    pub sensor_id: SensorId,
    pub asset_id: AssetId,
}

const ASSET_LIST_TTL: Duration = Duration::from_secs(60);

/// Discovers and caches the asset list for a storage root, since requests
/// may omit `assets` (meaning "all assets").
pub struct AssetListCache {
    root: String,
    cached: RwLock<Option<(Instant, Vec<AssetId>)>>,
}

impl AssetListCache {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            cached: RwLock::new(None),
        }
    }

    pub async fn assets(&self, registry: &Registry) -> Result<Vec<AssetId>> {
        {
            let guard = self.cached.read().await;
            if let Some((fetched_at, assets)) = guard.as_ref() {
                if fetched_at.elapsed() < ASSET_LIST_TTL {
                    return Ok(assets.clone());
                }
            }
        }

        let listed = registry.list(&self.root).await?;
        let assets: BTreeSet<AssetId> = listed
            .iter()
            .filter_map(|path| {
                path.trim_start_matches(&self.root)
                    .trim_start_matches('/')
                    .split('/')
                    .next()
                    .filter(|s| !s.is_empty())
                    .map(AssetId::from)
            })
            .collect();
        let assets: Vec<AssetId> = assets.into_iter().collect();

        let mut guard = self.cached.write().await;
        *guard = Some((Instant::now(), assets.clone()));
        Ok(assets)
    }

    /// Invalidate the cached asset list` invalidates it).
    pub async fn invalidate(&self) {
        let mut guard = self.cached.write().await;
        *guard = None;
    }
}

/// Build the canonical partition path for one `(asset, sensor, tier, bucket)`.
fn partition_path(root: &str, asset: &AssetId, sensor: &SensorId, tier: Tier, bucket_start: DateTime<Utc>, ext: &str) -> String {
    match tier {
        Tier::Raw => format!(
            "{root}/{asset}/{:04}/{:02}/{:02}/{:02}/{sensor}.{ext}",
            bucket_start.year(),
            bucket_start.month(),
            bucket_start.day(),
            bucket_start.hour(),
        ),
        Tier::Minute => format!(
            "{root}/{asset}/{:04}/{:02}/{:02}/{sensor}.{ext}",
            bucket_start.year(),
            bucket_start.month(),
            bucket_start.day(),
        ),
        Tier::Hour => format!(
            "{root}/{asset}/{:04}/{:02}/{sensor}.{ext}",
            bucket_start.year(),
            bucket_start.month(),
        ),
    }
}

/// The tier's partition granularity, as a step to walk `range` in.
fn tier_step(tier: Tier) -> PartitionStep {
    match tier {
        Tier::Raw => PartitionStep::Hourly,
        Tier::Minute => PartitionStep::Daily,
        Tier::Hour => PartitionStep::Monthly,
    }
}

enum PartitionStep {
    Hourly,
    Daily,
    Monthly,
}

fn truncate_to_step(t: DateTime<Utc>, step: &PartitionStep) -> DateTime<Utc> {
    match step {
        PartitionStep::Hourly => Utc
            .with_ymd_and_hms(t.year(), t.month(), t.day(), t.hour(), 0, 0)
            .unwrap(),
        PartitionStep::Daily => Utc.with_ymd_and_hms(t.year(), t.month(), t.day(), 0, 0, 0).unwrap(),
        PartitionStep::Monthly => Utc.with_ymd_and_hms(t.year(), t.month(), 1, 0, 0, 0).unwrap(),
    }
}

fn next_step(t: DateTime<Utc>, step: &PartitionStep) -> DateTime<Utc> {
    match step {
        PartitionStep::Hourly => t + chrono::Duration::hours(1),
        PartitionStep::Daily => t + chrono::Duration::days(1),
        PartitionStep::Monthly => {
            let (year, month) = if t.month() == 12 { (t.year() + 1, 1) } else { (t.year(), t.month() + 1) };
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
        }
    }
}

/// Enumerate every partition-bucket boundary touching `range`, least to
/// greatest.
fn bucket_boundaries(range: TimeRange, tier: Tier) -> Vec<DateTime<Utc>> {
    let step = tier_step(tier);
    let mut boundaries = Vec::new();
    let mut cursor = truncate_to_step(range.start, &step);
    while cursor < range.end {
        boundaries.push(cursor);
        cursor = next_step(cursor, &step);
    }
    if boundaries.is_empty() {
        boundaries.push(truncate_to_step(range.start, &step));
    }
    boundaries
}

/// Locate the partition paths that could contain rows for `sensors` across
/// `assets` (or all discovered assets, if `None`) within `range` at `tier`.
pub async fn locate(
    root: &str,
    asset_cache: &AssetListCache,
    registry: &Registry,
    sensors: &BTreeSet<SensorId>,
    assets: Option<&BTreeSet<AssetId>>,
    range: TimeRange,
    tier: Tier,
    ext: &str,
) -> Result<Vec<PartitionRef>> {
    let resolved_assets: Vec<AssetId> = match assets {
        Some(set) => set.iter().cloned().collect(),
        None => asset_cache.assets(registry).await?,
    };

    let boundaries = bucket_boundaries(range, tier);
    let mut out = Vec::with_capacity(resolved_assets.len() * sensors.len() * boundaries.len());
    for asset in &resolved_assets {
        for sensor in sensors {
            for &bucket_start in &boundaries {
                out.push(PartitionRef {
                    path: partition_path(root, asset, sensor, tier, bucket_start, ext),
                    sensor_id: sensor.clone(),
                    asset_id: asset.clone(),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{test_support::MockBackend, Role};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn t(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn raw_tier_path_is_hourly() {
        let p = partition_path(
            "root",
            &AssetId::from("asset1"),
            &SensorId::from("quad_ch1"),
            Tier::Raw,
            t(2024, 1, 2, 3),
            "arrow",
        );
        assert_eq!(p, "root/asset1/2024/01/02/03/quad_ch1.arrow");
    }

    #[test]
    fn minute_tier_path_has_no_hour_segment() {
        let p = partition_path(
            "root",
            &AssetId::from("asset1"),
            &SensorId::from("quad_ch1"),
            Tier::Minute,
            t(2024, 1, 2, 3),
            "arrow",
        );
        assert_eq!(p, "root/asset1/2024/01/02/quad_ch1.arrow");
    }

    #[test]
    fn hour_tier_path_is_monthly() {
        let p = partition_path(
            "root",
            &AssetId::from("asset1"),
            &SensorId::from("quad_ch1"),
            Tier::Hour,
            t(2024, 1, 2, 3),
            "arrow",
        );
        assert_eq!(p, "root/asset1/2024/01/quad_ch1.arrow");
    }

    #[test]
    fn bucket_boundaries_cover_an_hour_spanning_range() {
        let range = TimeRange::new(t(2024, 1, 1, 0), t(2024, 1, 1, 3)).unwrap();
        let boundaries = bucket_boundaries(range, Tier::Raw);
        assert_eq!(boundaries, vec![t(2024, 1, 1, 0), t(2024, 1, 1, 1), t(2024, 1, 1, 2)]);
    }

    #[tokio::test]
    async fn asset_discovery_lists_root_once_and_caches() {
        let backend = Arc::new(
            MockBackend::new("primary")
                .with_file("root/asset1/2024/01/01/00/s1.arrow", bytes::Bytes::new())
                .with_file("root/asset2/2024/01/01/00/s1.arrow", bytes::Bytes::new()),
        );
        let registry = Registry::new(vec![(Role::Primary, backend)]);
        let cache = AssetListCache::new("root");

        let assets = cache.assets(&registry).await.unwrap();
        assert_eq!(assets, vec![AssetId::from("asset1"), AssetId::from("asset2")]);
    }

    #[tokio::test]
    async fn locate_builds_one_path_per_asset_sensor_bucket() {
        let backend = Arc::new(MockBackend::new("primary"));
        let registry = Registry::new(vec![(Role::Primary, backend)]);
        let cache = AssetListCache::new("root");

        let sensors = BTreeSet::from([SensorId::from("s1")]);
        let assets = BTreeSet::from([AssetId::from("a1")]);
        let range = TimeRange::new(t(2024, 1, 1, 0), t(2024, 1, 1, 2)).unwrap();

        let refs = locate(
            "root",
            &cache,
            &registry,
            &sensors,
            Some(&assets),
            range,
            Tier::Raw,
            "arrow",
        )
        .await
        .unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].path, "root/a1/2024/01/01/00/s1.arrow");
        assert_eq!(refs[1].path, "root/a1/2024/01/01/01/s1.arrow");
    }
}
