//! Core data model: the request/response vocabulary shared by every
//! component. Types here are deliberately storage-agnostic — the columnar
//! reader and backends translate to/from them at the edges.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short, case-sensitive, opaque sensor name (e.g. `quad_ch1`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorId(pub String);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(s: &str) -> Self {
        SensorId(s.to_string())
    }
}

/// An opaque identifier grouping sensors (e.g. a physical asset / device id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        AssetId(s.to_string())
    }
}

/// A half-open time interval `[start, end)`. `start < end` is an invariant
/// enforced by `TimeRange::new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn duration(&self) -> Duration {
        (self.end - self.start)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn with_end(&self, end: DateTime<Utc>) -> Self {
        Self {
            start: self.start,
            end,
        }
    }
}

/// The fixed aggregation functions the core supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Min,
    Max,
    Mean,
    Last,
    Raw,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Mean => "mean",
            Aggregation::Last => "last",
            Aggregation::Raw => "raw",
        };
        f.write_str(s)
    }
}

/// A storage tier, cheapest (`Raw`) to coarsest (`Hour`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Raw,
    Minute,
    Hour,
}

impl Tier {
    /// Grain (bucket width) intrinsic to the tier's own storage granularity.
    pub fn grain(self) -> Duration {
        match self {
            Tier::Raw => Duration::from_secs(1),
            Tier::Minute => Duration::from_secs(60),
            Tier::Hour => Duration::from_secs(3600),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Raw => "raw",
            Tier::Minute => "minute",
            Tier::Hour => "hour",
        };
        f.write_str(s)
    }
}

/// A canonical request for sensor values over a time range.
#[derive(Debug, Clone)]
pub struct Query {
    pub sensors: BTreeSet<SensorId>,
    pub assets: Option<BTreeSet<AssetId>>,
    pub range: TimeRange,
    pub interval: Option<Duration>,
    pub max_points: u64,
    pub aggregation: Aggregation,
    /// Force reads from the RAW tier even when `aggregation` downsamples
    /// (`mean`/`min`/`max`/`last`), trading bandwidth for precision instead
    /// of letting the tier selector serve from pre-aggregated minute/hour
    /// partitions.
    pub want_raw: bool,
}

/// A derived execution plan.
#[derive(Debug, Clone)]
pub struct Plan {
    pub tier: Tier,
    pub bucket_width: Duration,
    pub effective_range: TimeRange,
    pub sensors: BTreeSet<SensorId>,
    pub assets: Option<BTreeSet<AssetId>>,
    pub aggregation: Aggregation,
    pub expected_points: u64,
    pub resolution_promoted: bool,
}

/// One value slot for a measurement column. `Null` preserves the distinction
/// between "column absent/empty in this bucket" and "value is zero".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measurement {
    Float(f64),
    Int(i64),
    Null,
}

impl Measurement {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Measurement::Float(v) => Some(*v),
            Measurement::Int(v) => Some(*v as f64),
            Measurement::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Measurement::Null)
    }
}

/// A single output row: one timestamp for one `(sensor, asset)` pair, with a
/// named set of measurement values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub timestamp: DateTime<Utc>,
    pub sensor_id: SensorId,
    pub asset_id: AssetId,
    pub measurements: std::collections::BTreeMap<String, Measurement>,
}

/// An ordered sequence of rows, sorted by `(sensor_id, asset_id, timestamp)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSet {
    pub rows: Vec<Row>,
}

impl DataSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// A deterministic digest over canonicalized plan fields. Two queries with identical fingerprints must return
/// identical payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Floor `ts_ns` (nanoseconds since epoch) down to the nearest multiple of
/// `bucket_width`. Uses Euclidean division so it also floors correctly for
/// pre-epoch timestamps.
fn truncate_to_bucket(ts_ns: i64, bucket_width: Duration) -> i64 {
    let width_ns = (bucket_width.as_nanos().max(1)) as i64;
    ts_ns.div_euclid(width_ns) * width_ns
}

impl Fingerprint {
    pub fn compute(plan: &Plan) -> Self {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();

        for sensor in &plan.sensors {
            hasher.update(sensor.0.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"|");
        if let Some(assets) = &plan.assets {
            for asset in assets {
                hasher.update(asset.0.as_bytes());
                hasher.update(b"\0");
            }
        } else {
            hasher.update(b"__all_assets__");
        }
        hasher.update(b"|");
        // Range endpoints are truncated to the bucket grain so two queries
        // landing in the same bucket share a cache entry even if their raw
        // sub-bucket start/end differ.
        let start_ns = plan.effective_range.start.timestamp_nanos_opt().unwrap_or(0);
        let end_ns = plan.effective_range.end.timestamp_nanos_opt().unwrap_or(0);
        hasher.update(truncate_to_bucket(start_ns, plan.bucket_width).to_le_bytes());
        hasher.update(truncate_to_bucket(end_ns, plan.bucket_width).to_le_bytes());
        hasher.update(plan.bucket_width.as_nanos().to_le_bytes());
        hasher.update(plan.aggregation.to_string().as_bytes());
        hasher.update(plan.tier.to_string().as_bytes());

        Fingerprint(format!("{:x}", hasher.finalize()))
    }
}

/// Metadata returned alongside every `DataSet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub cache_hit: bool,
    pub tier_used: Tier,
    pub bucket_width_used: Duration,
    pub execution_time_ms: u64,
    pub truncated: bool,
    pub actual_end: DateTime<Utc>,
    /// Non-fatal issues from the read (e.g. a partition that exceeded
    /// `per_partition_deadline` and was treated as empty).
    pub warnings: Vec<String>,
}
