//! Configuration surface, loaded from a TOML file with defaults for
//! every field, same load-or-default shape as `WideConfig::load`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    PrimaryOnly,
    SecondaryOnly,
    Failover,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::Failover
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage_mode: StorageMode,
    pub storage_root: String,
    pub partition_extension: String,
    pub max_query_duration_secs: u64,
    pub default_max_points: u64,
    pub absolute_max_points: u64,
    pub cache: CacheConfig,
    pub tier: TierConfig,
    pub partition_read_parallelism: usize,
    pub per_partition_deadline_secs: u64,
    pub query_deadline_secs: u64,
    pub max_concurrent_queries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::default(),
            storage_root: "partitions".to_string(),
            partition_extension: "arrow".to_string(),
            max_query_duration_secs: 90 * 24 * 3600, // 90 days
            default_max_points: 1000,
            absolute_max_points: 100_000,
            cache: CacheConfig::default(),
            tier: TierConfig::default(),
            partition_read_parallelism: 8,
            per_partition_deadline_secs: 15,
            query_deadline_secs: 30,
            max_concurrent_queries: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub size_bytes: u64,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size_bytes: 512 * 1024 * 1024,
            ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub raw_tier_max_hours: u64,
    pub minute_tier_max_hours: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            raw_tier_max_hours: 24,
            minute_tier_max_hours: 168,
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn max_query_duration(&self) -> Duration {
        Duration::from_secs(self.max_query_duration_secs)
    }

    pub fn per_partition_deadline(&self) -> Duration {
        Duration::from_secs(self.per_partition_deadline_secs)
    }

    pub fn query_deadline(&self) -> Duration {
        Duration::from_secs(self.query_deadline_secs)
    }

    pub fn raw_max(&self) -> Duration {
        Duration::from_secs(self.tier.raw_tier_max_hours * 3600)
    }

    pub fn minute_max(&self) -> Duration {
        Duration::from_secs(self.tier.minute_tier_max_hours * 3600)
    }
}
