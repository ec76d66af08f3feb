use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use sensorquery_core::backend::fs::FsBackend;
use sensorquery_core::backend::{Backend, Registry, Role};
use sensorquery_core::config::{EngineConfig, StorageMode};
use sensorquery_core::engine::Engine;
use sensorquery_core::maintenance::spawn_maintenance;
use sensorquery_core::model::{Aggregation, Query, SensorId, TimeRange};

fn build_registry(config: &EngineConfig) -> Registry {
    let primary_path =
        std::env::var("SENSORQUERY_PRIMARY_PATH").unwrap_or_else(|_| config.storage_root.clone());
    let secondary_path = std::env::var("SENSORQUERY_SECONDARY_PATH").ok().map(PathBuf::from);

    let primary: Arc<dyn Backend> = Arc::new(FsBackend::new(PathBuf::from(&primary_path), "primary"));
    let backends: Vec<(Role, Arc<dyn Backend>)> = match config.storage_mode {
        StorageMode::PrimaryOnly => vec![(Role::Primary, primary)],
        StorageMode::SecondaryOnly => {
            let path = secondary_path.unwrap_or_else(|| PathBuf::from(&primary_path));
            let secondary: Arc<dyn Backend> = Arc::new(FsBackend::new(path, "secondary"));
            vec![(Role::Primary, secondary)]
        }
        StorageMode::Failover => {
            let mut backends = vec![(Role::Primary, primary)];
            if let Some(path) = secondary_path {
                let secondary: Arc<dyn Backend> = Arc::new(FsBackend::new(path, "secondary"));
                backends.push((Role::Secondary, secondary));
            }
            backends
        }
    };

    Registry::new(backends)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sensorquery_core=debug")))
        .init();

    let config_path = std::env::var("SENSORQUERY_CONFIG").unwrap_or_else(|_| "sensorquery.toml".to_string());
    let config = EngineConfig::load(&config_path)?;
    tracing::info!(storage_root = %config.storage_root, storage_mode = ?config.storage_mode, "sensorqueryd starting");

    let registry = build_registry(&config);
    let engine = Arc::new(Engine::new(config, registry));

    spawn_maintenance(engine.clone(), Duration::from_secs(60));

    let sensor = std::env::var("SENSORQUERY_DEMO_SENSOR").unwrap_or_else(|_| "quad_ch1".to_string());
    let range = TimeRange::new(
        chrono::Utc::now() - chrono::Duration::hours(1),
        chrono::Utc::now(),
    )
    .expect("a 1h lookback window always has start < end");

    let query = Query {
        sensors: std::collections::BTreeSet::from([SensorId::from(sensor.as_str())]),
        assets: None,
        range,
        interval: None,
        max_points: 1000,
        aggregation: Aggregation::Mean,
        want_raw: false,
    };

    match engine.execute(query, Duration::from_secs(30)).await {
        Ok((dataset, metadata)) => {
            tracing::info!(
                rows = dataset.len(),
                tier = ?metadata.tier_used,
                truncated = metadata.truncated,
                execution_time_ms = metadata.execution_time_ms,
                "demonstration query completed"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "demonstration query failed (no partitions under storage_root yet?)");
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("sensorqueryd shutting down");
    Ok(())
}
