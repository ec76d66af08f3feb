//! Columnar reader: loads a set of partition paths in parallel,
//! column-projects, time-filters, and concatenates into a stable-ordered
//! `Row` stream.
//!
//! Partition files are Arrow IPC, the format `stormasm-ioxnu22july/parquet_file`
//! uses for the same role.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Array, Float64Array, Int64Array};
use arrow::ipc::reader::FileReader;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backend::Registry;
use crate::error::{QueryError, Result};
use crate::model::{Measurement, Row, TimeRange};
use crate::partition::PartitionRef;

/// Outcome of a parallel partition read: the concatenated rows plus any
/// non-fatal warnings (e.g. partitions that timed out).
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub rows: Vec<Row>,
    pub warnings: Vec<String>,
}

/// Read `partitions` in parallel (bounded by `min(parallelism, |partitions|)`
/// concurrent workers), projecting `columns` and filtering to `range`.
pub async fn read_partitions(
    registry: Arc<Registry>,
    partitions: Vec<PartitionRef>,
    range: TimeRange,
    columns: Vec<String>,
    parallelism: usize,
    per_partition_deadline: Duration,
) -> Result<ReadOutcome> {
    if partitions.is_empty() {
        return Ok(ReadOutcome::default());
    }

    let effective_parallelism = parallelism.min(partitions.len()).max(1);
    let semaphore = Arc::new(Semaphore::new(effective_parallelism));

    let mut joins: JoinSet<std::result::Result<PartitionResult, QueryError>> = JoinSet::new();

    for partition in partitions {
        let registry = registry.clone();
        let semaphore = semaphore.clone();
        let columns = columns.clone();
        joins.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            read_one_partition(registry, partition, range, columns, per_partition_deadline).await
        });
    }

    let mut outcome = ReadOutcome::default();
    while let Some(joined) = joins.join_next().await {
        match joined {
            Ok(Ok(PartitionResult::Rows(mut rows))) => outcome.rows.append(&mut rows),
            Ok(Ok(PartitionResult::TimedOut { path })) => {
                outcome.warnings.push(format!("partition {path} exceeded per-partition deadline, treated as empty"));
            }
            Ok(Ok(PartitionResult::Missing)) => {}
            Ok(Err(e)) => {
                joins.abort_all();
                return Err(e);
            }
            Err(join_error) => {
                joins.abort_all();
                return Err(QueryError::read_failed(format!("partition worker panicked: {join_error}")));
            }
        }
    }

    // Stable (sensor, asset, timestamp) order across the whole concatenated set.
    outcome.rows.sort_by(|a, b| {
        (&a.sensor_id, &a.asset_id, a.timestamp).cmp(&(&b.sensor_id, &b.asset_id, b.timestamp))
    });

    Ok(outcome)
}

enum PartitionResult {
    Rows(Vec<Row>),
    TimedOut { path: String },
    Missing,
}

async fn read_one_partition(
    registry: Arc<Registry>,
    partition: PartitionRef,
    range: TimeRange,
    columns: Vec<String>,
    deadline: Duration,
) -> std::result::Result<PartitionResult, QueryError> {
    let path = partition.path.clone();
    match tokio::time::timeout(deadline, read_partition_inner(registry, partition, range, columns)).await {
        Ok(result) => result,
        Err(_elapsed) => Ok(PartitionResult::TimedOut { path }),
    }
}

async fn read_partition_inner(
    registry: Arc<Registry>,
    partition: PartitionRef,
    range: TimeRange,
    columns: Vec<String>,
) -> std::result::Result<PartitionResult, QueryError> {
    let bytes = match registry.open(&partition.path).await? {
        Some(bytes) => bytes,
        None => return Ok(PartitionResult::Missing),
    };

    let rows = parse_partition(&bytes, &partition, range, &columns)
        .map_err(|e| QueryError::read_failed(format!("{}: {e}", partition.path)))?;
    Ok(PartitionResult::Rows(rows))
}

/// Parse one Arrow IPC partition file into `Row`s, applying column projection
/// and the `[start, end)` timestamp filter.
fn parse_partition(bytes: &[u8], partition: &PartitionRef, range: TimeRange, columns: &[String]) -> anyhow::Result<Vec<Row>> {
    let cursor = Cursor::new(bytes);
    let reader = FileReader::try_new(cursor, None)?;
    let schema = reader.schema();

    let ts_index = schema
        .index_of("timestamp")
        .map_err(|_| anyhow::anyhow!("missing required `timestamp` column"))?;

    let mut out = Vec::new();

    for batch in reader {
        let batch = batch?;
        let ts_array = batch
            .column(ts_index)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| anyhow::anyhow!("`timestamp` column is not an int64 (nanoseconds) array"))?;

        // Column projection: only load the measurement columns the caller
        // actually asked for. A requested column absent from this partition's
        // schema tolerates as all-null for every row. An empty
        // projection list (besides `timestamp`) means "every measurement
        // column this partition has" — callers that don't know the schema
        // up front pass just `timestamp`.
        let requested: Vec<&String> = columns.iter().filter(|name| name.as_str() != "timestamp").collect();
        let mut resolved: Vec<(String, Option<usize>)> = Vec::new();
        if requested.is_empty() {
            for field in schema.fields() {
                if field.name() != "timestamp" {
                    resolved.push((field.name().clone(), schema.index_of(field.name()).ok()));
                }
            }
        } else {
            for name in requested {
                resolved.push((name.clone(), schema.index_of(name).ok()));
            }
        }

        for row_index in 0..batch.num_rows() {
            let ts_nanos = ts_array.value(row_index);
            let timestamp: DateTime<Utc> = DateTime::from_timestamp_nanos(ts_nanos);
            if timestamp < range.start || timestamp >= range.end {
                continue;
            }

            let mut measurements = BTreeMap::new();
            for (name, maybe_index) in &resolved {
                let value = match maybe_index {
                    None => Measurement::Null,
                    Some(idx) => read_measurement(batch.column(*idx).as_ref(), row_index)?,
                };
                measurements.insert(name.clone(), value);
            }

            out.push(Row {
                timestamp,
                sensor_id: partition.sensor_id.clone(),
                asset_id: partition.asset_id.clone(),
                measurements,
            });
        }
    }

    Ok(out)
}

fn read_measurement(array: &dyn Array, row_index: usize) -> anyhow::Result<Measurement> {
    if array.is_null(row_index) {
        return Ok(Measurement::Null);
    }
    if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
        return Ok(Measurement::Float(floats.value(row_index)));
    }
    if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
        return Ok(Measurement::Int(ints.value(row_index)));
    }
    anyhow::bail!("unsupported measurement column array type: {:?}", array.data_type())
}
