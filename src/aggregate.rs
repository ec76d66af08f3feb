//! Aggregator: buckets rows sorted by `(sensor, asset, timestamp)`
//! into fixed-width time buckets and folds each measurement column.
//!
//! Uses explicit `f64`-accumulating loops over sorted rows rather than
//! pulling in a dataframe library.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::{Aggregation, AssetId, Measurement, Row, SensorId};

/// Bucket a sorted `Row` stream into one output row per
/// `(sensor, asset, bucket_index)`, per `Aggregation`.
///
/// `rows` must already be sorted by `(sensor_id, asset_id, timestamp)`
/// ascending — the columnar reader guarantees this.
pub fn aggregate(rows: &[Row], range_start: DateTime<Utc>, bucket_width: Duration, aggregation: Aggregation) -> Vec<Row> {
    if aggregation == Aggregation::Raw {
        return rows.to_vec();
    }

    let bucket_secs = bucket_width.as_secs_f64().max(f64::MIN_POSITIVE);

    // Group by (sensor, asset, bucket_index) preserving input order within
    // each group, so `last`'s "final row in input order wins" tie-break holds.
    let mut groups: BTreeMap<(SensorId, AssetId, i64), Vec<&Row>> = BTreeMap::new();
    for row in rows {
        let offset_secs = (row.timestamp - range_start).num_milliseconds() as f64 / 1000.0;
        let bucket_index = (offset_secs / bucket_secs).floor() as i64;
        groups
            .entry((row.sensor_id.clone(), row.asset_id.clone(), bucket_index))
            .or_default()
            .push(row);
    }

    let mut out = Vec::with_capacity(groups.len());
    for ((sensor_id, asset_id, bucket_index), bucket_rows) in groups {
        let bucket_start = range_start + chrono::Duration::milliseconds((bucket_index as f64 * bucket_secs * 1000.0) as i64);

        let measurements = fold_bucket(&bucket_rows, aggregation);
        // `mean` over an entirely-empty bucket produces no output row (sparse
        // output); other aggregations always have >=1 input row since the
        // bucket was only created from at least one row.
        if aggregation == Aggregation::Mean && measurements.values().all(Measurement::is_null) {
            continue;
        }

        out.push(Row {
            timestamp: bucket_start,
            sensor_id,
            asset_id,
            measurements,
        });
    }

    out
}

fn fold_bucket(rows: &[&Row], aggregation: Aggregation) -> BTreeMap<String, Measurement> {
    let mut columns: BTreeMap<String, Vec<(DateTime<Utc>, Measurement)>> = BTreeMap::new();
    for row in rows {
        for (name, value) in &row.measurements {
            columns
                .entry(name.clone())
                .or_default()
                .push((row.timestamp, *value));
        }
    }

    let mut out = BTreeMap::new();
    for (name, values) in columns {
        let folded = match aggregation {
            Aggregation::Mean => fold_mean(&values),
            Aggregation::Min => fold_extremum(&values, true),
            Aggregation::Max => fold_extremum(&values, false),
            Aggregation::Last => fold_last(&values),
            Aggregation::Raw => unreachable!("raw handled before bucketing"),
        };
        out.insert(name, folded);
    }
    out
}

/// Arithmetic mean in double precision; `NaN` inputs dropped; empty ⇒ `Null`.
fn fold_mean(values: &[(DateTime<Utc>, Measurement)]) -> Measurement {
    let mut sum = 0.0f64;
    let mut count = 0u64;
    for (_, v) in values {
        if let Some(f) = v.as_f64() {
            if !f.is_nan() {
                sum += f;
                count += 1;
            }
        }
    }
    if count == 0 {
        Measurement::Null
    } else {
        Measurement::Float(sum / count as f64)
    }
}

/// Element-wise extremum. Integer columns stay integer; `NaN` dropped.
fn fold_extremum(values: &[(DateTime<Utc>, Measurement)], want_min: bool) -> Measurement {
    let mut best: Option<Measurement> = None;
    for (_, v) in values {
        let Some(f) = v.as_f64() else { continue };
        if f.is_nan() {
            continue;
        }
        best = Some(match best {
            None => *v,
            Some(current) => {
                let current_f = current.as_f64().unwrap_or(f64::NAN);
                let take_new = if want_min { f < current_f } else { f > current_f };
                if take_new { *v } else { current }
            }
        });
    }
    best.unwrap_or(Measurement::Null)
}

/// Value with the greatest timestamp; ties broken by input order (last wins).
fn fold_last(values: &[(DateTime<Utc>, Measurement)]) -> Measurement {
    let mut best: Option<(DateTime<Utc>, Measurement)> = None;
    for &(ts, v) in values {
        if v.is_null() {
            continue;
        }
        match &best {
            None => best = Some((ts, v)),
            Some((best_ts, _)) => {
                if ts >= *best_ts {
                    best = Some((ts, v));
                }
            }
        }
    }
    best.map(|(_, v)| v).unwrap_or(Measurement::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(ts_secs: i64, sensor: &str, asset: &str, value: f64) -> Row {
        Row {
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            sensor_id: SensorId::from(sensor),
            asset_id: AssetId::from(asset),
            measurements: BTreeMap::from([("temperature".to_string(), Measurement::Float(value))]),
        }
    }

    #[test]
    fn mean_is_between_min_and_max() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let rows = vec![
            row(0, "s1", "a1", 10.0),
            row(10, "s1", "a1", 20.0),
            row(20, "s1", "a1", 30.0),
        ];
        let out = aggregate(&rows, start, Duration::from_secs(60), Aggregation::Mean);
        assert_eq!(out.len(), 1);
        let mean = out[0].measurements["temperature"].as_f64().unwrap();
        assert!((10.0..=30.0).contains(&mean));
        assert_eq!(mean, 20.0);
    }

    #[test]
    fn nan_inputs_are_dropped_from_mean() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let mut rows = vec![row(0, "s1", "a1", 10.0), row(10, "s1", "a1", 30.0)];
        rows[0].measurements.insert("temperature".to_string(), Measurement::Float(f64::NAN));
        let out = aggregate(&rows, start, Duration::from_secs(60), Aggregation::Mean);
        assert_eq!(out[0].measurements["temperature"].as_f64().unwrap(), 30.0);
    }

    #[test]
    fn last_breaks_ties_by_input_order() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let ts = Utc.timestamp_opt(5, 0).unwrap();
        let rows = vec![
            Row {
                timestamp: ts,
                sensor_id: SensorId::from("s1"),
                asset_id: AssetId::from("a1"),
                measurements: BTreeMap::from([("v".to_string(), Measurement::Float(1.0))]),
            },
            Row {
                timestamp: ts,
                sensor_id: SensorId::from("s1"),
                asset_id: AssetId::from("a1"),
                measurements: BTreeMap::from([("v".to_string(), Measurement::Float(2.0))]),
            },
        ];
        let out = aggregate(&rows, start, Duration::from_secs(60), Aggregation::Last);
        assert_eq!(out[0].measurements["v"].as_f64().unwrap(), 2.0);
    }

    #[test]
    fn output_timestamps_are_bucket_left_edges() {
        let start = Utc.timestamp_opt(1000, 0).unwrap();
        let rows = vec![row(1125, "s1", "a1", 5.0)];
        let out = aggregate(&rows, start, Duration::from_secs(60), Aggregation::Mean);
        // bucket_index = floor(125/60) = 2 -> left edge = start + 120s
        assert_eq!(out[0].timestamp, start + chrono::Duration::seconds(120));
    }

    #[test]
    fn min_then_min_across_a_partition_split_equals_min_over_union() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let all = vec![
            row(0, "s1", "a1", 5.0),
            row(1, "s1", "a1", 2.0),
            row(2, "s1", "a1", 9.0),
        ];
        let (left, right) = all.split_at(2);
        let min_whole = aggregate(&all, start, Duration::from_secs(3600), Aggregation::Min);
        let min_left = aggregate(left, start, Duration::from_secs(3600), Aggregation::Min);
        let min_right = aggregate(right, start, Duration::from_secs(3600), Aggregation::Min);
        let merged_min = min_left[0]
            .measurements["temperature"]
            .as_f64()
            .unwrap()
            .min(min_right[0].measurements["temperature"].as_f64().unwrap());
        assert_eq!(min_whole[0].measurements["temperature"].as_f64().unwrap(), merged_min);
    }

    #[test]
    fn raw_aggregation_is_passthrough_identity() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let rows = vec![row(0, "s1", "a1", 1.0), row(1, "s1", "a1", 2.0)];
        let out = aggregate(&rows, start, Duration::from_secs(1), Aggregation::Raw);
        assert_eq!(out.len(), rows.len());
    }

    #[test]
    fn re_aggregating_already_bucketed_output_at_same_width_is_a_no_op() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let rows = vec![
            row(0, "s1", "a1", 5.0),
            row(65, "s1", "a1", 9.0),
        ];
        let once = aggregate(&rows, start, Duration::from_secs(60), Aggregation::Mean);
        let twice = aggregate(&once, start, Duration::from_secs(60), Aggregation::Mean);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(
                a.measurements["temperature"].as_f64(),
                b.measurements["temperature"].as_f64()
            );
        }
    }
}
