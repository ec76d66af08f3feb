//! Interval planner: picks `bucket_width` to keep output within
//! `max_points`, snapped to the standard resolution grid.

use std::time::Duration;

/// Standard grid of supported bucket widths, ascending.
pub const STANDARD_GRID: &[Duration] = &[
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(30 * 60),
    Duration::from_secs(3600),
    Duration::from_secs(2 * 3600),
    Duration::from_secs(4 * 3600),
    Duration::from_secs(6 * 3600),
    Duration::from_secs(12 * 3600),
    Duration::from_secs(24 * 3600),
];

/// Snap `width` upward to the nearest value in `STANDARD_GRID`. Never snaps
/// downward — the caller's resolution must never be finer than requested.
/// Widths above the grid's maximum saturate at 24h.
pub fn snap_up(width: Duration) -> Duration {
    for &grid_width in STANDARD_GRID {
        if grid_width >= width {
            return grid_width;
        }
    }
    *STANDARD_GRID.last().unwrap()
}

/// Compute the minimum bucket width that keeps `duration * sensor_count`
/// output points within `max_points`, then snap upward to the grid.
///
/// `duration` and `sensor_count` must be positive; `max_points` must be
/// positive. Panics are avoided by the caller validating the `Query` first.
pub fn plan_bucket_width(duration: Duration, sensor_count: u64, max_points: u64) -> Duration {
    debug_assert!(sensor_count > 0);
    debug_assert!(max_points > 0);

    let duration_secs = duration.as_secs_f64().max(0.0);
    let budget = max_points as f64;
    let min_width_secs = (duration_secs * sensor_count as f64 / budget).ceil();
    let min_width = Duration::from_secs_f64(min_width_secs.max(0.0));

    snap_up(min_width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_up_never_rounds_down() {
        assert_eq!(snap_up(Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(snap_up(Duration::from_secs(2)), Duration::from_secs(5));
        assert_eq!(snap_up(Duration::from_secs(45)), Duration::from_secs(60));
        assert_eq!(snap_up(Duration::from_secs(59)), Duration::from_secs(60));
    }

    #[test]
    fn snap_up_saturates_at_24h() {
        assert_eq!(
            snap_up(Duration::from_secs(100 * 3600)),
            Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn boundary_scenario_3_snaps_to_10_minutes() {
        // sensors=[s1,s2], range=24h, max_points=288, aggregation=mean
        let width = plan_bucket_width(Duration::from_secs(24 * 3600), 2, 288);
        assert_eq!(width, Duration::from_secs(10 * 60));
    }

    #[test]
    fn boundary_scenario_4_pre_promotion_width() {
        // sensors=[s1], range=14d, max_points=10000, aggregation=mean.
        // The tier selector later promotes this to 1h once it picks HOUR tier
        // (duration exceeds minute_tier_max_hours) — see tier.rs.
        let width = plan_bucket_width(Duration::from_secs(14 * 24 * 3600), 1, 10000);
        assert_eq!(width, Duration::from_secs(5 * 60));
    }
}
