//! Tier selector: picks {Raw, Minute, Hour} from the requested
//! bucket width and range duration, promoting and rounding when the chosen
//! tier cannot serve the requested resolution.

use std::time::Duration;

use crate::config::TierConfig;
use crate::model::{Aggregation, Tier};
use crate::planner::snap_up;

/// Result of tier selection: the final `(tier, bucket_width)` pair plus
/// whether the caller's requested resolution was coarsened to fit the tier.
pub struct TierSelection {
    pub tier: Tier,
    pub bucket_width: Duration,
    pub promoted: bool,
}

/// Select a tier and finalize the bucket width, first-match-wins.
///
/// `want_raw` forces the RAW tier the same way `aggregation = Raw` does —
/// it lets a caller request a downsampled output (`mean`/`min`/`max`/`last`)
/// computed over raw-tier source rows instead of over pre-aggregated
/// minute/hour tier data, trading bandwidth for precision.
pub fn select_tier(
    aggregation: Aggregation,
    want_raw: bool,
    bucket_width: Duration,
    duration: Duration,
    config: &TierConfig,
) -> TierSelection {
    let minute_max = Duration::from_secs(config.minute_tier_max_hours * 3600);

    let tier = if aggregation == Aggregation::Raw || want_raw {
        Tier::Raw
    } else if bucket_width < Duration::from_secs(60) {
        Tier::Raw
    } else if bucket_width < Duration::from_secs(3600) && duration <= minute_max {
        Tier::Minute
    } else {
        Tier::Hour
    };

    let grain = tier.grain();
    if bucket_width < grain {
        TierSelection {
            tier,
            bucket_width: snap_up(grain).max(grain),
            promoted: true,
        }
    } else {
        TierSelection {
            tier,
            bucket_width,
            promoted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TierConfig {
        TierConfig {
            raw_tier_max_hours: 24,
            minute_tier_max_hours: 168,
        }
    }

    #[test]
    fn raw_aggregation_always_selects_raw_tier() {
        let sel = select_tier(
            Aggregation::Raw,
            false,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            &cfg(),
        );
        assert_eq!(sel.tier, Tier::Raw);
        assert!(!sel.promoted);
    }

    #[test]
    fn sub_minute_bucket_selects_raw() {
        let sel = select_tier(
            Aggregation::Mean,
            false,
            Duration::from_secs(30),
            Duration::from_secs(3600),
            &cfg(),
        );
        assert_eq!(sel.tier, Tier::Raw);
    }

    #[test]
    fn sub_hour_bucket_within_minute_window_selects_minute() {
        let sel = select_tier(
            Aggregation::Mean,
            false,
            Duration::from_secs(600),
            Duration::from_secs(24 * 3600),
            &cfg(),
        );
        assert_eq!(sel.tier, Tier::Minute);
        assert_eq!(sel.bucket_width, Duration::from_secs(600));
        assert!(!sel.promoted);
    }

    #[test]
    fn boundary_scenario_4_promotes_to_hour_and_rounds_width() {
        // duration=14d exceeds minute_tier_max_hours(168h=7d), bucket=5m requested.
        let sel = select_tier(
            Aggregation::Mean,
            false,
            Duration::from_secs(5 * 60),
            Duration::from_secs(14 * 24 * 3600),
            &cfg(),
        );
        assert_eq!(sel.tier, Tier::Hour);
        assert_eq!(sel.bucket_width, Duration::from_secs(3600));
        assert!(sel.promoted);
    }

    #[test]
    fn hour_tier_with_already_coarse_width_is_not_promoted() {
        let sel = select_tier(
            Aggregation::Mean,
            false,
            Duration::from_secs(2 * 3600),
            Duration::from_secs(400 * 3600),
            &cfg(),
        );
        assert_eq!(sel.tier, Tier::Hour);
        assert_eq!(sel.bucket_width, Duration::from_secs(2 * 3600));
        assert!(!sel.promoted);
    }

    #[test]
    fn want_raw_forces_raw_tier_even_for_coarse_aggregation() {
        let sel = select_tier(
            Aggregation::Mean,
            true,
            Duration::from_secs(3600),
            Duration::from_secs(400 * 3600),
            &cfg(),
        );
        assert_eq!(sel.tier, Tier::Raw);
    }
}
