//! Water-level tier classification.
//!
//! Maps a level reading onto the `FloodStatus` tiers using per-gauge cutoffs,
//! and tracks tier changes so callers can log (or notify) on transitions only
//! instead of on every sample.

use crate::model::FloodStatus;

/// Cutoffs for one gauge, in cm. Levels strictly above a cutoff reach its
/// tier; `danger_inclusive` makes the danger cutoff itself count as danger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierCutoffs {
    pub watch_cm: f64,
    pub high_watch_cm: f64,
    pub danger_cm: f64,
    pub danger_inclusive: bool,
}

/// Returns the tier a level falls into.
pub fn classify_level(level_cm: f64, cutoffs: &TierCutoffs) -> FloodStatus {
    let danger = if cutoffs.danger_inclusive {
        level_cm >= cutoffs.danger_cm
    } else {
        level_cm > cutoffs.danger_cm
    };

    if danger {
        FloodStatus::Danger
    } else if level_cm > cutoffs.high_watch_cm {
        FloodStatus::HighWatch
    } else if level_cm > cutoffs.watch_cm {
        FloodStatus::Watch
    } else {
        FloodStatus::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierChange {
    pub from: FloodStatus,
    pub to: FloodStatus,
}

impl TierChange {
    pub fn is_recovery(&self) -> bool {
        self.to == FloodStatus::Normal
    }
}

/// Edge detector over a stream of tiers. Starts at `Normal`, so the first
/// Normal observation is not a change.
#[derive(Debug, Clone)]
pub struct TierWatch {
    last: FloodStatus,
}

impl Default for TierWatch {
    fn default() -> Self {
        TierWatch {
            last: FloodStatus::Normal,
        }
    }
}

impl TierWatch {
    pub fn observe(&mut self, tier: FloodStatus) -> Option<TierChange> {
        if tier == self.last {
            return None;
        }
        let change = TierChange {
            from: self.last,
            to: tier,
        };
        self.last = tier;
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAUGE_A: TierCutoffs = TierCutoffs {
        watch_cm: 20.0,
        high_watch_cm: 25.0,
        danger_cm: 28.0,
        danger_inclusive: false,
    };

    const GAUGE_B: TierCutoffs = TierCutoffs {
        watch_cm: 20.0,
        high_watch_cm: 25.0,
        danger_cm: 28.0,
        danger_inclusive: true,
    };

    #[test]
    fn test_levels_map_to_tiers() {
        assert_eq!(classify_level(5.0, &GAUGE_A), FloodStatus::Normal);
        assert_eq!(classify_level(20.0, &GAUGE_A), FloodStatus::Normal);
        assert_eq!(classify_level(20.1, &GAUGE_A), FloodStatus::Watch);
        assert_eq!(classify_level(25.5, &GAUGE_A), FloodStatus::HighWatch);
        assert_eq!(classify_level(28.5, &GAUGE_A), FloodStatus::Danger);
    }

    #[test]
    fn test_danger_cutoff_inclusivity_differs_per_gauge() {
        assert_eq!(classify_level(28.0, &GAUGE_A), FloodStatus::HighWatch);
        assert_eq!(classify_level(28.0, &GAUGE_B), FloodStatus::Danger);
    }

    #[test]
    fn test_watch_reports_only_changes() {
        let mut watch = TierWatch::default();
        assert_eq!(watch.observe(FloodStatus::Normal), None);
        let up = watch.observe(FloodStatus::Watch).expect("Normal -> Watch is a change");
        assert_eq!(up.from, FloodStatus::Normal);
        assert_eq!(watch.observe(FloodStatus::Watch), None);
        assert_eq!(watch.observe(FloodStatus::Watch), None);

        let down = watch.observe(FloodStatus::Normal).expect("Watch -> Normal is a change");
        assert!(down.is_recovery());
        assert_eq!(down.to, FloodStatus::Normal);
    }
}
