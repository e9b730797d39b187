//! Phase-length rescaling.
//!
//! The canonical cycle is 28 days: four exact phases of one day each and
//! four elastic phases of six days each. To fit an arbitrary cycle length
//! the elastic phases are multiplied by `target / 28` and rounded up for
//! longer cycles, down for shorter ones. Exact phases stay at one day at
//! every length, so a cycle has exactly one New Moon day.
//!
//! Any remaining difference is removed one day at a time from (or added to)
//! the elastic phases in canonical order. Very short cycles can drive an
//! elastic phase to zero days; that is an accepted degeneracy. When the
//! elastic phases are exhausted (cycles under four days) the exact phases
//! after New Moon are trimmed in reverse order, so every cycle still has
//! exactly the requested length and keeps its New Moon.

use lunar_types::{LunarPhase, PhaseKind};

/// Length of the canonical lunar cycle in days.
pub const CANONICAL_CYCLE_DAYS: u32 = 28;

/// Errors produced by phase rescaling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScaleError {
    /// The requested cycle length rounds to less than one day, or is not a
    /// finite number.
    #[error("invalid cycle length {requested}: must round to at least 1 day")]
    InvalidCycleLength {
        /// The rejected input.
        requested: f64,
    },
}

/// Day counts for each of the eight phases after rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledPhases {
    /// Day count per phase, indexed by [`LunarPhase::index`].
    days: [u32; 8],
    /// Sum of `days`, equal to the requested cycle length.
    total: u32,
}

impl ScaledPhases {
    /// Day count assigned to `phase`.
    pub fn days(&self, phase: LunarPhase) -> u32 {
        self.days.get(phase.index()).copied().unwrap_or(0)
    }

    /// Total cycle length in days.
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Iterate `(phase, days)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (LunarPhase, u32)> + '_ {
        LunarPhase::ALL.into_iter().map(|phase| (phase, self.days(phase)))
    }
}

/// Round a requested cycle length to whole days.
///
/// # Errors
///
/// Returns [`ScaleError::InvalidCycleLength`] if the value is not finite,
/// rounds below 1, or exceeds `u32::MAX`.
pub fn normalize_cycle_length(target_days: f64) -> Result<u32, ScaleError> {
    let rounded = target_days.round();
    if !rounded.is_finite() || rounded < 1.0 || rounded > f64::from(u32::MAX) {
        return Err(ScaleError::InvalidCycleLength {
            requested: target_days,
        });
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let days = rounded as u32;
    Ok(days)
}

/// Rescale the canonical phase lengths so they sum to `target_days`.
///
/// # Errors
///
/// Returns [`ScaleError::InvalidCycleLength`] if `target_days` rounds to
/// less than one day.
pub fn scale_phases(target_days: f64) -> Result<ScaledPhases, ScaleError> {
    let target = normalize_cycle_length(target_days)?;
    let scalar = f64::from(target) / f64::from(CANONICAL_CYCLE_DAYS);

    let mut days = [0_u32; 8];
    for phase in LunarPhase::ALL {
        let scaled = f64::from(phase.canonical_days()) * scalar;
        let rounded = match phase.kind() {
            PhaseKind::Exact => f64::from(phase.canonical_days()),
            PhaseKind::Elastic if scalar >= 1.0 => scaled.ceil(),
            PhaseKind::Elastic => scaled.floor(),
        };
        // scaled <= 6 * target, which fits comfortably in u32 for any
        // target that passed normalization.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = rounded.max(0.0) as u32;
        if let Some(slot) = days.get_mut(phase.index()) {
            *slot = count;
        }
    }

    rebalance(&mut days, target);

    Ok(ScaledPhases {
        days,
        total: days.iter().fold(0_u32, |acc, d| acc.saturating_add(*d)),
    })
}

/// Nudge day counts one at a time until they sum to `target`.
fn rebalance(days: &mut [u32; 8], target: u32) {
    loop {
        let sum = days.iter().fold(0_u32, |acc, d| acc.saturating_add(*d));
        if sum == target {
            return;
        }
        let changed = if sum > target {
            shrink_one(days, sum, target)
        } else {
            grow_one(days, sum, target)
        };
        if !changed {
            // Only New Moon is left and the target is below one day, which
            // normalization already rules out.
            return;
        }
    }
}

/// One pass over the elastic phases adding a day to each until the target
/// is met. Returns whether anything changed.
fn grow_one(days: &mut [u32; 8], mut sum: u32, target: u32) -> bool {
    let mut changed = false;
    for phase in elastic_phases() {
        if sum >= target {
            break;
        }
        if let Some(slot) = days.get_mut(phase.index()) {
            *slot = slot.saturating_add(1);
            sum = sum.saturating_add(1);
            changed = true;
        }
    }
    changed
}

/// One pass removing a day from each non-empty elastic phase until the
/// target is met, falling back to the exact phases (never New Moon) when
/// every elastic phase is already empty. Returns whether anything changed.
fn shrink_one(days: &mut [u32; 8], mut sum: u32, target: u32) -> bool {
    let mut changed = false;
    for phase in elastic_phases() {
        if sum <= target {
            return true;
        }
        if let Some(slot) = days.get_mut(phase.index()).filter(|d| **d > 0) {
            *slot = slot.saturating_sub(1);
            sum = sum.saturating_sub(1);
            changed = true;
        }
    }
    if changed {
        return true;
    }

    let trimmable = LunarPhase::ALL
        .into_iter()
        .rev()
        .filter(|p| p.kind() == PhaseKind::Exact && *p != LunarPhase::NewMoon);
    for phase in trimmable {
        if let Some(slot) = days.get_mut(phase.index()).filter(|d| **d > 0) {
            *slot = slot.saturating_sub(1);
            return true;
        }
    }
    false
}

fn elastic_phases() -> impl Iterator<Item = LunarPhase> {
    LunarPhase::ALL
        .into_iter()
        .filter(|p| p.kind() == PhaseKind::Elastic)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn counts(scaled: &ScaledPhases) -> Vec<u32> {
        scaled.iter().map(|(_, d)| d).collect()
    }

    #[test]
    fn canonical_length_is_unchanged() {
        let scaled = scale_phases(28.0).unwrap();
        assert_eq!(counts(&scaled), vec![1, 6, 1, 6, 1, 6, 1, 6]);
        assert_eq!(scaled.total(), 28);
    }

    #[test]
    fn sum_matches_target_for_every_length() {
        for target in 1..=400_u32 {
            let scaled = scale_phases(f64::from(target)).unwrap();
            assert_eq!(scaled.total(), target, "target {target}");
            let summed: u32 = scaled.iter().map(|(_, d)| d).sum();
            assert_eq!(summed, target, "target {target}");
        }
    }

    #[test]
    fn fractional_targets_round_to_nearest_day() {
        assert_eq!(scale_phases(29.5).unwrap().total(), 30);
        assert_eq!(scale_phases(29.4).unwrap().total(), 29);
        assert_eq!(scale_phases(0.6).unwrap().total(), 1);
    }

    #[test]
    fn rejects_lengths_below_one_day() {
        assert!(matches!(
            scale_phases(0.0),
            Err(ScaleError::InvalidCycleLength { .. })
        ));
        assert!(scale_phases(0.4).is_err());
        assert!(scale_phases(-5.0).is_err());
        assert!(scale_phases(f64::NAN).is_err());
        assert!(scale_phases(f64::INFINITY).is_err());
    }

    #[test]
    fn longer_cycle_absorbs_error_in_elastic_phases() {
        // scalar = 30/28: exact floor to 1, elastic ceil to 7 (sum 32),
        // then the first two elastic phases give a day back.
        let scaled = scale_phases(30.0).unwrap();
        assert_eq!(counts(&scaled), vec![1, 6, 1, 6, 1, 7, 1, 7]);
    }

    #[test]
    fn shorter_cycle_keeps_exact_phases() {
        // scalar = 0.5: exact ceil to 1, elastic floor to 3 (sum 16), then
        // two elastic phases shrink.
        let scaled = scale_phases(14.0).unwrap();
        assert_eq!(counts(&scaled), vec![1, 2, 1, 2, 1, 3, 1, 3]);
        for phase in LunarPhase::ALL {
            if phase.kind() == PhaseKind::Exact {
                assert_eq!(scaled.days(phase), 1);
            }
        }
    }

    #[test]
    fn tiny_cycles_empty_elastic_phases_but_keep_new_moon() {
        let scaled = scale_phases(4.0).unwrap();
        assert_eq!(counts(&scaled), vec![1, 0, 1, 0, 1, 0, 1, 0]);

        let one_day = scale_phases(1.0).unwrap();
        assert_eq!(one_day.total(), 1);
        assert_eq!(one_day.days(LunarPhase::NewMoon), 1);
    }

    #[test]
    fn doubled_cycle_keeps_exact_phases_at_one_day() {
        // Elastic ceil to 12 (sum 52), then each elastic phase grows once.
        let scaled = scale_phases(56.0).unwrap();
        assert_eq!(counts(&scaled), vec![1, 13, 1, 13, 1, 13, 1, 13]);
    }

    #[test]
    fn exactly_one_new_moon_day_at_every_length() {
        for target in 1..=400_u32 {
            let scaled = scale_phases(f64::from(target)).unwrap();
            assert_eq!(scaled.days(LunarPhase::NewMoon), 1, "target {target}");
            for phase in LunarPhase::ALL {
                if phase.kind() == PhaseKind::Exact {
                    assert!(scaled.days(phase) <= 1, "{phase} at {target}");
                }
            }
        }
    }
}
