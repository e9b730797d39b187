//! Schedule synthesis: one record per simulated day.
//!
//! The scaled phases are expanded into a flat day-by-day sequence in
//! canonical order and rotated so day 0 falls on the first day of the
//! requested start phase. Moonrise and moonset then follow a fixed drift
//! model:
//!
//! - New Moon: no rise, no set.
//! - Before the first New Moon: moonset is pinned to sunrise, moonrise
//!   drifts later from sunset by `day * kickback` minutes.
//! - After a New Moon: moonrise is pinned to sunset, moonset drifts later
//!   from sunset by `(day - last_new_moon) * kickback` minutes.
//!
//! `kickback` is the reference daily drift scaled inversely with cycle
//! length, so a shorter cycle drifts faster per simulated day. Days are
//! indexed from 0.
//!
//! The phase angle is a triangular wave over the canonical (unrotated)
//! sequence: 180 on the first Full Moon day, falling linearly to 0 on the
//! New Moon day the scaler produced, then rising back toward 180.

use lunar_types::{ClockTime, LunarPhase, ScheduleEntry};
use tracing::{debug, info};

use crate::scaler::{self, ScaleError, ScaledPhases};

/// Hour at which the simulated sun rises.
pub const SUNRISE_HOUR: u32 = 6;

/// Hour at which the simulated sun sets.
pub const SUNSET_HOUR: u32 = 18;

/// Cycle length (days) against which the reference drift is defined.
pub const DRIFT_REFERENCE_CYCLE_DAYS: f64 = 29.5;

/// Reference per-day moonrise delay, in minutes.
pub const REFERENCE_DAILY_DRIFT_MINUTES: f64 = 50.0 * 28.0 / 29.0;

/// Phase on day 0 when no start phase is configured.
pub const DEFAULT_START_PHASE: LunarPhase = LunarPhase::FullMoon;

/// Seconds in one day.
const SECONDS_PER_DAY: u32 = 86_400;

/// Errors produced while building a schedule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    /// The cycle length could not be rescaled.
    #[error("phase scaling failed: {source}")]
    Scale {
        /// The underlying scaling error.
        #[from]
        source: ScaleError,
    },

    /// Rescaling produced a cycle with no days.
    #[error("degenerate schedule: {reason}")]
    Degenerate {
        /// Explanation of the degenerate result.
        reason: String,
    },
}

/// An immutable lunar schedule: one [`ScheduleEntry`] per simulated day.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
    start_phase: LunarPhase,
    kickback_minutes: f64,
}

impl Schedule {
    /// Build a schedule for `target_days`, starting on `start_phase`
    /// (defaults to [`DEFAULT_START_PHASE`]).
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Scale`] for a cycle length below one day and
    /// [`ScheduleError::Degenerate`] if no days remain after rescaling.
    pub fn build(target_days: f64, start_phase: Option<LunarPhase>) -> Result<Self, ScheduleError> {
        let scaled = scaler::scale_phases(target_days)?;
        Self::from_scaled(&scaled, start_phase)
    }

    /// Build a schedule from already-scaled phase lengths.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Degenerate`] if `scaled` has no days.
    pub fn from_scaled(
        scaled: &ScaledPhases,
        start_phase: Option<LunarPhase>,
    ) -> Result<Self, ScheduleError> {
        let total = scaled.total();
        if total == 0 {
            return Err(ScheduleError::Degenerate {
                reason: "rescaled cycle has zero days".to_owned(),
            });
        }

        let start_phase = start_phase.unwrap_or(DEFAULT_START_PHASE);
        let mut sequence: Vec<LunarPhase> = scaled
            .iter()
            .flat_map(|(phase, days)| {
                core::iter::repeat_n(phase, usize::try_from(days).unwrap_or(0))
            })
            .collect();

        let new_moon_day = sequence
            .iter()
            .position(|p| *p == LunarPhase::NewMoon)
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or(0);

        let offset = sequence
            .iter()
            .position(|p| *p == start_phase)
            .unwrap_or_else(|| {
                debug!(
                    start_phase = %start_phase,
                    "start phase has no days at this cycle length, starting at canonical day 0"
                );
                0
            });
        sequence.rotate_left(offset);

        let kickback = kickback_minutes(total);
        let mut entries = Vec::with_capacity(sequence.len());
        let mut last_new_moon: Option<u32> = None;

        for (day, phase) in (0_u32..).zip(sequence) {
            let (moonrise, moonset) = if phase == LunarPhase::NewMoon {
                last_new_moon = Some(day);
                (None, None)
            } else {
                let (rise, set) = rise_and_set(day, last_new_moon, kickback);
                (Some(rise), Some(set))
            };

            let visibility_seconds = match (moonrise, moonset) {
                (Some(rise), Some(set)) => visibility_seconds(rise, set),
                _ => 0,
            };

            // Phase angle follows the canonical position, so Full Moon stays
            // at 180 degrees whatever the start phase.
            let canonical_day = u32::try_from(offset)
                .ok()
                .and_then(|o| day.checked_add(o))
                .and_then(|d| d.checked_rem(total))
                .unwrap_or(day);

            entries.push(ScheduleEntry {
                day,
                phase,
                moonrise,
                moonset,
                visibility_seconds,
                phase_angle: phase_angle(canonical_day, total, new_moon_day),
            });
        }

        info!(
            cycle_days = total,
            start_phase = %start_phase,
            kickback_minutes = kickback,
            "Lunar schedule built"
        );

        Ok(Self {
            entries,
            start_phase,
            kickback_minutes: kickback,
        })
    }

    /// All entries in day order.
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// The entry for a zero-based day index.
    pub fn entry_for_day(&self, day: u32) -> Option<&ScheduleEntry> {
        usize::try_from(day).ok().and_then(|i| self.entries.get(i))
    }

    /// Number of days in the cycle.
    pub fn cycle_days(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }

    /// Phase shown on day 0.
    pub const fn start_phase(&self) -> LunarPhase {
        self.start_phase
    }

    /// Per-day rise/set drift in minutes.
    pub const fn kickback_minutes(&self) -> f64 {
        self.kickback_minutes
    }

    /// Day indices that fall on a New Moon.
    pub fn new_moon_days(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|e| e.phase == LunarPhase::NewMoon)
            .map(|e| e.day)
    }
}

/// Per-day drift in minutes for a cycle of `total_days`.
pub fn kickback_minutes(total_days: u32) -> f64 {
    REFERENCE_DAILY_DRIFT_MINUTES / (f64::from(total_days) / DRIFT_REFERENCE_CYCLE_DAYS)
}

/// Triangular phase-angle wave anchored on the canonical New Moon day.
///
/// 180 on canonical day 0, falling linearly to 0 on `new_moon_day`, then
/// rising linearly back to 180 at `total_days`. Days past the end of the
/// cycle are clamped to `total_days`.
pub fn phase_angle(day: u32, total_days: u32, new_moon_day: u32) -> f64 {
    if total_days == 0 {
        return 0.0;
    }
    let day = day.min(total_days);
    let new_moon_day = new_moon_day.min(total_days.saturating_sub(1));

    if day <= new_moon_day {
        if new_moon_day == 0 {
            return 0.0;
        }
        180.0 * (1.0 - f64::from(day) / f64::from(new_moon_day))
    } else {
        let waxed = day.saturating_sub(new_moon_day);
        let span = total_days.saturating_sub(new_moon_day);
        180.0 * f64::from(waxed) / f64::from(span)
    }
}

/// Moonrise and moonset for a non-New-Moon day.
fn rise_and_set(day: u32, last_new_moon: Option<u32>, kickback: f64) -> (ClockTime, ClockTime) {
    let sunset_minutes = i64::from(SUNSET_HOUR.saturating_mul(60));
    let sunset = ClockTime::from_minutes_wrapping(sunset_minutes);
    match last_new_moon {
        None => {
            let rise = ClockTime::from_minutes_wrapping(
                sunset_minutes.saturating_add(drift_minutes(day, kickback)),
            );
            let set = ClockTime::from_minutes_wrapping(i64::from(SUNRISE_HOUR.saturating_mul(60)));
            (rise, set)
        }
        Some(new_moon_day) => {
            let since = day.saturating_sub(new_moon_day);
            let set = ClockTime::from_minutes_wrapping(
                sunset_minutes.saturating_add(drift_minutes(since, kickback)),
            );
            (sunset, set)
        }
    }
}

/// `days * kickback`, rounded to the nearest minute.
fn drift_minutes(days: u32, kickback: f64) -> i64 {
    let minutes = (f64::from(days) * kickback).round();
    // Saturating float-to-int cast; drift never approaches i64 range.
    #[allow(clippy::cast_possible_truncation)]
    let whole = minutes as i64;
    whole
}

/// Seconds from `rise` to `set`, wrapping past midnight when `set <= rise`.
fn visibility_seconds(rise: ClockTime, set: ClockTime) -> u32 {
    let rise_s = rise.minutes_since_midnight().saturating_mul(60);
    let set_s = set.minutes_since_midnight().saturating_mul(60);
    if set_s <= rise_s {
        set_s.saturating_add(SECONDS_PER_DAY).saturating_sub(rise_s)
    } else {
        set_s.saturating_sub(rise_s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn time(hour: u32, minute: u32) -> ClockTime {
        ClockTime::new(hour, minute).unwrap()
    }

    #[test]
    fn canonical_schedule_has_28_entries_and_one_new_moon() {
        let schedule = Schedule::build(28.0, None).unwrap();
        assert_eq!(schedule.entries().len(), 28);
        assert_eq!(schedule.cycle_days(), 28);

        let new_moons: Vec<u32> = schedule.new_moon_days().collect();
        assert_eq!(new_moons, vec![14]);

        let new_moon = schedule.entry_for_day(14).unwrap();
        assert_eq!(new_moon.moonrise, None);
        assert_eq!(new_moon.moonset, None);
        assert_eq!(new_moon.visibility_seconds, 0);

        let after = schedule.entry_for_day(15).unwrap();
        assert_eq!(after.moonrise, Some(time(18, 0)));
    }

    #[test]
    fn days_are_consecutive_from_zero() {
        let schedule = Schedule::build(45.0, None).unwrap();
        for (i, entry) in schedule.entries().iter().enumerate() {
            assert_eq!(usize::try_from(entry.day).unwrap(), i);
        }
    }

    #[test]
    fn rise_and_set_present_unless_new_moon() {
        let schedule = Schedule::build(40.0, Some(LunarPhase::WaxingCrescent)).unwrap();
        for entry in schedule.entries() {
            let is_new = entry.phase == LunarPhase::NewMoon;
            assert_eq!(entry.moonrise.is_none(), is_new);
            assert_eq!(entry.moonset.is_none(), is_new);
        }
    }

    #[test]
    fn pre_new_moon_rise_drifts_and_set_is_pinned() {
        let schedule = Schedule::build(28.0, None).unwrap();
        let kick = schedule.kickback_minutes();

        let day0 = schedule.entry_for_day(0).unwrap();
        assert_eq!(day0.moonrise, Some(time(18, 0)));
        assert_eq!(day0.moonset, Some(time(6, 0)));
        assert_eq!(day0.visibility_seconds, 12 * 3600);

        let day1 = schedule.entry_for_day(1).unwrap();
        #[allow(clippy::cast_possible_truncation)]
        let expected = 18 * 60 + kick.round() as i64;
        assert_eq!(day1.moonrise, Some(ClockTime::from_minutes_wrapping(expected)));
        assert_eq!(day1.moonset, Some(time(6, 0)));
    }

    #[test]
    fn post_new_moon_set_drifts_from_sunset() {
        let schedule = Schedule::build(28.0, None).unwrap();
        // kickback for 28 days is ~50.86 minutes.
        let day15 = schedule.entry_for_day(15).unwrap();
        assert_eq!(day15.moonrise, Some(time(18, 0)));
        assert_eq!(day15.moonset, Some(time(18, 51)));
        assert_eq!(day15.visibility_seconds, 51 * 60);
    }

    #[test]
    fn kickback_scales_inversely_with_cycle_length() {
        let reference = kickback_minutes(28);
        let half = kickback_minutes(14);
        assert!((half - 2.0 * reference).abs() < 1e-9);
        assert!((kickback_minutes(59) - REFERENCE_DAILY_DRIFT_MINUTES / 2.0).abs() < 1e-9);
    }

    #[test]
    fn phase_angle_is_triangular() {
        let schedule = Schedule::build(28.0, None).unwrap();
        let angles: Vec<f64> = schedule.entries().iter().map(|e| e.phase_angle).collect();

        assert_eq!(angles.first().copied(), Some(180.0));
        assert!(angles.get(14).unwrap().abs() < 1e-9);

        // Single maximum of 180, symmetric around the New Moon.
        let max_count = angles.iter().filter(|a| (**a - 180.0).abs() < 1e-9).count();
        assert_eq!(max_count, 1);
        for k in 1..14_usize {
            let before = angles.get(14 - k).unwrap();
            let after = angles.get(14 + k).unwrap();
            assert!((before - after).abs() < 1e-9, "asymmetric at offset {k}");
        }
        for a in &angles {
            assert!((0.0..=180.0).contains(a));
        }
    }

    #[test]
    fn phase_angle_clamps_out_of_range_days() {
        assert_eq!(phase_angle(40, 28, 14), phase_angle(28, 28, 14));
        assert_eq!(phase_angle(28, 28, 14), 180.0);
        assert_eq!(phase_angle(3, 0, 0), 0.0);
    }

    #[test]
    fn new_moon_angle_is_zero_at_every_length() {
        for length in [2.0, 5.0, 14.0, 29.0, 30.0, 45.0, 60.0, 100.0] {
            for start in [None, Some(LunarPhase::FirstQuarter), Some(LunarPhase::NewMoon)] {
                let schedule = Schedule::build(length, start).unwrap();
                let new_moon = schedule
                    .entries()
                    .iter()
                    .find(|e| e.phase == LunarPhase::NewMoon)
                    .unwrap();
                assert!(
                    new_moon.phase_angle.abs() < 1e-9,
                    "{length} days from {start:?}: New Moon at {}",
                    new_moon.phase_angle
                );

                let peaks: Vec<LunarPhase> = schedule
                    .entries()
                    .iter()
                    .filter(|e| (e.phase_angle - 180.0).abs() < 1e-9)
                    .map(|e| e.phase)
                    .collect();
                assert_eq!(peaks, vec![LunarPhase::FullMoon], "{length} days from {start:?}");

                for entry in schedule.entries() {
                    assert!((0.0..=180.0).contains(&entry.phase_angle));
                }
            }
        }
    }

    #[test]
    fn single_day_cycle_is_a_dark_new_moon() {
        let schedule = Schedule::build(1.0, None).unwrap();
        let only = schedule.entry_for_day(0).unwrap();
        assert_eq!(only.phase, LunarPhase::NewMoon);
        assert_eq!(only.phase_angle, 0.0);
    }

    #[test]
    fn start_phase_rotates_sequence() {
        let schedule = Schedule::build(28.0, Some(LunarPhase::NewMoon)).unwrap();
        let first = schedule.entry_for_day(0).unwrap();
        assert_eq!(first.phase, LunarPhase::NewMoon);
        assert_eq!(first.moonrise, None);
        // Phase angle follows the phase, not the rotated day index.
        assert!(first.phase_angle.abs() < 1e-9);

        let last = schedule.entries().last().unwrap();
        assert_eq!(last.phase, LunarPhase::WaningCrescent);

        // Everything after the New Moon on day 0 rises at sunset.
        for entry in schedule.entries().iter().skip(1) {
            assert_eq!(entry.moonrise, Some(time(18, 0)));
        }
    }

    #[test]
    fn rotation_preserves_phase_multiset() {
        let canonical = Schedule::build(33.0, None).unwrap();
        let rotated = Schedule::build(33.0, Some(LunarPhase::FirstQuarter)).unwrap();
        for phase in LunarPhase::ALL {
            let a = canonical.entries().iter().filter(|e| e.phase == phase).count();
            let b = rotated.entries().iter().filter(|e| e.phase == phase).count();
            assert_eq!(a, b, "{phase}");
        }
        assert_eq!(rotated.start_phase(), LunarPhase::FirstQuarter);
    }

    #[test]
    fn missing_start_phase_falls_back_to_canonical_order() {
        // At 4 days every elastic phase is empty.
        let schedule = Schedule::build(4.0, Some(LunarPhase::WaxingGibbous)).unwrap();
        assert_eq!(schedule.entry_for_day(0).unwrap().phase, LunarPhase::FullMoon);
    }

    #[test]
    fn invalid_length_is_rejected() {
        assert!(matches!(
            Schedule::build(0.2, None),
            Err(ScheduleError::Scale { .. })
        ));
    }
}
