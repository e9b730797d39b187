//! Sky position: what is up at a simulated instant, and how high.
//!
//! During the fixed daytime window the sun is up and the arm points at the
//! zenith. At night the schedule entry whose moon window contains the
//! instant drives the arm along a cosine easing curve:
//!
//! ```text
//! arm_angle = 90 * (1 - cos(pi * progress))      progress in [0, 1]
//! altitude  = 90 - |arm_angle - 90|              0 at both horizons
//! ```
//!
//! `arm_angle` sweeps the full `[0, 180]` servo range from the rising
//! horizon to the setting horizon; `altitude` folds it back to elevation
//! above the horizon, `[0, 90]`.
//!
//! Moon windows are anchored to the entry's calendar day
//! (`cycle_start_date + day`). A moonrise earlier than the sunset hour has
//! drifted past midnight and belongs to the following calendar day; a
//! moonset at or before the moonrise wraps to the day after the rise.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use lunar_types::{ClockTime, LunarPhase, ScheduleEntry, SkyState};

use crate::schedule::{SUNRISE_HOUR, SUNSET_HOUR, Schedule};

/// Arm angle while the sun is up.
pub const ZENITH_DEGREES: f64 = 90.0;

/// Resolved sky state for one simulated instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// What occupies the sky.
    pub sky: SkyState,
    /// Elevation above the horizon in degrees, `[0, 90]`.
    pub altitude: f64,
    /// Servo target for the arm in degrees, `[0, 180]`.
    pub arm_angle: f64,
    /// Phase angle of the visible moon, 0 when none is visible.
    pub phase_angle: f64,
    /// Schedule day whose night contains this instant; `None` in daylight
    /// or outside the cycle.
    pub night_of: Option<u32>,
}

impl Position {
    const fn daylight() -> Self {
        Self {
            sky: SkyState::Daylight,
            altitude: ZENITH_DEGREES,
            arm_angle: ZENITH_DEGREES,
            phase_angle: 0.0,
            night_of: None,
        }
    }

    const fn moon_absent(night_of: Option<u32>) -> Self {
        Self {
            sky: SkyState::MoonAbsent,
            altitude: 0.0,
            arm_angle: 0.0,
            phase_angle: 0.0,
            night_of,
        }
    }
}

/// Whether `t` falls in the daytime window `[sunrise, sunset)`.
pub fn is_daytime(t: NaiveDateTime) -> bool {
    (SUNRISE_HOUR..SUNSET_HOUR).contains(&t.hour())
}

/// Absolute moonrise and moonset for `entry`, or `None` on a New Moon.
pub fn entry_window(
    entry: &ScheduleEntry,
    cycle_start_date: NaiveDate,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let (rise, set) = entry.window()?;
    let entry_date = cycle_start_date.checked_add_signed(TimeDelta::days(i64::from(entry.day)))?;

    let mut rise_at = entry_date.and_time(rise.to_naive_time());
    if rise.hour() < SUNSET_HOUR {
        rise_at = rise_at.checked_add_signed(TimeDelta::days(1))?;
    }
    let mut set_at = rise_at.date().and_time(set.to_naive_time());
    if set_at <= rise_at {
        set_at = set_at.checked_add_signed(TimeDelta::days(1))?;
    }
    Some((rise_at, set_at))
}

/// The entry whose moon window `[rise, set)` contains `t`.
pub fn find_entry<'a>(
    schedule: &'a Schedule,
    cycle_start_date: NaiveDate,
    t: NaiveDateTime,
) -> Option<&'a ScheduleEntry> {
    schedule.entries().iter().find(|entry| {
        entry_window(entry, cycle_start_date).is_some_and(|(rise, set)| rise <= t && t < set)
    })
}

/// Schedule day whose night (sunset to the following sunrise) contains `t`.
pub fn night_of(schedule: &Schedule, cycle_start_date: NaiveDate, t: NaiveDateTime) -> Option<u32> {
    if is_daytime(t) {
        return None;
    }
    let mut date = t.date();
    if t.hour() < SUNRISE_HOUR {
        date = date.pred_opt()?;
    }
    let day = u32::try_from(date.signed_duration_since(cycle_start_date).num_days()).ok()?;
    schedule.entry_for_day(day).map(|entry| entry.day)
}

/// Arm angle for a given progress through the moon window, `[0, 180]`.
pub fn arm_angle_for_progress(progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    90.0 * (1.0 - (core::f64::consts::PI * p).cos())
}

/// Elevation above the horizon for an arm angle, `[0, 90]`.
pub fn altitude_for_arm_angle(arm_angle: f64) -> f64 {
    (ZENITH_DEGREES - (arm_angle - ZENITH_DEGREES).abs()).max(0.0)
}

/// Resolve the sky at simulated instant `t`.
pub fn resolve(schedule: &Schedule, cycle_start: NaiveDateTime, t: NaiveDateTime) -> Position {
    if is_daytime(t) {
        return Position::daylight();
    }

    let start_date = cycle_start.date();
    let night = night_of(schedule, start_date, t);

    let Some(entry) = find_entry(schedule, start_date, t) else {
        return Position::moon_absent(night);
    };
    if entry.phase == LunarPhase::NewMoon {
        return Position::moon_absent(night);
    }
    let Some(progress) = window_progress(entry, start_date, t) else {
        return Position::moon_absent(night);
    };

    let arm_angle = arm_angle_for_progress(progress);
    Position {
        sky: SkyState::Moon(entry.phase),
        altitude: altitude_for_arm_angle(arm_angle),
        arm_angle,
        phase_angle: entry.phase_angle,
        night_of: night.or(Some(entry.day)),
    }
}

/// Arm angle samples across one entry's moon window, from moonrise to
/// moonset inclusive, every `interval`.
///
/// Returns an empty curve for a New Moon or a non-positive interval.
pub fn altitude_samples(
    entry: &ScheduleEntry,
    cycle_start_date: NaiveDate,
    interval: TimeDelta,
) -> Vec<(NaiveDateTime, f64)> {
    let mut samples = Vec::new();
    if interval <= TimeDelta::zero() {
        return samples;
    }
    let Some((rise, set)) = entry_window(entry, cycle_start_date) else {
        return samples;
    };

    let mut t = rise;
    while t <= set {
        let progress = window_progress(entry, cycle_start_date, t).unwrap_or(1.0);
        samples.push((t, arm_angle_for_progress(progress)));
        match t.checked_add_signed(interval) {
            Some(next) => t = next,
            None => break,
        }
    }
    if samples.last().is_some_and(|(last, _)| *last < set) {
        samples.push((set, arm_angle_for_progress(1.0)));
    }
    samples
}

/// `(t - rise) / (set - rise)` for `entry`, or `None` outside the window.
fn window_progress(entry: &ScheduleEntry, cycle_start_date: NaiveDate, t: NaiveDateTime) -> Option<f64> {
    let (rise, set) = entry_window(entry, cycle_start_date)?;
    if t < rise || t > set {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let since_rise = t.signed_duration_since(rise).num_seconds() as f64;
    #[allow(clippy::cast_precision_loss)]
    let total = set.signed_duration_since(rise).num_seconds() as f64;
    if total <= 0.0 {
        return None;
    }
    Some(since_rise / total)
}

/// `time` on calendar `date`.
pub fn on_date(date: NaiveDate, time: ClockTime) -> NaiveDateTime {
    date.and_time(time.to_naive_time())
}
