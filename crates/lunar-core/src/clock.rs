//! Simulated clock: maps real time to simulated time.
//!
//! Two views of the same mapping are provided:
//!
//! - [`SimulationClock::simulated_time_after`] is the pure mapping from
//!   elapsed wall-clock time to simulated time,
//!   `cycle_start + elapsed * speed_factor * (24h / real_seconds_per_sim_day)`.
//! - [`SimulationClock::tick_time`] is what the scheduler loop actually
//!   uses. Simulated time advances by exactly `tick_minutes` per loop
//!   iteration and the loop sleeps [`SimulationClock::tick_interval`]
//!   between iterations, so simulated time is a function of the iteration
//!   count and does not accumulate sampling drift.
//!
//! # Design Principles
//!
//! - The clock holds only its start reference and rates; it never mutates.
//! - Simulated time never goes backward. Negative elapsed time clamps to
//!   the cycle start; wall-clock jumps are clamped by [`MonotonicGuard`].

use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::warn;

/// Seconds in one simulated day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Minutes in one simulated day.
pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Errors that can occur when constructing a clock.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// A rate or tick size is zero, negative, or not finite.
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Maps wall-clock time and loop iterations to simulated time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationClock {
    /// Simulated instant at which the cycle begins.
    cycle_start: NaiveDateTime,
    /// Playback speed multiplier.
    speed_factor: f64,
    /// Real seconds that make up one simulated day at speed 1.
    real_seconds_per_sim_day: f64,
    /// Simulated minutes advanced per loop iteration.
    tick_minutes: f64,
}

impl SimulationClock {
    /// Create a clock.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] unless all three rates are
    /// finite and strictly positive.
    pub fn new(
        cycle_start: NaiveDateTime,
        speed_factor: f64,
        real_seconds_per_sim_day: f64,
        tick_minutes: f64,
    ) -> Result<Self, ClockError> {
        for (name, value) in [
            ("speed_factor", speed_factor),
            ("real_seconds_per_sim_day", real_seconds_per_sim_day),
            ("tick_minutes", tick_minutes),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ClockError::InvalidConfig {
                    reason: format!("{name} must be a positive number, got {value}"),
                });
            }
        }
        Ok(Self {
            cycle_start,
            speed_factor,
            real_seconds_per_sim_day,
            tick_minutes,
        })
    }

    /// Simulated instant at which the cycle begins.
    pub const fn cycle_start(&self) -> NaiveDateTime {
        self.cycle_start
    }

    /// Playback speed multiplier.
    pub const fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    /// Real seconds per simulated day at speed 1.
    pub const fn real_seconds_per_sim_day(&self) -> f64 {
        self.real_seconds_per_sim_day
    }

    /// Simulated minutes per tick.
    pub const fn tick_minutes(&self) -> f64 {
        self.tick_minutes
    }

    /// Simulated seconds that pass per real second.
    pub fn rate(&self) -> f64 {
        self.speed_factor * (SECONDS_PER_DAY / self.real_seconds_per_sim_day)
    }

    /// Simulated time after `real_elapsed` wall-clock time.
    ///
    /// Negative elapsed time (a wall clock that jumped backward past the
    /// start) clamps to the cycle start.
    pub fn simulated_time_after(&self, real_elapsed: TimeDelta) -> NaiveDateTime {
        if real_elapsed < TimeDelta::zero() {
            warn!(
                elapsed_ms = real_elapsed.num_milliseconds(),
                "Negative real elapsed time, clamping to cycle start"
            );
            return self.cycle_start;
        }
        let real_seconds = duration_seconds(real_elapsed);
        self.cycle_start
            .checked_add_signed(delta_from_seconds(real_seconds * self.rate()))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Simulated time at the start of loop iteration `tick` (0-based).
    pub fn tick_time(&self, tick: u64) -> NaiveDateTime {
        #[allow(clippy::cast_precision_loss)]
        let minutes = tick as f64 * self.tick_minutes;
        self.cycle_start
            .checked_add_signed(delta_from_seconds(minutes * 60.0))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Real time to sleep between loop iterations:
    /// `tick_minutes * (real_seconds_per_sim_day / 1440) / speed_factor`.
    pub fn tick_interval(&self) -> Duration {
        let seconds =
            self.tick_minutes * (self.real_seconds_per_sim_day / MINUTES_PER_DAY) / self.speed_factor;
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// Number of loop iterations in one simulated day.
    pub fn ticks_per_sim_day(&self) -> f64 {
        MINUTES_PER_DAY / self.tick_minutes
    }

    /// Simulated instant at which a cycle of `cycle_days` ends.
    pub fn cycle_end(&self, cycle_days: u32) -> NaiveDateTime {
        self.cycle_start
            .checked_add_signed(TimeDelta::days(i64::from(cycle_days)))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Percentage of a `cycle_days` cycle completed at `sim_time`, clamped
    /// to `[0, 100]`.
    pub fn progress_pct(&self, sim_time: NaiveDateTime, cycle_days: u32) -> f64 {
        if cycle_days == 0 {
            return 100.0;
        }
        let elapsed = duration_seconds(sim_time.signed_duration_since(self.cycle_start));
        let total = f64::from(cycle_days) * SECONDS_PER_DAY;
        (elapsed / total * 100.0).clamp(0.0, 100.0)
    }
}

/// Clamps a sampled wall clock so it never moves backward.
///
/// Used where the scheduler reads real time directly (independent feeder
/// timers). A backward jump is a `ClockAnomaly`: logged, then the last
/// value is reused.
#[derive(Debug, Clone, Default)]
pub struct MonotonicGuard {
    last: Option<NaiveDateTime>,
}

impl MonotonicGuard {
    /// Create a guard with no history.
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Accept `sample`, or return the previous value if `sample` is older.
    pub fn observe(&mut self, sample: NaiveDateTime) -> NaiveDateTime {
        match self.last {
            Some(last) if sample < last => {
                warn!(
                    sample = %sample,
                    last = %last,
                    "Wall clock moved backward, holding last value"
                );
                last
            }
            _ => {
                self.last = Some(sample);
                sample
            }
        }
    }

    /// The most recent accepted value.
    pub const fn last(&self) -> Option<NaiveDateTime> {
        self.last
    }
}

/// Fractional seconds in a [`TimeDelta`].
fn duration_seconds(delta: TimeDelta) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = delta.num_milliseconds() as f64;
    millis / 1000.0
}

/// A [`TimeDelta`] of `seconds`, rounded to the millisecond and saturated.
fn delta_from_seconds(seconds: f64) -> TimeDelta {
    // Float-to-int casts saturate; out-of-range values hit the checked
    // add and saturate there.
    #[allow(clippy::cast_possible_truncation)]
    let millis = (seconds * 1000.0).round() as i64;
    TimeDelta::try_milliseconds(millis).unwrap_or(TimeDelta::MAX)
}
