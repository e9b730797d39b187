//! Feeder triggers and motion programs.
//!
//! The feeder fires on minute-resolution clock matches. In the default
//! mode it follows simulated time (`feed_start` drops, `feed_end` shakes
//! and resets); with `independent_timer` set it follows the real wall
//! clock instead (`drop_at` drops, `end_at` returns to rest).
//!
//! The tick loop may run many ticks inside one matching minute, so each
//! trigger matches at most once per matching minute. The guard remembers
//! the minute it last matched in and re-arms once the clock leaves it.
//!
//! A matched action stays pending until the tick loop reports it
//! dispatched with [`FeederTrigger::mark_fired`], so a feeder that is
//! still moving delays the action instead of dropping it. A later match
//! replaces an action that is still pending.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use lunar_core::config::FeederSchedule;
use lunar_types::{ClockTime, FeederAction};

use crate::motion::Sweep;

/// Feeder angle at rest.
pub const REST_ANGLE: f64 = 25.0;

/// Feeder angle with the tray tipped.
pub const DROP_ANGLE: f64 = 120.0;

/// Turning point of the shake.
pub const SHAKE_ANGLE: f64 = 80.0;

/// Step size used while shaking.
pub const SHAKE_STEP_DEGREES: f64 = 5.0;

/// Decides when the feeder fires.
#[derive(Debug, Clone)]
pub struct FeederTrigger {
    schedule: FeederSchedule,
    matched_in: Option<(NaiveDate, ClockTime)>,
    pending: Option<FeederAction>,
}

impl FeederTrigger {
    /// Create a trigger for `schedule`, armed.
    pub const fn new(schedule: FeederSchedule) -> Self {
        Self {
            schedule,
            matched_in: None,
            pending: None,
        }
    }

    /// Whether this trigger follows the wall clock.
    pub const fn is_independent(&self) -> bool {
        self.schedule.independent_timer
    }

    /// The action to fire at this tick, if any: a new match, or an
    /// earlier one that has not been dispatched yet.
    ///
    /// `sim_time` is the tick's simulated time and `real_time` the
    /// (monotonic-clamped) wall-clock time; only one of them is consulted,
    /// depending on the mode.
    pub fn due(&mut self, sim_time: NaiveDateTime, real_time: NaiveDateTime) -> Option<FeederAction> {
        let now = if self.schedule.independent_timer {
            real_time
        } else {
            sim_time
        };
        let minute = (now.date(), ClockTime::of(now));

        if self.matched_in != Some(minute) {
            self.matched_in = None;
            if let Some(action) = self.action_at(minute.1) {
                self.matched_in = Some(minute);
                self.pending = Some(action);
            }
        }
        self.pending
    }

    /// Record that the action last returned by [`Self::due`] was
    /// dispatched.
    pub const fn mark_fired(&mut self) {
        self.pending = None;
    }

    fn action_at(&self, time: ClockTime) -> Option<FeederAction> {
        let s = &self.schedule;
        if s.independent_timer {
            if time == s.drop_at {
                Some(FeederAction::Drop)
            } else if time == s.end_at {
                Some(FeederAction::ReturnAndReset)
            } else {
                None
            }
        } else if time == s.feed_start {
            Some(FeederAction::Drop)
        } else if time == s.feed_end {
            Some(FeederAction::ShakeAndReset)
        } else {
            None
        }
    }
}

/// The motion program for `action`.
pub fn program(action: FeederAction, step_degrees: f64, step_delay: Duration) -> Vec<Sweep> {
    match action {
        FeederAction::Drop => vec![Sweep::to(DROP_ANGLE, step_degrees, step_delay)],
        FeederAction::ShakeAndReset => vec![
            Sweep::to(SHAKE_ANGLE, SHAKE_STEP_DEGREES, step_delay),
            Sweep::to(DROP_ANGLE, SHAKE_STEP_DEGREES, step_delay),
            Sweep::to(REST_ANGLE, step_degrees, step_delay),
        ],
        FeederAction::ReturnAndReset => {
            vec![Sweep::to(REST_ANGLE, step_degrees, step_delay).starting_at(DROP_ANGLE)]
        }
        FeederAction::Reset => vec![Sweep::to(REST_ANGLE, step_degrees, step_delay)],
    }
}
