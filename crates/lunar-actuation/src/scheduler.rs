//! The actuation scheduler: the real-time tick loop.
//!
//! Each iteration:
//!
//! 1. Check for a stop request and for the end of the cycle.
//! 2. Compute the tick's simulated time (`cycle_start + tick * tick_minutes`).
//! 3. Resolve the sky and, if the arm is idle and off target, dispatch a
//!    sweep toward the sun (90), the moon (its arm angle) or rest (0).
//! 4. Push a display frame on a day/night transition.
//! 5. Fire the feeder if a trigger minute matches, or retry an action
//!    held back by a busy feeder.
//! 6. Publish the status and sleep one tick interval.
//!
//! The loop never waits on a worker. A motion in flight when the regime
//! changes is left to finish; the next idle tick retargets. On exit the
//! loop joins every worker, then parks the arm at 0 and the feeder at
//! rest.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDateTime;
use lunar_core::clock::{MonotonicGuard, SimulationClock};
use lunar_core::config::ValidatedConfig;
use lunar_core::position::{self, ZENITH_DEGREES};
use lunar_core::schedule::Schedule;
use lunar_types::{FeederAction, RunId, SharedStatus, SkyState};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::display::DisplayUpdater;
use crate::feeder::{self, FeederTrigger, REST_ANGLE};
use crate::hardware::Hardware;
use crate::motion::{Actuator, MIN_ANGLE, MotionState, Sweep};
use crate::status::StatusHandle;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Simulated time reached `cycle_start + cycle_days`.
    CycleComplete,
    /// A stop was requested.
    Stopped,
}

/// Result of one run of the tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// The run this outcome belongs to.
    pub run_id: RunId,
    /// Why the loop exited.
    pub end_reason: EndReason,
    /// Ticks executed.
    pub ticks: u64,
    /// Simulated time of the last executed tick.
    pub last_sim_time: Option<NaiveDateTime>,
}

/// Source of real local time.
pub trait WallClock: Send + Sync {
    /// The current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// The system's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Cooperative stop signal shared between a run and its controller.
#[derive(Debug, Default)]
pub struct RunControl {
    stop_requested: AtomicBool,
    wake: Notify,
}

impl RunControl {
    /// Create a control with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop at the next tick boundary.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, returning early on a stop request.
    async fn sleep(&self, duration: std::time::Duration) {
        if self.is_stop_requested() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = self.wake.notified() => {}
        }
    }
}

/// Everything one run needs, fixed at start.
pub struct Scheduler {
    run_id: RunId,
    config: ValidatedConfig,
    schedule: Schedule,
    clock: SimulationClock,
    hardware: Hardware,
    status: StatusHandle,
    wall: Arc<dyn WallClock>,
}

impl Scheduler {
    /// Assemble a run. The schedule and clock must come from `config`.
    pub fn new(
        config: ValidatedConfig,
        schedule: Schedule,
        clock: SimulationClock,
        hardware: Hardware,
        status: StatusHandle,
        wall: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            config,
            schedule,
            clock,
            hardware,
            status,
            wall,
        }
    }

    /// Identifier of this run.
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Run the tick loop until the cycle completes or `control` asks to
    /// stop, then park both actuators.
    #[allow(clippy::too_many_lines)]
    pub async fn run(self, control: Arc<RunControl>) -> RunOutcome {
        let Self {
            run_id,
            config,
            schedule,
            clock,
            hardware,
            status,
            wall,
        } = self;

        let motion = config.motion;
        let cycle_days = schedule.cycle_days();
        let cycle_end = clock.cycle_end(cycle_days);
        let interval = clock.tick_interval();

        let mut arm = Actuator::new("arm", Arc::clone(&hardware.arm), MIN_ANGLE);
        let mut feeder_arm = Actuator::new("feeder", Arc::clone(&hardware.feeder), REST_ANGLE);
        let mut display = DisplayUpdater::new(Arc::clone(&hardware.display), config.night_color);
        let mut trigger = FeederTrigger::new(config.feeder);
        let mut wall_guard = MonotonicGuard::new();

        info!(
            run_id = %run_id,
            cycle_days,
            start_phase = %schedule.start_phase(),
            cycle_start = %clock.cycle_start(),
            tick_minutes = clock.tick_minutes(),
            tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Lunar cycle starting"
        );

        status
            .update(|s| {
                *s = SharedStatus {
                    run_id: Some(run_id),
                    running: true,
                    servo_angle: arm.current_angle(),
                    feeder_angle: feeder_arm.current_angle(),
                    ..SharedStatus::default()
                };
            })
            .await;

        let mut tick: u64 = 0;
        let mut last_sim_time = None;

        let end_reason = loop {
            if control.is_stop_requested() {
                info!(run_id = %run_id, tick, "Stop requested");
                break EndReason::Stopped;
            }

            let sim_time = clock.tick_time(tick);
            if sim_time >= cycle_end {
                info!(run_id = %run_id, tick, sim_time = %sim_time, "Cycle complete");
                break EndReason::CycleComplete;
            }

            let pos = position::resolve(&schedule, clock.cycle_start(), sim_time);

            // --- Arm ---
            if arm.poll() == MotionState::Idle {
                let (target, delay) = match pos.sky {
                    SkyState::Daylight => (ZENITH_DEGREES, motion.sun_step_delay),
                    SkyState::Moon(_) => (pos.arm_angle, motion.moon_step_delay),
                    SkyState::MoonAbsent => (MIN_ANGLE, motion.rest_step_delay),
                };
                if arm.needs_move(target, motion.step_degrees) {
                    arm.dispatch(Sweep::to(target, motion.step_degrees, delay));
                    debug!(run_id = %run_id, sim_time = %sim_time, target, sky = ?pos.sky, "Arm retargeted");
                }
            }

            // --- Display ---
            display.update(&pos, &schedule);

            // --- Feeder ---
            let real_time = wall_guard.observe(wall.now());
            if let Some(action) = trigger.due(sim_time, real_time) {
                let program =
                    feeder::program(action, motion.step_degrees, motion.feeder_step_delay);
                if feeder_arm.run_program(program) {
                    trigger.mark_fired();
                    info!(
                        run_id = %run_id,
                        action = ?action,
                        sim_time = %sim_time,
                        real_time = %real_time,
                        independent = trigger.is_independent(),
                        "Feeder fired"
                    );
                } else {
                    debug!(run_id = %run_id, action = ?action, "Feeder busy, action held");
                }
            }

            // --- Status ---
            let progress_pct = clock.progress_pct(sim_time, cycle_days);
            let servo_angle = arm.current_angle();
            let feeder_angle = feeder_arm.current_angle();
            status.try_update(|s| {
                s.tick = tick;
                s.sim_time = Some(sim_time);
                s.progress_pct = progress_pct;
                s.sky = pos.sky;
                s.phase_angle = pos.phase_angle;
                s.altitude = pos.altitude;
                s.servo_angle = servo_angle;
                s.feeder_angle = feeder_angle;
            });

            debug!(
                run_id = %run_id,
                tick,
                sim_time = %sim_time,
                sky = ?pos.sky,
                altitude = pos.altitude,
                progress_pct,
                "Tick"
            );

            last_sim_time = Some(sim_time);
            tick = tick.saturating_add(1);
            control.sleep(interval).await;
        };

        // --- Final reset ---
        display.join().await;
        feeder_arm.join().await;
        arm.join().await;
        arm.run_to_completion(vec![Sweep::to(
            MIN_ANGLE,
            motion.step_degrees,
            motion.rest_step_delay,
        )])
        .await;
        feeder_arm
            .run_to_completion(feeder::program(
                FeederAction::Reset,
                motion.step_degrees,
                motion.feeder_step_delay,
            ))
            .await;

        let servo_angle = arm.current_angle();
        let feeder_angle = feeder_arm.current_angle();
        status
            .update(|s| {
                s.running = false;
                s.servo_angle = servo_angle;
                s.feeder_angle = feeder_angle;
            })
            .await;

        info!(
            run_id = %run_id,
            reason = ?end_reason,
            ticks = tick,
            servo_angle,
            feeder_angle,
            "Lunar cycle ended"
        );

        RunOutcome {
            run_id,
            end_reason,
            ticks: tick,
            last_sim_time,
        }
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("run_id", &self.run_id)
            .field("cycle_days", &self.schedule.cycle_days())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use lunar_core::config::SimulationConfig;
    use lunar_types::{DisplayFrame, LunarPhase, Rgb};

    use super::*;
    use crate::hardware::{DisplayPanel, HardwareError, ServoDriver};

    #[derive(Default)]
    struct Servo {
        angles: Mutex<Vec<f64>>,
    }

    impl ServoDriver for Servo {
        fn set_angle(&self, angle: f64) -> Result<f64, HardwareError> {
            self.angles.lock().unwrap().push(angle);
            Ok(0.0)
        }
    }

    #[derive(Default)]
    struct Panel {
        frames: Mutex<Vec<DisplayFrame>>,
    }

    impl DisplayPanel for Panel {
        fn show(&self, frame: DisplayFrame) -> Result<(), HardwareError> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    struct FixedClock(NaiveDateTime);

    impl WallClock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn scheduler(yaml: &str, arm: Arc<Servo>, feeder: Arc<Servo>, panel: Arc<Panel>) -> Scheduler {
        let config = SimulationConfig::parse(yaml).unwrap().validate().unwrap();
        let schedule =
            Schedule::build(f64::from(config.cycle_days), Some(config.start_phase)).unwrap();
        let cycle_start = noon().date().and_time(config.start_time.to_naive_time());
        let clock = SimulationClock::new(
            cycle_start,
            config.speed_factor,
            config.real_seconds_per_sim_day,
            config.tick_minutes,
        )
        .unwrap();
        Scheduler::new(
            config,
            schedule,
            clock,
            Hardware {
                arm,
                feeder,
                display: panel,
            },
            StatusHandle::new(),
            Arc::new(FixedClock(noon())),
        )
    }

    const FAST: &str = "
cycle:
  length_days: 2
clock:
  speed_factor: 1440
  tick_minutes: 10
display:
  night_color: null
motion:
  sun_step_delay_ms: 1
  moon_step_delay_ms: 1
  rest_step_delay_ms: 1
  feeder_step_delay_ms: 1
";

    #[tokio::test(start_paused = true)]
    async fn runs_to_cycle_end_and_parks() {
        let arm = Arc::new(Servo::default());
        let feeder = Arc::new(Servo::default());
        let panel = Arc::new(Panel::default());
        let sched = scheduler(FAST, arm.clone(), feeder.clone(), panel.clone());
        let status = sched.status.clone();

        let outcome = sched.run(Arc::new(RunControl::new())).await;

        assert_eq!(outcome.end_reason, EndReason::CycleComplete);
        // Two days of ten-minute ticks.
        assert_eq!(outcome.ticks, 2 * 144);

        assert_eq!(arm.angles.lock().unwrap().last().copied(), Some(0.0));
        assert_eq!(feeder.angles.lock().unwrap().last().copied(), Some(REST_ANGLE));

        // The feeder reached the drop angle at 19:00 each evening.
        let drops = feeder
            .angles
            .lock()
            .unwrap()
            .iter()
            .filter(|a| **a == feeder::DROP_ANGLE)
            .count();
        assert!(drops >= 2);

        let snapshot = status.snapshot().await;
        assert!(!snapshot.running);
        assert_eq!(snapshot.run_id, Some(outcome.run_id));
        assert!(snapshot.progress_pct > 99.0);

        // A 2-day cycle keeps only Full Moon and New Moon: two nights, two days.
        let frames = panel.frames.lock().unwrap().clone();
        assert_eq!(
            frames,
            vec![
                DisplayFrame::Phase(LunarPhase::FullMoon),
                DisplayFrame::Solid(Rgb::WHITE),
                DisplayFrame::Phase(LunarPhase::NewMoon),
                DisplayFrame::Solid(Rgb::WHITE),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick() {
        let sched = scheduler(
            FAST,
            Arc::new(Servo::default()),
            Arc::new(Servo::default()),
            Arc::new(Panel::default()),
        );
        let control = Arc::new(RunControl::new());
        control.request_stop();
        let outcome = sched.run(control).await;
        assert_eq!(outcome.end_reason, EndReason::Stopped);
        assert_eq!(outcome.ticks, 0);
        assert_eq!(outcome.last_sim_time, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_long_sleep() {
        // Real-time speed: one tick per real minute.
        let sched = scheduler(
            "cycle:\n  length_days: 28\n",
            Arc::new(Servo::default()),
            Arc::new(Servo::default()),
            Arc::new(Panel::default()),
        );
        let control = Arc::new(RunControl::new());
        let handle = tokio::spawn(sched.run(Arc::clone(&control)));

        tokio::time::sleep(std::time::Duration::from_secs(150)).await;
        control.request_stop();
        let outcome = handle.await.unwrap();

        assert_eq!(outcome.end_reason, EndReason::Stopped);
        assert_eq!(outcome.ticks, 3);
    }
}
