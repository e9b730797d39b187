//! Non-blocking servo motion.
//!
//! An [`Actuator`] owns one servo and at most one in-flight worker task.
//! The tick loop asks it to run a motion program; the actuator spawns a
//! worker that steps the servo toward each target with a small sleep per
//! step, and the tick loop moves on immediately. Completion is observed by
//! polling the worker's [`JoinHandle`], never by awaiting it mid-cycle.
//!
//! # Invariants
//!
//! - At most one worker per actuator is running. A dispatch while a worker
//!   is in flight is refused, not queued.
//! - A running worker is never cancelled; it sweeps to completion.
//! - The current angle is written only by the running worker and read
//!   lock-free by the scheduler.
//! - A hardware fault ends the worker early. The actuator returns to idle
//!   at the last angle that was applied.
//! - Driver calls run on the blocking pool, so a slow servo holds up only
//!   its own worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::hardware::{HardwareError, ServoDriver};

/// Lowest servo angle in degrees.
pub const MIN_ANGLE: f64 = 0.0;

/// Highest servo angle in degrees.
pub const MAX_ANGLE: f64 = 180.0;

/// One leg of a motion program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sweep {
    /// Jump here before sweeping; `None` sweeps from the current angle.
    pub from: Option<f64>,
    /// Final angle of this leg.
    pub target: f64,
    /// Degrees per step.
    pub step_degrees: f64,
    /// Sleep after each step.
    pub step_delay: Duration,
}

impl Sweep {
    /// Sweep from the current angle to `target`.
    pub const fn to(target: f64, step_degrees: f64, step_delay: Duration) -> Self {
        Self {
            from: None,
            target,
            step_degrees,
            step_delay,
        }
    }

    /// Start this leg from a fixed angle instead of the current one.
    #[must_use]
    pub const fn starting_at(mut self, from: f64) -> Self {
        self.from = Some(from);
        self
    }
}

/// Whether an actuator has a worker in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionState {
    /// No worker is running.
    Idle,
    /// A worker is sweeping toward the given final angle.
    MovingToTarget(f64),
}

/// Angles visited when sweeping from `from` to `target` in `step` degree
/// increments. `from` itself is not included; the last angle is exactly
/// `target`. Empty when the two are already equal.
pub fn sweep_angles(from: f64, target: f64, step: f64) -> Vec<f64> {
    let from = clamp_angle(from);
    let target = clamp_angle(target);
    let distance = (target - from).abs();
    if distance <= f64::EPSILON {
        return Vec::new();
    }
    let step = if step.is_finite() && step > 0.0 {
        step.min(MAX_ANGLE)
    } else {
        MAX_ANGLE
    };
    let direction: f64 = if target > from { 1.0 } else { -1.0 };

    // distance <= 180 and step > 0, so the count is small and positive.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = (distance / step).ceil() as usize;

    (1..=count)
        .map(|i| {
            if i == count {
                target
            } else {
                #[allow(clippy::cast_precision_loss)]
                let offset = i as f64 * step;
                direction.mul_add(offset, from)
            }
        })
        .collect()
}

/// Clamp to the servo's mechanical range.
pub fn clamp_angle(angle: f64) -> f64 {
    if angle.is_nan() {
        return MIN_ANGLE;
    }
    angle.clamp(MIN_ANGLE, MAX_ANGLE)
}

/// State shared between an [`Actuator`] and its worker.
#[derive(Debug)]
struct Shared {
    /// Current angle, stored as `f64` bits.
    angle_bits: AtomicU64,
    /// Set while a worker owns the servo.
    in_flight: AtomicBool,
    /// Workers currently running.
    running: AtomicUsize,
    /// Highest value `running` has reached.
    peak: AtomicUsize,
}

impl Shared {
    fn angle(&self) -> f64 {
        f64::from_bits(self.angle_bits.load(Ordering::Acquire))
    }

    fn set_angle(&self, angle: f64) {
        self.angle_bits.store(angle.to_bits(), Ordering::Release);
    }
}

/// Clears the in-flight flag when a worker ends, including by panic.
struct InFlightGuard(Arc<Shared>);

impl InFlightGuard {
    fn enter(shared: Arc<Shared>) -> Self {
        let now = shared.running.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        shared.peak.fetch_max(now, Ordering::AcqRel);
        Self(shared)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::AcqRel);
        self.0.in_flight.store(false, Ordering::Release);
    }
}

/// One servo plus its single in-flight worker.
pub struct Actuator {
    name: &'static str,
    driver: Arc<dyn ServoDriver>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    target: Option<f64>,
}

impl Actuator {
    /// Create an idle actuator believed to be at `initial_angle`.
    pub fn new(name: &'static str, driver: Arc<dyn ServoDriver>, initial_angle: f64) -> Self {
        Self {
            name,
            driver,
            shared: Arc::new(Shared {
                angle_bits: AtomicU64::new(clamp_angle(initial_angle).to_bits()),
                in_flight: AtomicBool::new(false),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            worker: None,
            target: None,
        }
    }

    /// Name used in log fields.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Last angle applied to the servo.
    pub fn current_angle(&self) -> f64 {
        self.shared.angle()
    }

    /// Highest number of workers ever running at once. Never above 1.
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak.load(Ordering::Acquire)
    }

    /// Reap a finished worker, then report the state.
    pub fn poll(&mut self) -> MotionState {
        if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            self.worker = None;
            self.target = None;
        }
        self.state()
    }

    /// Current state without reaping.
    pub fn state(&self) -> MotionState {
        match (self.worker.as_ref(), self.target) {
            (Some(_), Some(target)) => MotionState::MovingToTarget(target),
            _ => MotionState::Idle,
        }
    }

    /// Whether the arm is further than half a step from `target`.
    pub fn needs_move(&self, target: f64, step_degrees: f64) -> bool {
        (self.current_angle() - clamp_angle(target)).abs() >= step_degrees / 2.0
    }

    /// Start a single sweep. See [`run_program`](Self::run_program).
    pub fn dispatch(&mut self, sweep: Sweep) -> bool {
        self.run_program(vec![sweep])
    }

    /// Start a worker running `program` leg by leg.
    ///
    /// Returns `false` without doing anything if a worker is already in
    /// flight or the program is empty. Must be called inside a Tokio
    /// runtime.
    pub fn run_program(&mut self, program: Vec<Sweep>) -> bool {
        if self.poll() != MotionState::Idle {
            return false;
        }
        let Some(final_target) = program.last().map(|leg| clamp_angle(leg.target)) else {
            return false;
        };
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let guard = InFlightGuard::enter(Arc::clone(&self.shared));
        let driver = Arc::clone(&self.driver);
        let name = self.name;
        debug!(actuator = name, target = final_target, legs = program.len(), "Motion dispatched");

        self.worker = Some(tokio::spawn(async move {
            for leg in program {
                if let Err(e) = run_leg(&driver, &guard.0, leg).await {
                    warn!(actuator = name, error = %e, "Actuator fault, motion abandoned");
                    break;
                }
            }
            drop(guard);
        }));
        self.target = Some(final_target);
        true
    }

    /// Wait for the in-flight worker, if any, to finish.
    pub async fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(actuator = self.name, error = %e, "Motion worker ended abnormally");
            }
        }
        self.target = None;
    }

    /// Run `program` and wait for it to finish.
    pub async fn run_to_completion(&mut self, program: Vec<Sweep>) {
        self.join().await;
        if self.run_program(program) {
            self.join().await;
        }
    }
}

impl core::fmt::Debug for Actuator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Actuator")
            .field("name", &self.name)
            .field("angle", &self.current_angle())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn run_leg(
    driver: &Arc<dyn ServoDriver>,
    shared: &Shared,
    leg: Sweep,
) -> Result<(), HardwareError> {
    if let Some(from) = leg.from {
        apply(driver, shared, clamp_angle(from)).await?;
        tokio::time::sleep(leg.step_delay).await;
    }
    for angle in sweep_angles(shared.angle(), leg.target, leg.step_degrees) {
        apply(driver, shared, angle).await?;
        tokio::time::sleep(leg.step_delay).await;
    }
    Ok(())
}

async fn apply(
    driver: &Arc<dyn ServoDriver>,
    shared: &Shared,
    angle: f64,
) -> Result<(), HardwareError> {
    let driver = Arc::clone(driver);
    let duty = match tokio::task::spawn_blocking(move || driver.set_angle(angle)).await {
        Ok(result) => result?,
        Err(e) => {
            return Err(HardwareError::Servo {
                reason: format!("servo call did not complete: {e}"),
            });
        }
    };
    shared.set_angle(angle);
    tracing::trace!(angle, duty, "Servo step");
    Ok(())
}
