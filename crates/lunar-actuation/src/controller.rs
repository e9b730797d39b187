//! Start, stop, reload and status for the actuation scheduler.
//!
//! The [`Controller`] is the only entry point the dashboard (or the
//! binary) uses. Commands form a closed enum, [`ControlCommand`], handled
//! exhaustively by [`Controller::dispatch`].
//!
//! Configuration is validated and the schedule is built before anything
//! running is touched, so a rejected `Start` or `Reload` leaves the
//! current run, if any, exactly as it was.
//!
//! The controller lock is never held while a run parks. A stopping run
//! stays registered until it has parked, so `start` keeps answering
//! `AlreadyRunning` and `status` stays readable throughout. Whoever
//! collects a finished run checks its [`RunId`] first, so a run started
//! in the meantime is never taken by mistake.

use std::sync::Arc;

use chrono::NaiveDateTime;
use lunar_core::clock::{ClockError, SimulationClock};
use lunar_core::config::{ConfigError, SimulationConfig, ValidatedConfig};
use lunar_core::schedule::{Schedule, ScheduleError};
use lunar_types::{RunId, SharedStatus};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::feeder::REST_ANGLE;
use crate::hardware::Hardware;
use crate::motion::MIN_ANGLE;
use crate::scheduler::{RunControl, RunOutcome, Scheduler, WallClock};
use crate::status::StatusHandle;

/// Errors returned by controller commands.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// `start` while a run is in progress.
    #[error("a lunar cycle is already running")]
    AlreadyRunning,

    /// `stop` with no run in progress.
    #[error("no lunar cycle is running")]
    NotRunning,

    /// The configuration was rejected.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The schedule could not be built.
    #[error("schedule error: {source}")]
    Schedule {
        /// The underlying schedule error.
        #[from]
        source: ScheduleError,
    },

    /// The simulated clock could not be built.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The scheduler task ended without producing an outcome.
    #[error("scheduler task failed: {reason}")]
    Task {
        /// Description of the failure.
        reason: String,
    },
}

/// A command for the controller.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ControlCommand {
    /// Validate the configuration and start a run.
    Start(SimulationConfig),
    /// Stop the current run.
    Stop,
    /// Rebuild from a new configuration and restart.
    Reload(SimulationConfig),
    /// Report the current status.
    Status,
}

/// Result of a successfully handled [`ControlCommand`].
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum CommandOutcome {
    /// A run started.
    Started(RunId),
    /// The run stopped.
    Stopped(RunOutcome),
    /// The configuration was reloaded and a new run started.
    Reloaded(RunId),
    /// Current status.
    Status(StatusReport),
}

/// Status plus the configuration of the current (or last) run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Live status record.
    pub status: SharedStatus,
    /// Configuration of the current or most recent run.
    pub config: Option<ValidatedConfig>,
    /// Simulated instant at which the current or most recent cycle began.
    pub cycle_start: Option<NaiveDateTime>,
}

struct ActiveRun {
    run_id: RunId,
    control: Arc<RunControl>,
    handle: JoinHandle<RunOutcome>,
    done: watch::Receiver<bool>,
}

impl ActiveRun {
    /// Still running or parking.
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[derive(Default)]
struct Inner {
    active: Option<ActiveRun>,
    config: Option<ValidatedConfig>,
    cycle_start: Option<NaiveDateTime>,
}

/// A prepared run: everything has been validated and built.
struct Plan {
    config: ValidatedConfig,
    schedule: Schedule,
    clock: SimulationClock,
}

/// Owns the scheduler task and the shared status.
pub struct Controller {
    hardware: Hardware,
    wall: Arc<dyn WallClock>,
    status: StatusHandle,
    inner: Mutex<Inner>,
}

impl Controller {
    /// Create an idle controller.
    pub fn new(hardware: Hardware, wall: Arc<dyn WallClock>) -> Self {
        Self {
            hardware,
            wall,
            status: StatusHandle::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Handle to the live status, for readers.
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Handle a command.
    pub async fn dispatch(&self, command: ControlCommand) -> Result<CommandOutcome, ControlError> {
        match command {
            ControlCommand::Start(config) => self.start(&config).await.map(CommandOutcome::Started),
            ControlCommand::Stop => self.stop().await.map(CommandOutcome::Stopped),
            ControlCommand::Reload(config) => {
                self.reload(&config).await.map(CommandOutcome::Reloaded)
            }
            ControlCommand::Status => Ok(CommandOutcome::Status(self.status().await)),
        }
    }

    /// Validate `config` and start a run.
    ///
    /// # Errors
    ///
    /// [`ControlError::AlreadyRunning`] if a run is in progress; config,
    /// schedule or clock errors if `config` is rejected.
    pub async fn start(&self, config: &SimulationConfig) -> Result<RunId, ControlError> {
        let mut inner = self.inner.lock().await;
        if inner.active.as_ref().is_some_and(ActiveRun::is_live) {
            return Err(ControlError::AlreadyRunning);
        }
        let plan = self.plan(config)?;
        Ok(self.launch(&mut inner, plan).await)
    }

    /// Stop the current run and wait for it to park.
    ///
    /// # Errors
    ///
    /// [`ControlError::NotRunning`] if no run is in progress, or if another
    /// caller collected the run while it parked.
    pub async fn stop(&self) -> Result<RunOutcome, ControlError> {
        let (run_id, done) = {
            let inner = self.inner.lock().await;
            let run = inner
                .active
                .as_ref()
                .filter(|run| run.is_live())
                .ok_or(ControlError::NotRunning)?;
            info!(run_id = %run.run_id, "Stopping lunar cycle");
            run.control.request_stop();
            (run.run_id, run.done.clone())
        };
        self.collect(run_id, done).await
    }

    /// Rebuild from `config` and restart. Starts a run if none is active.
    ///
    /// # Errors
    ///
    /// Config, schedule or clock errors if `config` is rejected; the
    /// current run keeps going in that case. [`ControlError::AlreadyRunning`]
    /// if another caller started a run while the previous one parked.
    pub async fn reload(&self, config: &SimulationConfig) -> Result<RunId, ControlError> {
        let plan = self.plan(config)?;

        let previous = {
            let inner = self.inner.lock().await;
            inner.active.as_ref().filter(|run| run.is_live()).map(|run| {
                info!(run_id = %run.run_id, "Reloading configuration, stopping current cycle");
                run.control.request_stop();
                (run.run_id, run.done.clone())
            })
        };
        if let Some((run_id, done)) = previous {
            match self.collect(run_id, done).await {
                // Collected by a concurrent stop or wait.
                Ok(_) | Err(ControlError::NotRunning) => {}
                Err(e) => warn!(error = %e, "Previous cycle ended abnormally"),
            }
        }

        let mut inner = self.inner.lock().await;
        if inner.active.as_ref().is_some_and(ActiveRun::is_live) {
            return Err(ControlError::AlreadyRunning);
        }
        let run_id = self.launch(&mut inner, plan).await;
        info!(run_id = %run_id, "Configuration reloaded");
        Ok(run_id)
    }

    /// Current status and configuration.
    pub async fn status(&self) -> StatusReport {
        let (config, cycle_start) = {
            let inner = self.inner.lock().await;
            (inner.config.clone(), inner.cycle_start)
        };
        StatusReport {
            status: self.status.snapshot().await,
            config,
            cycle_start,
        }
    }

    /// Whether a run is in progress, including one that is parking.
    pub async fn is_running(&self) -> bool {
        self.inner
            .lock()
            .await
            .active
            .as_ref()
            .is_some_and(ActiveRun::is_live)
    }

    /// Wait for the current run to end on its own and collect its outcome.
    ///
    /// # Errors
    ///
    /// [`ControlError::NotRunning`] if there is no run, or if it was
    /// collected by another caller while waiting.
    pub async fn wait(&self) -> Result<RunOutcome, ControlError> {
        let (run_id, done) = {
            let inner = self.inner.lock().await;
            inner
                .active
                .as_ref()
                .map(|run| (run.run_id, run.done.clone()))
                .ok_or(ControlError::NotRunning)?
        };
        self.collect(run_id, done).await
    }

    /// Wait for run `run_id` to finish, then take it out of the registry
    /// and join it. The lock is only held to take the run.
    async fn collect(
        &self,
        run_id: RunId,
        mut done: watch::Receiver<bool>,
    ) -> Result<RunOutcome, ControlError> {
        // A closed channel means the run is over either way.
        let _ = done.wait_for(|finished| *finished).await;

        let run = {
            let mut inner = self.inner.lock().await;
            if inner.active.as_ref().map(|run| run.run_id) != Some(run_id) {
                return Err(ControlError::NotRunning);
            }
            inner.active.take().ok_or(ControlError::NotRunning)?
        };
        join(run).await
    }

    fn plan(&self, config: &SimulationConfig) -> Result<Plan, ControlError> {
        let config = config.validate()?;
        let schedule = Schedule::build(f64::from(config.cycle_days), Some(config.start_phase))?;
        let cycle_start = self
            .wall
            .now()
            .date()
            .and_time(config.start_time.to_naive_time());
        let clock = SimulationClock::new(
            cycle_start,
            config.speed_factor,
            config.real_seconds_per_sim_day,
            config.tick_minutes,
        )?;
        Ok(Plan {
            config,
            schedule,
            clock,
        })
    }

    /// Start the scheduler task. The running status is published before
    /// this returns.
    async fn launch(&self, inner: &mut Inner, plan: Plan) -> RunId {
        let Plan {
            config,
            schedule,
            clock,
        } = plan;

        inner.config = Some(config.clone());
        inner.cycle_start = Some(clock.cycle_start());

        let scheduler = Scheduler::new(
            config,
            schedule,
            clock,
            self.hardware.clone(),
            self.status.clone(),
            Arc::clone(&self.wall),
        );
        let run_id = scheduler.run_id();
        self.status
            .update(|s| {
                *s = SharedStatus {
                    run_id: Some(run_id),
                    running: true,
                    servo_angle: MIN_ANGLE,
                    feeder_angle: REST_ANGLE,
                    ..SharedStatus::default()
                };
            })
            .await;

        let control = Arc::new(RunControl::new());
        let (done_tx, done) = watch::channel(false);

        let task_control = Arc::clone(&control);
        let handle = tokio::spawn(async move {
            let outcome = scheduler.run(task_control).await;
            let _ = done_tx.send(true);
            outcome
        });

        inner.active = Some(ActiveRun {
            run_id,
            control,
            handle,
            done,
        });
        run_id
    }
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("hardware", &self.hardware)
            .finish_non_exhaustive()
    }
}

async fn join(run: ActiveRun) -> Result<RunOutcome, ControlError> {
    run.handle.await.map_err(|e| ControlError::Task {
        reason: e.to_string(),
    })
}
