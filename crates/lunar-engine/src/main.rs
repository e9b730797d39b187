//! Moonlight installation binary.
//!
//! Wires the configuration, logging and hardware together and plays one
//! lunar cycle.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `lunar-config.yaml` (or the path given as
//!    the first argument), with environment overrides
//! 2. Initialize structured logging (tracing) from the `logging` section
//! 3. Build the hardware (log-only stand-ins without a board)
//! 4. Start the controller
//! 5. Wait for the cycle to complete, or stop on Ctrl-C
//! 6. Log the result

mod error;
mod hardware;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lunar_actuation::{Controller, SystemClock};
use lunar_core::config::{LogFormat, LoggingConfig, SimulationConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Config file used when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "lunar-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is rejected, the interrupt
/// handler cannot be installed, or the run fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, found) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("lunar-engine starting");
    if found {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        length_days = config.cycle.length_days,
        start_phase = %config.cycle.start_phase,
        start_time = %config.cycle.start_time,
        speed_factor = config.clock.speed_factor,
        tick_minutes = config.clock.tick_minutes,
        independent_timer = config.feeder.independent_timer,
        "Cycle parameters"
    );

    // 3. Hardware.
    let hardware = hardware::log_only();
    info!("Log-only hardware initialized");

    // 4. Start.
    let controller = Controller::new(hardware, Arc::new(SystemClock));
    let run_id = controller.start(&config).await.map_err(EngineError::from)?;
    info!(run_id = %run_id, "Lunar cycle started, press Ctrl-C to stop");

    // 5. Run until complete or interrupted.
    let outcome = tokio::select! {
        outcome = controller.wait() => outcome.map_err(EngineError::from)?,
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(EngineError::from)?;
            info!("Interrupt received");
            controller.stop().await.map_err(EngineError::from)?
        }
    };

    // 6. Log results.
    info!(
        run_id = %outcome.run_id,
        end_reason = ?outcome.end_reason,
        ticks = outcome.ticks,
        last_sim_time = ?outcome.last_sim_time,
        "lunar-engine shutdown complete"
    );

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Load the configuration from `path`, falling back to defaults when the
/// file does not exist. Environment overrides apply either way. The flag
/// reports whether the file was found.
fn load_config(path: &Path) -> Result<(SimulationConfig, bool), EngineError> {
    if path.exists() {
        Ok((SimulationConfig::from_file(path)?, true))
    } else {
        let mut config = SimulationConfig::default();
        config.apply_env_overrides();
        Ok((config, false))
    }
}
