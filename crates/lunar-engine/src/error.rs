//! Error types for the installation binary.
//!
//! [`EngineError`] wraps every failure mode during startup and playback so
//! that `main` can propagate with `?`.

/// Top-level error for the installation binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: lunar_core::config::ConfigError,
    },

    /// The controller refused a command or the run failed.
    #[error("control error: {source}")]
    Control {
        /// The underlying controller error.
        #[from]
        source: lunar_actuation::ControlError,
    },

    /// Installing the interrupt handler failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
