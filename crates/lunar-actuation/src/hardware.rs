//! Hardware collaborator interfaces.
//!
//! The scheduler never talks to a PWM chip or a display controller
//! directly. It drives these traits, which are implemented by the board
//! support code (or by log-only stand-ins and test fakes). Calls may
//! block; they are only ever made on Tokio's blocking pool, on behalf of
//! a worker task, never from the tick loop itself.

use std::sync::Arc;

use lunar_types::DisplayFrame;

/// Errors reported by hardware collaborators. Both map to an
/// `ActuatorFault`: logged, the actuator returns to idle, and the next
/// tick may retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    /// A servo rejected or failed to apply an angle.
    #[error("servo fault: {reason}")]
    Servo {
        /// Description of the failure.
        reason: String,
    },

    /// The display panel failed to show a frame.
    #[error("display fault: {reason}")]
    Display {
        /// Description of the failure.
        reason: String,
    },
}

/// A positional servo.
pub trait ServoDriver: Send + Sync {
    /// Move to `angle` degrees (`0..=180`) and return the applied duty
    /// cycle in percent.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Servo`] if the angle could not be applied.
    fn set_angle(&self, angle: f64) -> Result<f64, HardwareError>;
}

/// A small color/image display.
pub trait DisplayPanel: Send + Sync {
    /// Show `frame` until the next call.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Display`] if the frame could not be shown.
    fn show(&self, frame: DisplayFrame) -> Result<(), HardwareError>;
}

/// The set of devices one installation drives.
#[derive(Clone)]
pub struct Hardware {
    /// The arm servo tracking the sun and moon.
    pub arm: Arc<dyn ServoDriver>,
    /// The feeder servo.
    pub feeder: Arc<dyn ServoDriver>,
    /// The phase/color display.
    pub display: Arc<dyn DisplayPanel>,
}

impl core::fmt::Debug for Hardware {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hardware").finish_non_exhaustive()
    }
}
