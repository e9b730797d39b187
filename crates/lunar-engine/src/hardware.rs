//! Log-only hardware stand-ins.
//!
//! Used when the binary runs without the board attached. Servo calls
//! compute the duty cycle the real PWM channel would receive and log it;
//! display calls log the frame.

use std::sync::Arc;

use lunar_actuation::{DisplayPanel, Hardware, HardwareError, ServoDriver};
use lunar_types::DisplayFrame;
use tracing::{debug, info};

/// Duty cycle (percent) at 0 degrees, shared by both servos.
const MIN_DUTY: f64 = 2.6;

/// Duty span of the arm servo over 0..=180 degrees.
const ARM_DUTY_SPAN: f64 = 6.5;

/// Duty span of the feeder servo over 0..=180 degrees.
const FEEDER_DUTY_SPAN: f64 = 10.5;

/// A servo that logs instead of driving a PWM pin.
#[derive(Debug)]
pub struct LogServo {
    name: &'static str,
    duty_span: f64,
}

impl LogServo {
    /// Create a stand-in whose duty cycle spans `MIN_DUTY..MIN_DUTY + duty_span`.
    pub const fn new(name: &'static str, duty_span: f64) -> Self {
        Self { name, duty_span }
    }

    /// Duty cycle for `angle`.
    pub fn duty_for(&self, angle: f64) -> f64 {
        self.duty_span.mul_add(angle / 180.0, MIN_DUTY)
    }
}

impl ServoDriver for LogServo {
    fn set_angle(&self, angle: f64) -> Result<f64, HardwareError> {
        if !(0.0..=180.0).contains(&angle) {
            return Err(HardwareError::Servo {
                reason: format!("{} angle {angle} outside 0..=180", self.name),
            });
        }
        let duty = self.duty_for(angle);
        debug!(servo = self.name, angle, duty, "Servo set");
        Ok(duty)
    }
}

/// A display that logs each frame.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl DisplayPanel for LogDisplay {
    fn show(&self, frame: DisplayFrame) -> Result<(), HardwareError> {
        info!(frame = ?frame, "Display frame");
        Ok(())
    }
}

/// Log-only arm, feeder and display.
pub fn log_only() -> Hardware {
    Hardware {
        arm: Arc::new(LogServo::new("arm", ARM_DUTY_SPAN)),
        feeder: Arc::new(LogServo::new("feeder", FEEDER_DUTY_SPAN)),
        display: Arc::new(LogDisplay),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn duty_cycle_endpoints() {
        let arm = LogServo::new("arm", ARM_DUTY_SPAN);
        assert!((arm.set_angle(0.0).unwrap() - 2.6).abs() < 1e-9);
        assert!((arm.set_angle(180.0).unwrap() - 9.1).abs() < 1e-9);

        let feeder = LogServo::new("feeder", FEEDER_DUTY_SPAN);
        assert!((feeder.set_angle(180.0).unwrap() - 13.1).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_angle_is_a_fault() {
        let arm = LogServo::new("arm", ARM_DUTY_SPAN);
        assert!(matches!(
            arm.set_angle(181.0),
            Err(HardwareError::Servo { .. })
        ));
        assert!(arm.set_angle(f64::NAN).is_err());
    }
}
