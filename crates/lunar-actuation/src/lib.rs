//! Real-time actuation for the Moonlight installation.
//!
//! This crate turns the deterministic lunar schedule from `lunar-core`
//! into servo sweeps, feeder programs and display frames, driven by a
//! tick loop that never blocks on the hardware.
//!
//! # Modules
//!
//! - [`hardware`] -- Servo and display collaborator traits.
//! - [`motion`] -- Per-actuator worker tasks with a single in-flight sweep.
//! - [`feeder`] -- Feeder trigger matching and motion programs.
//! - [`display`] -- Day/night display transitions.
//! - [`status`] -- The shared status record read by the dashboard.
//! - [`scheduler`] -- The tick loop.
//! - [`controller`] -- Start / stop / reload / status commands.

pub mod controller;
pub mod display;
pub mod feeder;
pub mod hardware;
pub mod motion;
pub mod scheduler;
pub mod status;

pub use controller::{CommandOutcome, ControlCommand, ControlError, Controller, StatusReport};
pub use hardware::{DisplayPanel, Hardware, HardwareError, ServoDriver};
pub use scheduler::{EndReason, RunOutcome, SystemClock, WallClock};
pub use status::StatusHandle;
