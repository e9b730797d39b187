//! Lunar time simulation for the Moonlight installation.
//!
//! This crate owns the deterministic half of the system: everything that
//! can be computed without touching hardware or spawning tasks.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `lunar-config.yaml` into
//!   strongly-typed structs, plus validation into an immutable snapshot.
//! - [`scaler`] -- Rescales the eight canonical phase lengths to an
//!   arbitrary cycle length.
//! - [`schedule`] -- Expands scaled phases into per-day moonrise/moonset
//!   records with phase angles.
//! - [`clock`] -- Maps wall-clock time and tick counts to simulated time.
//! - [`position`] -- Resolves sun/moon state and altitude for a simulated
//!   instant.

pub mod clock;
pub mod config;
pub mod position;
pub mod scaler;
pub mod schedule;
