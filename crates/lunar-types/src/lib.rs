//! Shared type definitions for the Moonlight lunar-cycle installation.
//!
//! This crate is the single source of truth for the value types that flow
//! between the schedule builder, the actuation scheduler, and the external
//! dashboard. Types consumed by the dashboard are exported to `TypeScript`
//! via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for run identifiers
//! - [`enums`] -- Lunar phases, sky state, feeder actions
//! - [`time`] -- Minute-resolution time of day (`HH:MM`)
//! - [`structs`] -- Schedule entries, shared status, display frames

pub mod enums;
pub mod ids;
pub mod structs;
pub mod time;

// Re-export all public types at crate root for convenience.
pub use enums::{FeederAction, LunarPhase, PhaseKind, PhaseParseError, SkyState};
pub use ids::RunId;
pub use structs::{DisplayFrame, Rgb, RgbParseError, ScheduleEntry, SharedStatus};
pub use time::{ClockTime, ClockTimeError};

#[cfg(test)]
mod tests {
    //! Export checks for the `TypeScript` bindings.

    #[test]
    fn export_bindings() {
        // ts-rs writes the bindings to `bindings/` relative to the crate
        // root when export_all is invoked.
        use ts_rs::TS;

        let _ = crate::ids::RunId::export_all();
        let _ = crate::enums::LunarPhase::export_all();
        let _ = crate::enums::SkyState::export_all();
        let _ = crate::enums::FeederAction::export_all();
        let _ = crate::structs::ScheduleEntry::export_all();
        let _ = crate::structs::SharedStatus::export_all();
    }
}
