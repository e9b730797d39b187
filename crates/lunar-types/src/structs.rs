//! Core record types: schedule entries, the shared status snapshot, and
//! display frames.

use core::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{LunarPhase, SkyState};
use crate::ids::RunId;
use crate::time::ClockTime;

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// One simulated day of the lunar schedule.
///
/// `moonrise` and `moonset` are both present or both absent; they are
/// absent only on New Moon days. Entries are immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScheduleEntry {
    /// Zero-based day index within the cycle.
    pub day: u32,
    /// The phase shown on this day.
    pub phase: LunarPhase,
    /// Moonrise time of day, absent on New Moon days.
    #[ts(type = "string | null")]
    pub moonrise: Option<ClockTime>,
    /// Moonset time of day, absent on New Moon days.
    #[ts(type = "string | null")]
    pub moonset: Option<ClockTime>,
    /// Seconds between moonrise and moonset (wrapping past midnight).
    pub visibility_seconds: u32,
    /// Geometric phase angle in degrees, `[0, 180]`; 180 is most full.
    pub phase_angle: f64,
}

impl ScheduleEntry {
    /// The rise/set pair, if the moon rises on this day.
    pub const fn window(&self) -> Option<(ClockTime, ClockTime)> {
        match (self.moonrise, self.moonset) {
            (Some(rise), Some(set)) => Some((rise, set)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared status
// ---------------------------------------------------------------------------

/// Live status written by the scheduler once per tick and read by the
/// dashboard. Last writer wins; `sim_time` is monotonic within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SharedStatus {
    /// Identifier of the current (or last) run.
    pub run_id: Option<RunId>,
    /// Whether the scheduler loop is running.
    pub running: bool,
    /// Ticks executed in the current run.
    pub tick: u64,
    /// Current simulated time.
    pub sim_time: Option<NaiveDateTime>,
    /// Progress through the cycle in percent, `[0, 100]`.
    pub progress_pct: f64,
    /// What is in the sky.
    pub sky: SkyState,
    /// Phase angle of the visible moon, 0 when none is visible.
    pub phase_angle: f64,
    /// Resolved target altitude in degrees, `[0, 90]`.
    pub altitude: f64,
    /// Last angle reported by the arm servo.
    pub servo_angle: f64,
    /// Last angle reported by the feeder servo.
    pub feeder_angle: f64,
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self {
            run_id: None,
            running: false,
            tick: 0,
            sim_time: None,
            progress_pct: 0.0,
            sky: SkyState::MoonAbsent,
            phase_angle: 0.0,
            altitude: 0.0,
            servo_angle: 0.0,
            feeder_angle: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Error returned for a malformed hex color.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex color {input:?}: expected RRGGBB")]
pub struct RgbParseError {
    /// The rejected input.
    pub input: String,
}

/// A 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Pure white, shown while the sun is up.
    pub const WHITE: Self = Self {
        r: 0xFF,
        g: 0xFF,
        b: 0xFF,
    };

    /// Render as uppercase `RRGGBB`.
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = RgbParseError;

    /// Parses `RRGGBB` with an optional leading `#`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RgbParseError {
            input: s.to_owned(),
        };
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(err());
        }
        let channel = |range: core::ops::Range<usize>| {
            hex.get(range)
                .and_then(|part| u8::from_str_radix(part, 16).ok())
                .ok_or_else(err)
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl TryFrom<String> for Rgb {
    type Error = RgbParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

/// Content pushed to the display panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayFrame {
    /// Fill the panel with a solid color.
    Solid(Rgb),
    /// Show the stock image for a lunar phase.
    Phase(LunarPhase),
}
