//! Enumeration types for the lunar-cycle installation.
//!
//! The eight canonical phases are listed in canonical cycle order, starting
//! at Full Moon. Every schedule, rescaling, and rotation is expressed
//! relative to this order.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Lunar phases
// ---------------------------------------------------------------------------

/// One of the eight canonical lunar phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LunarPhase {
    /// Fully illuminated disc. Single-day phase.
    FullMoon,
    /// Shrinking, more than half lit.
    WaningGibbous,
    /// Left half lit. Single-day phase.
    LastQuarter,
    /// Thin shrinking sliver.
    WaningCrescent,
    /// Unlit; the moon never rises over the installation on this day.
    NewMoon,
    /// Thin growing sliver.
    WaxingCrescent,
    /// Right half lit. Single-day phase.
    FirstQuarter,
    /// Growing, more than half lit.
    WaxingGibbous,
}

/// Whether a phase keeps its canonical length or absorbs rescaling error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    /// Single canonical day (New, Full, and the two Quarters).
    Exact,
    /// Multi-day transitional phase that absorbs rounding adjustments.
    Elastic,
}

/// Error returned when a phase name does not match any known phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lunar phase: {name}")]
pub struct PhaseParseError {
    /// The rejected input.
    pub name: String,
}

impl LunarPhase {
    /// All phases in canonical cycle order.
    pub const ALL: [Self; 8] = [
        Self::FullMoon,
        Self::WaningGibbous,
        Self::LastQuarter,
        Self::WaningCrescent,
        Self::NewMoon,
        Self::WaxingCrescent,
        Self::FirstQuarter,
        Self::WaxingGibbous,
    ];

    /// Length of this phase in the canonical 28-day cycle.
    pub const fn canonical_days(self) -> u32 {
        match self.kind() {
            PhaseKind::Exact => 1,
            PhaseKind::Elastic => 6,
        }
    }

    /// Whether the phase is exact (single-day) or elastic (multi-day).
    pub const fn kind(self) -> PhaseKind {
        match self {
            Self::FullMoon | Self::LastQuarter | Self::NewMoon | Self::FirstQuarter => {
                PhaseKind::Exact
            }
            Self::WaningGibbous | Self::WaningCrescent | Self::WaxingCrescent | Self::WaxingGibbous => {
                PhaseKind::Elastic
            }
        }
    }

    /// Position of the phase in canonical order (0 = Full Moon).
    pub const fn index(self) -> usize {
        match self {
            Self::FullMoon => 0,
            Self::WaningGibbous => 1,
            Self::LastQuarter => 2,
            Self::WaningCrescent => 3,
            Self::NewMoon => 4,
            Self::WaxingCrescent => 5,
            Self::FirstQuarter => 6,
            Self::WaxingGibbous => 7,
        }
    }

    /// Human-readable name, e.g. `"Waning Gibbous"`.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::FullMoon => "Full Moon",
            Self::WaningGibbous => "Waning Gibbous",
            Self::LastQuarter => "Last Quarter",
            Self::WaningCrescent => "Waning Crescent",
            Self::NewMoon => "New Moon",
            Self::WaxingCrescent => "Waxing Crescent",
            Self::FirstQuarter => "First Quarter",
            Self::WaxingGibbous => "Waxing Gibbous",
        }
    }
}

impl core::fmt::Display for LunarPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for LunarPhase {
    type Err = PhaseParseError;

    /// Accepts snake case (`waning_gibbous`), display names
    /// (`Waning Gibbous`), and kebab case, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c.to_ascii_lowercase() })
            .collect();
        Self::ALL
            .into_iter()
            .find(|phase| phase.display_name().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| PhaseParseError { name: s.to_owned() })
    }
}

// ---------------------------------------------------------------------------
// Sky state
// ---------------------------------------------------------------------------

/// What occupies the simulated sky at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SkyState {
    /// The sun is up (daytime window); the arm points at the zenith.
    Daylight,
    /// The moon is above the horizon in the given phase.
    Moon(LunarPhase),
    /// Night with no visible moon (below horizon or New Moon).
    MoonAbsent,
}

impl SkyState {
    /// The lunar phase, if the moon is up.
    pub const fn phase(self) -> Option<LunarPhase> {
        match self {
            Self::Moon(phase) => Some(phase),
            Self::Daylight | Self::MoonAbsent => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Feeder actions
// ---------------------------------------------------------------------------

/// A motion program for the feeder mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FeederAction {
    /// Tip the feeder from its current angle to the drop angle.
    Drop,
    /// Shake between the shake and drop angles, then return to rest.
    ShakeAndReset,
    /// Swing back from the drop angle to rest.
    ReturnAndReset,
    /// Return from the current angle to rest.
    Reset,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn canonical_cycle_is_28_days() {
        let total: u32 = LunarPhase::ALL.iter().map(|p| p.canonical_days()).sum();
        assert_eq!(total, 28);
    }

    #[test]
    fn index_matches_canonical_order() {
        for (i, phase) in LunarPhase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i);
        }
    }

    #[test]
    fn exact_and_elastic_alternate() {
        let kinds: Vec<PhaseKind> = LunarPhase::ALL.iter().map(|p| p.kind()).collect();
        for (i, kind) in kinds.iter().enumerate() {
            let expected = if i % 2 == 0 {
                PhaseKind::Exact
            } else {
                PhaseKind::Elastic
            };
            assert_eq!(*kind, expected);
        }
    }

    #[test]
    fn parse_accepts_several_spellings() {
        assert_eq!("full_moon".parse::<LunarPhase>().unwrap(), LunarPhase::FullMoon);
        assert_eq!("Waning Gibbous".parse::<LunarPhase>().unwrap(), LunarPhase::WaningGibbous);
        assert_eq!("new-moon".parse::<LunarPhase>().unwrap(), LunarPhase::NewMoon);
        assert_eq!(" FIRST_QUARTER ".parse::<LunarPhase>().unwrap(), LunarPhase::FirstQuarter);
    }

    #[test]
    fn parse_rejects_unknown_phase() {
        let err = "blue moon".parse::<LunarPhase>().unwrap_err();
        assert_eq!(err.name, "blue moon");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&LunarPhase::WaxingCrescent).unwrap();
        assert_eq!(json, "\"waxing_crescent\"");
        let sky = serde_json::to_string(&SkyState::Moon(LunarPhase::FullMoon)).unwrap();
        assert_eq!(sky, "{\"moon\":\"full_moon\"}");
    }

    #[test]
    fn sky_phase_only_when_moon_up() {
        assert_eq!(SkyState::Daylight.phase(), None);
        assert_eq!(SkyState::MoonAbsent.phase(), None);
        assert_eq!(
            SkyState::Moon(LunarPhase::LastQuarter).phase(),
            Some(LunarPhase::LastQuarter)
        );
    }
}
