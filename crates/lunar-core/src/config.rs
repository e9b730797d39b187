//! Configuration loading and typed config structures for the Moonlight
//! installation.
//!
//! The canonical configuration lives in `lunar-config.yaml` at the project
//! root. [`SimulationConfig`] mirrors the YAML structure with plain strings
//! and numbers; [`SimulationConfig::validate`] turns it into an immutable
//! [`ValidatedConfig`] snapshot with parsed times, phase and color. The
//! scheduler only ever sees the validated snapshot.

use std::path::Path;
use std::time::Duration;

use lunar_types::{ClockTime, LunarPhase, Rgb};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scaler;

/// Environment variable overriding `clock.speed_factor`.
pub const ENV_SPEED_FACTOR: &str = "LUNAR_SPEED_FACTOR";

/// Environment variable overriding `cycle.length_days`.
pub const ENV_CYCLE_LENGTH: &str = "LUNAR_CYCLE_LENGTH";

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range or malformed.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, as written in `lunar-config.yaml`.
///
/// Every section is optional and every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Cycle length, start phase and start time.
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Simulated clock rates.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Feeder trigger times.
    #[serde(default)]
    pub feeder: FeederConfig,

    /// Display panel settings.
    #[serde(default)]
    pub display: DisplayConfig,

    /// Servo sweep shape.
    #[serde(default)]
    pub motion: MotionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `LUNAR_SPEED_FACTOR` overrides `clock.speed_factor`
    /// - `LUNAR_CYCLE_LENGTH` overrides `cycle.length_days`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override values with environment variables when set.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = env_f64(ENV_SPEED_FACTOR) {
            self.clock.speed_factor = val;
        }
        if let Some(val) = env_f64(ENV_CYCLE_LENGTH) {
            self.cycle.length_days = val;
        }
    }

    /// Check every field and produce an immutable snapshot.
    ///
    /// Nothing is mutated on failure.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a cycle length below one day,
    /// a non-positive clock rate or step, a malformed `HH:MM` time, an
    /// unknown phase name, or a malformed color.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let cycle_days = scaler::normalize_cycle_length(self.cycle.length_days)
            .map_err(|e| invalid(format!("cycle.length_days: {e}")))?;
        let start_phase: LunarPhase = self
            .cycle
            .start_phase
            .parse()
            .map_err(|e| invalid(format!("cycle.start_phase: {e}")))?;
        let start_time = parse_time("cycle.start_time", &self.cycle.start_time)?;

        positive("clock.speed_factor", self.clock.speed_factor)?;
        positive(
            "clock.real_seconds_per_sim_day",
            self.clock.real_seconds_per_sim_day,
        )?;
        positive("clock.tick_minutes", self.clock.tick_minutes)?;

        let feeder = FeederSchedule {
            feed_start: parse_time("feeder.feed_start", &self.feeder.feed_start)?,
            feed_end: parse_time("feeder.feed_end", &self.feeder.feed_end)?,
            independent_timer: self.feeder.independent_timer,
            drop_at: parse_time("feeder.drop_at", &self.feeder.drop_at)?,
            end_at: parse_time("feeder.end_at", &self.feeder.end_at)?,
        };

        let night_color = match self.display.night_color.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(hex) => Some(
                hex.parse::<Rgb>()
                    .map_err(|e| invalid(format!("display.night_color: {e}")))?,
            ),
        };

        positive("motion.step_degrees", self.motion.step_degrees)?;
        if self.motion.step_degrees > 180.0 {
            return Err(invalid(format!(
                "motion.step_degrees must be at most 180, got {}",
                self.motion.step_degrees
            )));
        }
        let motion = MotionProfile {
            step_degrees: self.motion.step_degrees,
            sun_step_delay: Duration::from_millis(self.motion.sun_step_delay_ms),
            moon_step_delay: Duration::from_millis(self.motion.moon_step_delay_ms),
            rest_step_delay: Duration::from_millis(self.motion.rest_step_delay_ms),
            feeder_step_delay: Duration::from_millis(self.motion.feeder_step_delay_ms),
        };

        Ok(ValidatedConfig {
            cycle_days,
            start_phase,
            start_time,
            speed_factor: self.clock.speed_factor,
            real_seconds_per_sim_day: self.clock.real_seconds_per_sim_day,
            tick_minutes: self.clock.tick_minutes,
            feeder,
            night_color,
            motion,
            logging: self.logging.clone(),
        })
    }
}

/// Cycle configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CycleConfig {
    /// Cycle length in days; rounded to the nearest whole day, at least 1.
    #[serde(default = "default_length_days")]
    pub length_days: f64,

    /// Phase on day 0 (`full_moon`, `"Waxing Gibbous"`, ...).
    #[serde(default = "default_start_phase")]
    pub start_phase: String,

    /// Simulated local time at cycle start (`HH:MM`).
    #[serde(default = "default_start_time")]
    pub start_time: String,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            length_days: default_length_days(),
            start_phase: default_start_phase(),
            start_time: default_start_time(),
        }
    }
}

/// Simulated clock configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClockConfig {
    /// Playback speed multiplier.
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,

    /// Real seconds in one simulated day at speed 1.
    #[serde(default = "default_real_seconds_per_sim_day")]
    pub real_seconds_per_sim_day: f64,

    /// Simulated minutes advanced per tick.
    #[serde(default = "default_tick_minutes")]
    pub tick_minutes: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            speed_factor: default_speed_factor(),
            real_seconds_per_sim_day: default_real_seconds_per_sim_day(),
            tick_minutes: default_tick_minutes(),
        }
    }
}

/// Feeder trigger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeederConfig {
    /// Simulated time at which the feeder drops.
    #[serde(default = "default_feed_start")]
    pub feed_start: String,

    /// Simulated time at which the feeder shakes and resets.
    #[serde(default = "default_feed_end")]
    pub feed_end: String,

    /// Trigger on real wall-clock time instead of simulated time.
    #[serde(default)]
    pub independent_timer: bool,

    /// Real time at which the feeder drops (independent mode).
    #[serde(default = "default_drop_at")]
    pub drop_at: String,

    /// Real time at which the feeder returns to rest (independent mode).
    #[serde(default = "default_end_at")]
    pub end_at: String,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            feed_start: default_feed_start(),
            feed_end: default_feed_end(),
            independent_timer: false,
            drop_at: default_drop_at(),
            end_at: default_end_at(),
        }
    }
}

/// Display configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisplayConfig {
    /// Night color as `RRGGBB`; `null` shows the phase image instead.
    #[serde(default = "default_night_color")]
    pub night_color: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            night_color: default_night_color(),
        }
    }
}

/// Servo sweep configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MotionConfig {
    /// Degrees per sweep step.
    #[serde(default = "default_step_degrees")]
    pub step_degrees: f64,

    /// Per-step delay while sweeping toward the sun, in milliseconds.
    #[serde(default = "default_sun_step_delay_ms")]
    pub sun_step_delay_ms: u64,

    /// Per-step delay while tracking the moon, in milliseconds.
    #[serde(default = "default_moon_step_delay_ms")]
    pub moon_step_delay_ms: u64,

    /// Per-step delay while returning to rest, in milliseconds.
    #[serde(default = "default_rest_step_delay_ms")]
    pub rest_step_delay_ms: u64,

    /// Per-step delay for feeder programs, in milliseconds.
    #[serde(default = "default_feeder_step_delay_ms")]
    pub feeder_step_delay_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            step_degrees: default_step_degrees(),
            sun_step_delay_ms: default_sun_step_delay_ms(),
            moon_step_delay_ms: default_moon_step_delay_ms(),
            rest_step_delay_ms: default_rest_step_delay_ms(),
            feeder_step_delay_ms: default_feeder_step_delay_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated snapshot
// ---------------------------------------------------------------------------

/// Feeder trigger times, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeederSchedule {
    /// Simulated drop time.
    pub feed_start: ClockTime,
    /// Simulated shake-and-reset time.
    pub feed_end: ClockTime,
    /// Trigger on wall-clock time instead of simulated time.
    pub independent_timer: bool,
    /// Wall-clock drop time (independent mode).
    pub drop_at: ClockTime,
    /// Wall-clock return time (independent mode).
    pub end_at: ClockTime,
}

/// Servo sweep shape, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionProfile {
    /// Degrees per step, in `(0, 180]`.
    pub step_degrees: f64,
    /// Per-step delay toward the sun.
    pub sun_step_delay: Duration,
    /// Per-step delay while tracking the moon.
    pub moon_step_delay: Duration,
    /// Per-step delay toward rest.
    pub rest_step_delay: Duration,
    /// Per-step delay for feeder programs.
    pub feeder_step_delay: Duration,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            step_degrees: default_step_degrees(),
            sun_step_delay: Duration::from_millis(default_sun_step_delay_ms()),
            moon_step_delay: Duration::from_millis(default_moon_step_delay_ms()),
            rest_step_delay: Duration::from_millis(default_rest_step_delay_ms()),
            feeder_step_delay: Duration::from_millis(default_feeder_step_delay_ms()),
        }
    }
}

/// An immutable, fully-checked configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedConfig {
    /// Cycle length in whole days, at least 1.
    pub cycle_days: u32,
    /// Phase on day 0.
    pub start_phase: LunarPhase,
    /// Simulated local time at cycle start.
    pub start_time: ClockTime,
    /// Playback speed multiplier, positive.
    pub speed_factor: f64,
    /// Real seconds per simulated day at speed 1, positive.
    pub real_seconds_per_sim_day: f64,
    /// Simulated minutes per tick, positive.
    pub tick_minutes: f64,
    /// Feeder trigger times.
    pub feeder: FeederSchedule,
    /// Night color; `None` shows the phase image.
    pub night_color: Option<Rgb>,
    /// Servo sweep shape.
    pub motion: MotionProfile,
    /// Logging settings.
    pub logging: LoggingConfig,
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid { reason }
}

fn parse_time(field: &str, value: &str) -> Result<ClockTime, ConfigError> {
    value
        .parse()
        .map_err(|e| invalid(format!("{field}: {e}")))
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{field} must be a positive number, got {value}")))
    }
}

fn env_f64(key: &str) -> Option<f64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<f64>() {
        Ok(val) => Some(val),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring unparseable environment override");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_length_days() -> f64 {
    28.0
}

fn default_start_phase() -> String {
    "full_moon".to_owned()
}

fn default_start_time() -> String {
    "18:00".to_owned()
}

const fn default_speed_factor() -> f64 {
    1.0
}

const fn default_real_seconds_per_sim_day() -> f64 {
    86_400.0
}

const fn default_tick_minutes() -> f64 {
    1.0
}

fn default_feed_start() -> String {
    "19:00".to_owned()
}

fn default_feed_end() -> String {
    "04:00".to_owned()
}

fn default_drop_at() -> String {
    "06:00".to_owned()
}

fn default_end_at() -> String {
    "08:00".to_owned()
}

#[allow(clippy::unnecessary_wraps)]
fn default_night_color() -> Option<String> {
    Some("FF0000".to_owned())
}

const fn default_step_degrees() -> f64 {
    1.0
}

const fn default_sun_step_delay_ms() -> u64 {
    50
}

const fn default_moon_step_delay_ms() -> u64 {
    60
}

const fn default_rest_step_delay_ms() -> u64 {
    50
}

const fn default_feeder_step_delay_ms() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = SimulationConfig::default().validate().unwrap();
        assert_eq!(config.cycle_days, 28);
        assert_eq!(config.start_phase, LunarPhase::FullMoon);
        assert_eq!(config.start_time, ClockTime::new(18, 0).unwrap());
        assert_eq!(config.feeder.feed_start, ClockTime::new(19, 0).unwrap());
        assert_eq!(config.feeder.feed_end, ClockTime::new(4, 0).unwrap());
        assert!(!config.feeder.independent_timer);
        assert_eq!(config.night_color, Some(Rgb { r: 255, g: 0, b: 0 }));
        assert_eq!(config.motion, MotionProfile::default());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r##"
cycle:
  length_days: 29.5
  start_phase: "Waxing Gibbous"
  start_time: "20:30"

clock:
  speed_factor: 1440
  real_seconds_per_sim_day: 86400
  tick_minutes: 2

feeder:
  feed_start: "21:00"
  feed_end: "03:15"
  independent_timer: true
  drop_at: "07:00"
  end_at: "09:30"

display:
  night_color: "#0000ff"

motion:
  step_degrees: 2.5
  sun_step_delay_ms: 10
  moon_step_delay_ms: 20
  rest_step_delay_ms: 30
  feeder_step_delay_ms: 40

logging:
  level: debug
  format: json
"##;
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.cycle.length_days, 29.5);
        assert_eq!(config.clock.speed_factor, 1440.0);

        let valid = config.validate().unwrap();
        assert_eq!(valid.cycle_days, 30);
        assert_eq!(valid.start_phase, LunarPhase::WaxingGibbous);
        assert_eq!(valid.start_time, ClockTime::new(20, 30).unwrap());
        assert_eq!(valid.tick_minutes, 2.0);
        assert!(valid.feeder.independent_timer);
        assert_eq!(valid.feeder.end_at, ClockTime::new(9, 30).unwrap());
        assert_eq!(valid.night_color, Some(Rgb { r: 0, g: 0, b: 255 }));
        assert_eq!(valid.motion.step_degrees, 2.5);
        assert_eq!(valid.motion.feeder_step_delay, Duration::from_millis(40));
        assert_eq!(valid.logging.level, "debug");
        assert_eq!(valid.logging.format, LogFormat::Json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "cycle:\n  length_days: 14\n";
        let config = SimulationConfig::parse(yaml).unwrap();

        // Length is overridden
        assert_eq!(config.cycle.length_days, 14.0);
        // Everything else uses defaults
        assert_eq!(config.clock, ClockConfig::default());
        assert_eq!(config.feeder, FeederConfig::default());
    }

    #[test]
    fn parse_empty_yaml() {
        let config = SimulationConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn null_night_color_selects_phase_image() {
        let config = SimulationConfig::parse("display:\n  night_color: null\n").unwrap();
        assert_eq!(config.validate().unwrap().night_color, None);
    }

    #[test]
    fn rejects_short_cycle() {
        let mut config = SimulationConfig::default();
        config.cycle.length_days = 0.3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_malformed_values() {
        let cases = [
            "cycle:\n  start_time: \"25:00\"\n",
            "cycle:\n  start_phase: blue_moon\n",
            "clock:\n  speed_factor: 0\n",
            "clock:\n  real_seconds_per_sim_day: -3\n",
            "clock:\n  tick_minutes: 0\n",
            "feeder:\n  feed_start: \"7pm\"\n",
            "display:\n  night_color: \"red\"\n",
            "motion:\n  step_degrees: 0\n",
            "motion:\n  step_degrees: 500\n",
        ];
        for yaml in cases {
            let config = SimulationConfig::parse(yaml).unwrap();
            let result = config.validate();
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "{yaml} -> {result:?}"
            );
        }
    }

    #[test]
    fn invalid_yaml_is_a_yaml_error() {
        let result = SimulationConfig::parse("cycle: [unterminated");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("lunar-config.yaml");
        if path.exists() {
            let config = SimulationConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
