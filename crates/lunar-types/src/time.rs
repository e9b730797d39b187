//! Minute-resolution time of day.
//!
//! Moonrise, moonset, feeder triggers, and the cycle start time are all
//! configured and compared at `HH:MM` resolution. [`ClockTime`] is that
//! value: validated on construction, serialized as an `"HH:MM"` string.

use core::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Minutes in one day.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Errors produced when parsing or constructing a [`ClockTime`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockTimeError {
    /// The string is not of the form `HH:MM`.
    #[error("malformed time {input:?}: expected HH:MM")]
    Malformed {
        /// The rejected input.
        input: String,
    },

    /// Hour or minute is out of range.
    #[error("time out of range: {hour:02}:{minute:02}")]
    OutOfRange {
        /// The rejected hour.
        hour: u32,
        /// The rejected minute.
        minute: u32,
    },
}

/// A wall-clock time of day with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    /// Midnight, `00:00`.
    pub const MIDNIGHT: Self = Self { hour: 0, minute: 0 };

    /// Create a time of day.
    ///
    /// # Errors
    ///
    /// Returns [`ClockTimeError::OutOfRange`] unless `hour < 24` and
    /// `minute < 60`.
    pub fn new(hour: u32, minute: u32) -> Result<Self, ClockTimeError> {
        match (u8::try_from(hour), u8::try_from(minute)) {
            (Ok(h), Ok(m)) if h < 24 && m < 60 => Ok(Self { hour: h, minute: m }),
            _ => Err(ClockTimeError::OutOfRange { hour, minute }),
        }
    }

    /// Build a time from minutes past midnight, wrapping into `[0, 1440)`.
    pub fn from_minutes_wrapping(total_minutes: i64) -> Self {
        let wrapped = total_minutes.rem_euclid(i64::from(MINUTES_PER_DAY));
        // rem_euclid keeps the value in [0, 1440), so both parts fit a u8.
        let hour = u8::try_from(wrapped.div_euclid(60)).unwrap_or(0);
        let minute = u8::try_from(wrapped.rem_euclid(60)).unwrap_or(0);
        Self { hour, minute }
    }

    /// The time of day of a timestamp, truncated to the minute.
    pub fn of(datetime: NaiveDateTime) -> Self {
        Self::from_minutes_wrapping(
            i64::from(datetime.hour())
                .saturating_mul(60)
                .saturating_add(i64::from(datetime.minute())),
        )
    }

    /// Hour component (0-23).
    pub fn hour(self) -> u32 {
        u32::from(self.hour)
    }

    /// Minute component (0-59).
    pub fn minute(self) -> u32 {
        u32::from(self.minute)
    }

    /// Minutes since midnight.
    pub fn minutes_since_midnight(self) -> u32 {
        self.hour().saturating_mul(60).saturating_add(self.minute())
    }

    /// Convert to a [`NaiveTime`].
    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }
}

impl core::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ClockTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ClockTimeError::Malformed {
            input: s.to_owned(),
        };
        let (hour, minute) = s.trim().split_once(':').ok_or_else(malformed)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(malformed());
        }
        let hour: u32 = hour.parse().map_err(|_err| malformed())?;
        let minute: u32 = minute.parse().map_err(|_err| malformed())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ClockTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let t: ClockTime = "07:05".parse().unwrap();
        assert_eq!(t.hour(), 7);
        assert_eq!(t.minute(), 5);
        assert_eq!(t.to_string(), "07:05");
        let single_digit_hour: ClockTime = "6:00".parse().unwrap();
        assert_eq!(single_digit_hour.to_string(), "06:00");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<ClockTime>().is_err());
        assert!("1900".parse::<ClockTime>().is_err());
        assert!("19:0".parse::<ClockTime>().is_err());
        assert!("ab:cd".parse::<ClockTime>().is_err());
        assert!(matches!(
            "24:00".parse::<ClockTime>(),
            Err(ClockTimeError::OutOfRange { hour: 24, minute: 0 })
        ));
        assert!("12:60".parse::<ClockTime>().is_err());
    }

    #[test]
    fn minutes_wrap_past_midnight() {
        assert_eq!(ClockTime::from_minutes_wrapping(18 * 60 + 50).to_string(), "18:50");
        assert_eq!(ClockTime::from_minutes_wrapping(1440 + 30).to_string(), "00:30");
        assert_eq!(ClockTime::from_minutes_wrapping(-60).to_string(), "23:00");
    }

    #[test]
    fn minutes_since_midnight_spans_the_day() {
        assert_eq!(ClockTime::MIDNIGHT.minutes_since_midnight(), 0);
        assert_eq!(ClockTime::new(18, 51).unwrap().minutes_since_midnight(), 1131);
        assert_eq!(ClockTime::new(23, 59).unwrap().minutes_since_midnight(), 1439);
    }

    #[test]
    fn of_truncates_seconds() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(19, 0, 59)
            .unwrap();
        assert_eq!(ClockTime::of(dt), ClockTime::new(19, 0).unwrap());
    }

    #[test]
    fn serde_as_string() {
        let t = ClockTime::new(4, 0).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"04:00\"");
        let back: ClockTime = serde_json::from_str("\"04:00\"").unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<ClockTime>("\"4 o'clock\"").is_err());
    }
}
