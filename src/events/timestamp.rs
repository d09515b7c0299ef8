use super::error::EventError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    // YYYY/MM/DD hh:mm:ss.uuuuuu
    static ref TIMESTAMP_RE: Regex = Regex::new(
        r"^([0-9]{4})/([0-9]{2})/([0-9]{2}) ([0-9]{2}):([0-9]{2}):([0-9]{2})\.([0-9]{6})$"
    )
    .expect("timestamp pattern is valid");
}

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Event timestamp with microsecond resolution.
///
/// Values are wall-clock times read as UTC; the persisted report store keeps
/// them as microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Whether `s` has the fixed lexical form. Calendar validity is only
    /// checked by [`Timestamp::parse`].
    pub fn is_well_formed(s: &str) -> bool {
        TIMESTAMP_RE.is_match(s)
    }

    pub fn parse(s: &str) -> Result<Self, EventError> {
        let invalid = || EventError::InvalidTimestamp(s.to_string());

        let caps = TIMESTAMP_RE.captures(s).ok_or_else(invalid)?;
        let field = |i: usize| -> Result<u32, EventError> {
            caps[i].parse::<u32>().map_err(|_| invalid())
        };

        let year = i32::try_from(field(1)?).map_err(|_| invalid())?;
        let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?).ok_or_else(invalid)?;
        let datetime = date
            .and_hms_micro_opt(field(4)?, field(5)?, field(6)?, field(7)?)
            .ok_or_else(invalid)?;

        Ok(Self(datetime))
    }

    pub fn from_micros(micros: i64) -> Option<Self> {
        let secs = micros.div_euclid(MICROS_PER_SECOND);
        let nanos = (micros.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;
        DateTime::from_timestamp(secs, nanos).map(|dt| Self(dt.naive_utc()))
    }

    pub fn as_micros(&self) -> i64 {
        self.0.and_utc().timestamp_micros()
    }

    /// Signed distance from `earlier` to `self`, in microseconds.
    pub fn micros_since(&self, earlier: &Timestamp) -> i64 {
        self.as_micros() - earlier.as_micros()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}/{:02}/{:02} {:02}:{:02}:{:02}.{:06}",
            self.0.year(),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second(),
            self.0.nanosecond() / 1_000
        )
    }
}

impl FromStr for Timestamp {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
