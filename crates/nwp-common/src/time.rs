//! Time handling utilities for forecast data.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Layout of the run timestamp embedded in archive file names.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d%H";

/// A valid time for forecast data.
///
/// Combines reference time (model run time) and lead time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidTime {
    /// Model run/reference time
    pub reference_time: DateTime<Utc>,
    /// Lead time in hours from the reference time
    pub lead_hours: u32,
}

impl ValidTime {
    pub fn new(reference_time: DateTime<Utc>, lead_hours: u32) -> Self {
        Self {
            reference_time,
            lead_hours,
        }
    }

    /// Calculate the actual valid time (reference + lead time)
    pub fn valid_datetime(&self) -> DateTime<Utc> {
        self.reference_time + Duration::hours(self.lead_hours as i64)
    }

    /// Parse a `YYYYMMDDHH` run timestamp as UTC.
    pub fn parse_run_timestamp(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
        if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimeParseError::InvalidFormat(s.to_string()));
        }
        // chrono needs minutes to build a NaiveDateTime
        let ndt = NaiveDateTime::parse_from_str(&format!("{s}00"), "%Y%m%d%H%M")
            .map_err(|_| TimeParseError::InvalidFormat(s.to_string()))?;
        Ok(Utc.from_utc_datetime(&ndt))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}
