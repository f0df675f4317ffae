//! Forecast models and run selection.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::error::ConfigError;
use crate::filename::{DigitField, FileNameLayout};

/// Models published on the DWD open-data archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForecastModel {
    IconEu,
    CosmoD2,
}

impl ForecastModel {
    /// Identifier used in archive paths and file names.
    pub fn id(&self) -> &'static str {
        match self {
            ForecastModel::IconEu => "icon-eu",
            ForecastModel::CosmoD2 => "cosmo-d2",
        }
    }

    /// UTC hours at which the model is run, ascending.
    pub fn run_hours(&self) -> &'static [u32] {
        match self {
            ForecastModel::IconEu => &[0, 6, 12, 18],
            ForecastModel::CosmoD2 => &[0, 6, 9, 12, 15, 18, 21],
        }
    }

    /// Digit-group layout of this model's file names.
    ///
    /// cosmo-d2 names carry the "2" of "d2" ahead of the run timestamp.
    pub fn file_layout(&self) -> FileNameLayout {
        match self {
            ForecastModel::IconEu => FileNameLayout::new(&[DigitField::Base, DigitField::Lead]),
            ForecastModel::CosmoD2 => FileNameLayout::new(&[
                DigitField::Ignored,
                DigitField::Base,
                DigitField::Lead,
            ]),
        }
    }
}

impl FromStr for ForecastModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "icon-eu" => Ok(ForecastModel::IconEu),
            "cosmo-d2" => Ok(ForecastModel::CosmoD2),
            _ => Err(ConfigError::UnknownModel(s.to_string())),
        }
    }
}

impl fmt::Display for ForecastModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// The model run chosen for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForecastRun {
    pub model: ForecastModel,
    /// UTC date the run belongs to.
    pub date: NaiveDate,
    /// Run start hour, always one of `model.run_hours()`.
    pub run_hour: u32,
    pub buffer_hours: u32,
}

impl ForecastRun {
    /// Two-digit run designator, e.g. "06".
    pub fn designator(&self) -> String {
        format!("{:02}", self.run_hour)
    }

    /// Start of the run.
    pub fn run_time(&self) -> DateTime<Utc> {
        let midnight = Utc.from_utc_datetime(&self.date.and_time(chrono::NaiveTime::MIN));
        midnight + Duration::hours(self.run_hour as i64)
    }

    pub fn valid_run_hours(&self) -> &'static [u32] {
        self.model.run_hours()
    }

    /// Archive directory holding one feature of this run.
    pub fn archive_path(&self, feature: &str) -> String {
        format!(
            "weather/nwp/{}/grib/{}/{}/",
            self.model.id(),
            self.designator(),
            feature
        )
    }
}

impl fmt::Display for ForecastRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}T{}Z", self.model, self.date, self.designator())
    }
}

/// Picks the most recent run that finished at least `buffer_hours` ago.
#[derive(Debug, Clone, Copy)]
pub struct RunSelector {
    model: ForecastModel,
    buffer_hours: u32,
}

impl RunSelector {
    pub fn new(model: ForecastModel, buffer_hours: u32) -> Self {
        Self {
            model,
            buffer_hours,
        }
    }

    /// Select the run for `now`.
    ///
    /// With `reference = now - buffer`, the chosen run hour `r` has the largest
    /// strictly negative `r - reference.hour()`. When no run of the reference
    /// day qualifies, the last run of the previous day is used.
    pub fn select(&self, now: DateTime<Utc>) -> ForecastRun {
        let reference = now - Duration::hours(self.buffer_hours as i64);
        let reference_hour = reference.hour() as i64;
        let hours = self.model.run_hours();

        let same_day = hours
            .iter()
            .copied()
            .filter(|&r| (r as i64) - reference_hour < 0)
            .max_by_key(|&r| (r as i64) - reference_hour);

        let (date, run_hour) = match same_day {
            Some(r) => (reference.date_naive(), r),
            None => {
                let previous = reference.date_naive() - Duration::days(1);
                // run_hours() is never empty
                (previous, hours.last().copied().unwrap_or(0))
            }
        };

        ForecastRun {
            model: self.model,
            date,
            run_hour,
            buffer_hours: self.buffer_hours,
        }
    }
}
