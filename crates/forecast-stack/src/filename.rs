//! Timestamps from archive file names.
//!
//! Names are split into maximal runs of ASCII digits ("digit groups") and the
//! groups are matched against a per-model layout. For
//! `icon-eu_europe_regular-lat-lon_single-level_2023010100_005_TOT_PREC.grib2.bz2`
//! the groups are `2023010100`, `005`, `2`, `2`; the trailing groups from
//! `.grib2.bz2` (and from feature names like `T_2M`) are ignored.

use chrono::{DateTime, Utc};
use nwp_common::ValidTime;

use crate::error::FilenameError;

/// Meaning of one leading digit group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitField {
    /// Part of the model name, e.g. the "2" of "cosmo-d2".
    Ignored,
    /// Run start as `YYYYMMDDHH`.
    Base,
    /// Lead time in hours.
    Lead,
}

/// Ordered fields of the leading digit groups. Later groups are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameLayout {
    fields: Vec<DigitField>,
}

impl FileNameLayout {
    pub fn new(fields: &[DigitField]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }

    pub fn fields(&self) -> &[DigitField] {
        &self.fields
    }
}

/// A forecast file name with its run timestamp and lead time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastFileName {
    pub name: String,
    pub base: DateTime<Utc>,
    pub lead_hours: u32,
}

impl ForecastFileName {
    pub fn parse(name: &str, layout: &FileNameLayout) -> Result<Self, FilenameError> {
        let groups = digit_groups(name);
        if groups.len() < layout.fields.len() {
            return Err(FilenameError::MissingDigitGroups {
                name: name.to_string(),
                found: groups.len(),
                needed: layout.fields.len(),
            });
        }

        let mut base = None;
        let mut lead = None;
        for (field, group) in layout.fields.iter().zip(&groups) {
            match field {
                DigitField::Ignored => {}
                DigitField::Base => {
                    let parsed = ValidTime::parse_run_timestamp(group).map_err(|_| {
                        FilenameError::InvalidTimestamp {
                            name: name.to_string(),
                            value: group.to_string(),
                        }
                    })?;
                    base = Some(parsed);
                }
                DigitField::Lead => {
                    let parsed = group.parse::<u32>().map_err(|_| {
                        FilenameError::InvalidLeadTime {
                            name: name.to_string(),
                            value: group.to_string(),
                        }
                    })?;
                    lead = Some(parsed);
                }
            }
        }

        match (base, lead) {
            (Some(base), Some(lead_hours)) => Ok(Self {
                name: name.to_string(),
                base,
                lead_hours,
            }),
            _ => Err(FilenameError::MissingDigitGroups {
                name: name.to_string(),
                found: groups.len(),
                needed: layout.fields.len(),
            }),
        }
    }

    /// Absolute time the file represents: run start plus lead time.
    pub fn valid_time(&self) -> DateTime<Utc> {
        ValidTime::new(self.base, self.lead_hours).valid_datetime()
    }
}

fn digit_groups(name: &str) -> Vec<&str> {
    name.split(|c: char| !c.is_ascii_digit())
        .filter(|group| !group.is_empty())
        .collect()
}
