//! Coordinate Reference System identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Well-known CRS codes the fetcher deals with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lat/lon in degrees)
    Epsg4326,
    /// ETRS89 / UTM zone 33N (meters)
    Epsg25833,
    /// ETRS89 / UTM zone 32N (meters)
    Epsg25832,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Parse "EPSG:4326" style identifiers, case-insensitively.
    ///
    /// "CRS:84" is accepted as an alias of EPSG:4326.
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" => Ok(CrsCode::Epsg4326),
            "EPSG:25833" => Ok(CrsCode::Epsg25833),
            "EPSG:25832" => Ok(CrsCode::Epsg25832),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg25833 => 25833,
            CrsCode::Epsg25832 => 25832,
            CrsCode::Epsg3857 => 3857,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }
}

impl FromStr for CrsCode {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrsCode::parse(s)
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}
