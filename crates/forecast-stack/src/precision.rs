//! Cell precision of decoded rasters.

use std::fmt;
use std::str::FromStr;

use half::f16;
use num_traits::Float;
use serde::Serialize;

use crate::error::ConfigError;
use crate::stack::NODATA;

/// Floating-point cell type a stack can be built with.
pub trait CellValue: Float + Send + Sync + fmt::Debug + 'static {
    const PRECISION: Precision;

    /// Sentinel for masked cells. Must be exactly representable in `Self`.
    const NODATA: Self;

    fn from_f32(value: f32) -> Self;

    fn as_f64(self) -> f64;

    /// Whether `self` is the `nodata` sentinel; a NaN sentinel matches any NaN.
    fn is_nodata(self, nodata: Self) -> bool {
        self == nodata || (nodata.is_nan() && self.is_nan())
    }
}

impl CellValue for f16 {
    const PRECISION: Precision = Precision::Float16;
    // 9999 rounds to 10000 in half precision
    const NODATA: Self = f16::NAN;

    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }

    fn as_f64(self) -> f64 {
        self.to_f64()
    }
}

impl CellValue for f32 {
    const PRECISION: Precision = Precision::Float32;
    const NODATA: Self = NODATA as f32;

    fn from_f32(value: f32) -> Self {
        value
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl CellValue for f64 {
    const PRECISION: Precision = Precision::Float64;
    const NODATA: Self = NODATA;

    fn from_f32(value: f32) -> Self {
        value as f64
    }

    fn as_f64(self) -> f64 {
        self
    }
}

/// Configured precision, selecting the [`CellValue`] type at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Float16,
    Float32,
    Float64,
}

impl Precision {
    pub fn bytes_per_cell(&self) -> usize {
        match self {
            Precision::Float16 => 2,
            Precision::Float32 => 4,
            Precision::Float64 => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Float16 => "float16",
            Precision::Float32 => "float32",
            Precision::Float64 => "float64",
        }
    }
}

impl FromStr for Precision {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float16" | "f16" | "half" => Ok(Precision::Float16),
            "float32" | "f32" | "single" => Ok(Precision::Float32),
            "float64" | "f64" | "double" => Ok(Precision::Float64),
            _ => Err(ConfigError::UnknownPrecision(s.to_string())),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
