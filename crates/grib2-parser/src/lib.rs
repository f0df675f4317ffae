//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! Covers what the NWP open-data products need: regular latitude/longitude
//! grids (template 3.0), analysis/forecast products (template 4.0), simple
//! packing (template 5.0) and bitmaps. Other templates are reported as
//! [`Grib2Error::UnsupportedTemplate`].

pub mod grid;
pub mod message;
pub mod sections;
pub mod unpacking;

pub use grid::DecodedGrid;
pub use message::{first_message, Grib2Message, Grib2Reader};
pub use unpacking::unpack_simple;

use thiserror::Error;

/// Errors raised while parsing GRIB2 data.
#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unsupported template {template} in section {section}")]
    UnsupportedTemplate { section: u8, template: u16 },

    #[error("Unpacking failed: {0}")]
    UnpackingError(String),
}

/// Result type for GRIB2 operations.
pub type Result<T> = std::result::Result<T, Grib2Error>;
