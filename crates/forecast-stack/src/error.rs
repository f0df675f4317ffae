//! Error types for the forecast-stack crate.

use grib2_parser::Grib2Error;
use nwp_common::GridShape;
use thiserror::Error;

/// Invalid configuration, detected before any network access.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown model '{0}' (expected icon-eu or cosmo-d2)")]
    UnknownModel(String),

    #[error("Unknown precision '{0}' (expected float16, float32 or float64)")]
    UnknownPrecision(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failures talking to the archive. Recovered by the retry policy.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Failed to change directory to {path}: {reason}")]
    Navigate { path: String, reason: String },

    #[error("Failed to list {path}: {reason}")]
    Listing { path: String, reason: String },

    #[error("Failed to retrieve {name}: {reason}")]
    Retrieve { name: String, reason: String },

    #[error("Incomplete transfer of {name}: expected {expected} bytes, got {received}")]
    Incomplete {
        name: String,
        expected: u64,
        received: u64,
    },

    #[error("No open archive session")]
    NotConnected,

    #[error("Failed to close session: {0}")]
    Disconnect(String),

    #[error("Giving up {operation} after {attempts} attempts: {source}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<TransportError>,
    },
}

/// A payload that cannot be turned into a raster frame.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Failed to parse GRIB2 data: {0}")]
    Grib2(#[from] Grib2Error),
}

/// A file name without a parseable run timestamp or lead time.
#[derive(Error, Debug)]
pub enum FilenameError {
    #[error("File name {name} has {found} digit groups, layout needs {needed}")]
    MissingDigitGroups {
        name: String,
        found: usize,
        needed: usize,
    },

    #[error("Invalid run timestamp '{value}' in {name}")]
    InvalidTimestamp { name: String, value: String },

    #[error("Invalid lead time '{value}' in {name}")]
    InvalidLeadTime { name: String, value: String },
}

/// The default region and footprint collaborators cannot handle a grid.
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Region {region} does not intersect the grid extent {extent}")]
    NoIntersection { region: String, extent: String },

    #[error("Rotated geotransforms are not supported")]
    RotatedGrid,

    #[error("Region clipping needs a geographic CRS, got {0}")]
    NonGeographicCrs(String),
}

/// Frames that cannot be stacked.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Frame {index} has shape {found}, expected {expected}")]
    ShapeMismatch {
        index: usize,
        expected: GridShape,
        found: GridShape,
    },

    #[error("Frame {index} is on a different grid: {reason}")]
    GridMismatch { index: usize, reason: String },

    #[error("Cannot allocate {requested} more cells for the stack")]
    OutOfMemory { requested: usize },

    #[error("Crop window {window} at ({row_off}, {col_off}) exceeds frame {frame}")]
    WindowOutOfBounds {
        window: GridShape,
        row_off: usize,
        col_off: usize,
        frame: GridShape,
    },

    #[error("Stack has {frames} frames but {timestamps} timestamps")]
    TimestampMismatch { frames: usize, timestamps: usize },

    #[error("No frames were appended")]
    Empty,

    #[error("Region clipping failed: {0}")]
    Region(#[from] GeometryError),
}

/// Errors returned by a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Archive transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to decode forecast file: {0}")]
    Decode(#[from] DecodeError),

    #[error("Cannot timestamp forecast file: {0}")]
    Filename(#[from] FilenameError),

    #[error("stack assembly failed (insufficient memory or incompatible frames): {0}")]
    Assembly(#[from] AssemblyError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
