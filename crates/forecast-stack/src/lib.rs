//! NWP forecast stack library.
//!
//! Selects the latest usable model run, retrieves every forecast file of one
//! feature from the open-data archive and assembles the decoded frames into a
//! time-ordered raster stack.
//!
//! # Architecture
//!
//! The pipeline is strictly sequential:
//!
//! - [`RunSelector`] picks the run from the current time and a safety buffer
//! - [`ConnectionManager`] keeps an archive session alive (reconnect + re-navigate)
//! - [`FileCatalog`] lists the run directory and keeps one grid resolution
//! - [`RetrievalEngine`] downloads each file completely into memory
//! - [`decoder`] turns `.grib2.bz2` payloads into [`RasterFrame`]s
//! - [`StackBuilder`] crops and appends frames and collects valid times
//! - [`ForecastPipeline`] sequences the above and builds the footprint grid

pub mod archive;
pub mod catalog;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod filename;
pub mod geometry;
pub mod model;
pub mod pipeline;
pub mod precision;
pub mod retrieval;
pub mod retry;
pub mod stack;

// Re-exports
pub use archive::{ArchiveConnector, ArchiveSession, HttpArchive, HttpArchiveConfig};
pub use catalog::FileCatalog;
pub use connection::{ConnectionManager, SessionState};
pub use error::{
    AssemblyError, ConfigError, DecodeError, FilenameError, GeometryError, PipelineError, Result,
    TransportError,
};
pub use filename::{DigitField, FileNameLayout, ForecastFileName};
pub use geometry::{
    BoundingBoxClipper, CellPolygon, FootprintBuilder, FootprintGrid, FullExtent,
    RectangularFootprint, RegionClipper,
};
pub use model::{ForecastModel, ForecastRun, RunSelector};
pub use pipeline::{ForecastPipeline, ForecastRequest, ForecastStack};
pub use precision::{CellValue, Precision};
pub use retrieval::RetrievalEngine;
pub use retry::RetryPolicy;
pub use stack::{CropWindow, FrameStats, RasterFrame, RasterStack, StackBuilder, NODATA};
