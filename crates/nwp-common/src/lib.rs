//! Common types and utilities shared across the NWP stack crates.

pub mod bbox;
pub mod crs;
pub mod grid;
pub mod time;
pub mod transform;

pub use bbox::BoundingBox;
pub use crs::CrsCode;
pub use grid::{GridShape, ScanMode};
pub use time::ValidTime;
pub use transform::GeoTransform;
