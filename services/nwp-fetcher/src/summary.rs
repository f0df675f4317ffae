//! JSON summary of an assembled forecast stack.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use forecast_stack::{CellValue, ForecastStack, FrameStats, Precision};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ForecastSummary {
    pub model: String,
    /// Run designator, e.g. "06"
    pub run: String,
    pub run_time: DateTime<Utc>,
    pub precision: Precision,
    pub rows: usize,
    pub cols: usize,
    pub depth: usize,
    /// GDAL-ordered geotransform
    pub transform: [f64; 6],
    pub crs: String,
    /// Masked-cell sentinel; `None` when it is NaN (half precision)
    pub nodata: Option<f64>,
    /// Valid times, ascending
    pub timestamps: Vec<DateTime<Utc>>,
    /// Frames in stack (retrieval) order
    pub frames: Vec<FrameSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub index: usize,
    pub valid_time: DateTime<Utc>,
    /// Absent when every cell is nodata
    pub stats: Option<FrameStats>,
}

impl ForecastSummary {
    pub fn from_stack<T: CellValue>(result: &ForecastStack<T>) -> Self {
        let stack = &result.stack;
        let frames = stack
            .frame_timestamps()
            .iter()
            .zip(stack.statistics())
            .enumerate()
            .map(|(index, (&valid_time, stats))| FrameSummary {
                index,
                valid_time,
                stats,
            })
            .collect();

        Self {
            model: result.run.model.to_string(),
            run: result.run.designator(),
            run_time: result.run.run_time(),
            precision: T::PRECISION,
            rows: stack.shape().rows,
            cols: stack.shape().cols,
            depth: stack.depth(),
            transform: stack.transform().to_gdal(),
            crs: stack.crs().to_string(),
            nodata: Some(stack.nodata().as_f64()).filter(|v| !v.is_nan()),
            timestamps: stack.timestamps().to_vec(),
            frames,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize forecast summary")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write summary: {}", path.display()))
    }
}
