//! Raster frames and their assembly into a time stack.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use nwp_common::{CrsCode, GeoTransform, GridShape};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AssemblyError;
use crate::geometry::{FullExtent, RegionClipper};
use crate::precision::CellValue;

/// Nodata sentinel written for masked cells (GDAL's GRIB default).
///
/// Used by f32 and f64 stacks; f16 cannot hold it and uses NaN instead,
/// see [`CellValue::NODATA`].
pub const NODATA: f64 = 9999.0;

/// Transforms of frames on the same grid agree to within this many degrees.
const TRANSFORM_TOLERANCE: f64 = 1e-6;

/// One decoded timestep.
#[derive(Debug, Clone)]
pub struct RasterFrame<T> {
    pub shape: GridShape,
    /// Row-major, row 0 northernmost.
    pub data: Vec<T>,
    pub nodata: T,
    pub transform: GeoTransform,
    pub crs: CrsCode,
}

impl<T: CellValue> RasterFrame<T> {
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.shape.rows || col >= self.shape.cols {
            return None;
        }
        self.data.get(row * self.shape.cols + col).copied()
    }

    pub fn statistics(&self) -> Option<FrameStats> {
        FrameStats::compute(&self.data, self.nodata)
    }
}

/// Summary of the valid cells of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid_cells: usize,
}

impl FrameStats {
    /// `None` when every cell is nodata or NaN.
    pub fn compute<T: CellValue>(values: &[T], nodata: T) -> Option<Self> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut valid_cells = 0;

        for &v in values {
            if v.is_nodata(nodata) || v.is_nan() {
                continue;
            }
            let v = v.as_f64();
            min = min.min(v);
            max = max.max(v);
            sum += v;
            valid_cells += 1;
        }

        (valid_cells > 0).then(|| Self {
            min,
            max,
            mean: sum / valid_cells as f64,
            valid_cells,
        })
    }
}

/// Row/column window cut out of every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub shape: GridShape,
    /// Transform of the window's first cell.
    pub transform: GeoTransform,
}

impl CropWindow {
    /// The whole frame.
    pub fn full(shape: GridShape, transform: GeoTransform) -> Self {
        Self {
            row_off: 0,
            col_off: 0,
            shape,
            transform,
        }
    }

    /// Whether the window lies inside a frame of `frame` shape.
    pub fn fits(&self, frame: GridShape) -> bool {
        !self.shape.is_empty()
            && self.row_off + self.shape.rows <= frame.rows
            && self.col_off + self.shape.cols <= frame.cols
    }
}

/// Frames of one feature stacked along time.
///
/// Frames stay in the order they were appended; `timestamps` is sorted
/// ascending independently of that order. `frame_timestamps` keeps the
/// valid time of each frame in frame order.
#[derive(Debug, Clone)]
pub struct RasterStack<T> {
    shape: GridShape,
    transform: GeoTransform,
    crs: CrsCode,
    nodata: T,
    depth: usize,
    data: Vec<T>,
    timestamps: Vec<DateTime<Utc>>,
    frame_timestamps: Vec<DateTime<Utc>>,
}

impl<T: CellValue> RasterStack<T> {
    /// Number of frames.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Shape of each (cropped) frame.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> CrsCode {
        self.crs
    }

    pub fn nodata(&self) -> T {
        self.nodata
    }

    /// Valid times, ascending.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Valid time of frame `i` at index `i`.
    pub fn frame_timestamps(&self) -> &[DateTime<Utc>] {
        &self.frame_timestamps
    }

    /// Cells of frame `index`, row-major.
    pub fn frame(&self, index: usize) -> Option<&[T]> {
        let n = self.shape.len();
        self.data.get(index * n..(index + 1) * n)
    }

    pub fn frames(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks_exact(self.shape.len())
    }

    pub fn get(&self, index: usize, row: usize, col: usize) -> Option<T> {
        if row >= self.shape.rows || col >= self.shape.cols {
            return None;
        }
        self.frame(index)?.get(row * self.shape.cols + col).copied()
    }

    /// Per-frame statistics over valid cells.
    pub fn statistics(&self) -> Vec<Option<FrameStats>> {
        self.frames()
            .map(|frame| FrameStats::compute(frame, self.nodata))
            .collect()
    }
}

/// Grid properties fixed by the first frame.
#[derive(Debug, Clone, Copy)]
struct Reference<T> {
    shape: GridShape,
    transform: GeoTransform,
    crs: CrsCode,
    nodata: T,
    window: CropWindow,
}

/// Builds a [`RasterStack`] frame by frame.
pub struct StackBuilder<T> {
    clipper: Arc<dyn RegionClipper>,
    reference: Option<Reference<T>>,
    depth: usize,
    data: Vec<T>,
    timestamps: Vec<DateTime<Utc>>,
}

impl<T: CellValue> StackBuilder<T> {
    /// Builder that keeps the full frame extent.
    pub fn new() -> Self {
        Self::with_clipper(Arc::new(FullExtent))
    }

    /// Builder that crops every frame to the window `clipper` computes for the first one.
    pub fn with_clipper(clipper: Arc<dyn RegionClipper>) -> Self {
        Self {
            clipper,
            reference: None,
            depth: 0,
            data: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Crop `frame` and append it with its valid time.
    pub fn append(
        &mut self,
        frame: RasterFrame<T>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), AssemblyError> {
        let index = self.depth;
        let reference = match self.reference {
            Some(reference) => {
                Self::validate(index, &reference, &frame)?;
                reference
            }
            None => {
                let reference = self.fix_reference(&frame)?;
                self.reference = Some(reference);
                reference
            }
        };

        let window = reference.window;
        self.data
            .try_reserve(window.shape.len())
            .map_err(|_| AssemblyError::OutOfMemory {
                requested: window.shape.len(),
            })?;
        self.timestamps
            .try_reserve(1)
            .map_err(|_| AssemblyError::OutOfMemory { requested: 1 })?;

        let remap = !frame.nodata.is_nodata(reference.nodata);
        for row in window.row_off..window.row_off + window.shape.rows {
            let start = row * frame.shape.cols + window.col_off;
            let cells = &frame.data[start..start + window.shape.cols];
            if remap {
                self.data.extend(cells.iter().map(|&v| {
                    if v.is_nodata(frame.nodata) {
                        reference.nodata
                    } else {
                        v
                    }
                }));
            } else {
                self.data.extend_from_slice(cells);
            }
        }

        self.timestamps.push(timestamp);
        self.depth += 1;
        counter!("nwp_frames_stacked_total").increment(1);
        debug!(index = index, timestamp = %timestamp, "Appended frame");
        Ok(())
    }

    /// Finish the stack, sorting timestamps ascending.
    pub fn finalize(self) -> Result<RasterStack<T>, AssemblyError> {
        let Some(reference) = self.reference else {
            return Err(AssemblyError::Empty);
        };

        if self.timestamps.len() != self.depth {
            return Err(AssemblyError::TimestampMismatch {
                frames: self.depth,
                timestamps: self.timestamps.len(),
            });
        }

        if !self.timestamps.windows(2).all(|w| w[0] <= w[1]) {
            warn!(
                frames = self.depth,
                "Frames were retrieved out of chronological order; stack keeps retrieval order"
            );
        }
        let mut sorted = Vec::new();
        sorted
            .try_reserve(self.timestamps.len())
            .map_err(|_| AssemblyError::OutOfMemory {
                requested: self.timestamps.len(),
            })?;
        sorted.extend_from_slice(&self.timestamps);
        sorted.sort();

        Ok(RasterStack {
            shape: reference.window.shape,
            transform: reference.window.transform,
            crs: reference.crs,
            nodata: reference.nodata,
            depth: self.depth,
            data: self.data,
            timestamps: sorted,
            frame_timestamps: self.timestamps,
        })
    }

    fn fix_reference(&self, frame: &RasterFrame<T>) -> Result<Reference<T>, AssemblyError> {
        if frame.data.len() != frame.shape.len() {
            return Err(AssemblyError::GridMismatch {
                index: 0,
                reason: format!(
                    "{} cells for a {} grid",
                    frame.data.len(),
                    frame.shape
                ),
            });
        }

        let window = self.clipper.clip(frame.shape, &frame.transform, frame.crs)?;
        if !window.fits(frame.shape) {
            return Err(AssemblyError::WindowOutOfBounds {
                window: window.shape,
                row_off: window.row_off,
                col_off: window.col_off,
                frame: frame.shape,
            });
        }

        debug!(
            frame = %frame.shape,
            window = %window.shape,
            row_off = window.row_off,
            col_off = window.col_off,
            "Fixed crop window"
        );

        Ok(Reference {
            shape: frame.shape,
            transform: frame.transform,
            crs: frame.crs,
            nodata: frame.nodata,
            window,
        })
    }

    fn validate(
        index: usize,
        reference: &Reference<T>,
        frame: &RasterFrame<T>,
    ) -> Result<(), AssemblyError> {
        if frame.shape != reference.shape {
            return Err(AssemblyError::ShapeMismatch {
                index,
                expected: reference.shape,
                found: frame.shape,
            });
        }
        if frame.data.len() != frame.shape.len() {
            return Err(AssemblyError::GridMismatch {
                index,
                reason: format!("{} cells for a {} grid", frame.data.len(), frame.shape),
            });
        }
        if frame.crs != reference.crs {
            return Err(AssemblyError::GridMismatch {
                index,
                reason: format!("CRS {} differs from {}", frame.crs, reference.crs),
            });
        }
        if !frame
            .transform
            .approx_eq(&reference.transform, TRANSFORM_TOLERANCE)
        {
            return Err(AssemblyError::GridMismatch {
                index,
                reason: format!(
                    "transform {:?} differs from {:?}",
                    frame.transform.to_gdal(),
                    reference.transform.to_gdal()
                ),
            });
        }
        Ok(())
    }
}

impl<T: CellValue> Default for StackBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBoxClipper;
    use chrono::TimeZone;
    use half::f16;
    use nwp_common::BoundingBox;

    fn transform() -> GeoTransform {
        GeoTransform::north_up(10.0, 1.0, 55.0, -1.0)
    }

    fn frame(rows: usize, cols: usize, offset: f32) -> RasterFrame<f32> {
        RasterFrame {
            shape: GridShape::new(rows, cols),
            data: (0..rows * cols).map(|i| i as f32 + offset).collect(),
            nodata: NODATA as f32,
            transform: transform(),
            crs: CrsCode::Epsg4326,
        }
    }

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_append_full_extent() {
        let mut builder = StackBuilder::new();
        builder.append(frame(3, 4, 0.0), hour(1)).unwrap();
        builder.append(frame(3, 4, 100.0), hour(2)).unwrap();
        let stack = builder.finalize().unwrap();

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.shape(), GridShape::new(3, 4));
        assert_eq!(stack.timestamps().len(), stack.depth());
        assert_eq!(stack.get(1, 2, 3), Some(111.0));
        assert_eq!(stack.frames().count(), 2);
    }

    #[test]
    fn test_window_fixed_on_first_frame() {
        // Cells cover lon 10..14, lat 52..55; keep lon 11..12.5, lat 53..54
        let clipper = BoundingBoxClipper::new(BoundingBox::new(11.2, 53.2, 12.5, 53.8), 0);
        let mut builder = StackBuilder::with_clipper(Arc::new(clipper));
        builder.append(frame(3, 4, 0.0), hour(1)).unwrap();
        builder.append(frame(3, 4, 100.0), hour(2)).unwrap();
        let stack = builder.finalize().unwrap();

        assert_eq!(stack.shape(), GridShape::new(1, 2));
        assert_eq!(stack.frame(0).unwrap(), &[5.0, 6.0]);
        assert_eq!(stack.frame(1).unwrap(), &[105.0, 106.0]);
        assert_eq!(stack.transform().origin_x, 11.0);
        assert_eq!(stack.transform().origin_y, 54.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let mut builder = StackBuilder::new();
        builder.append(frame(3, 4, 0.0), hour(1)).unwrap();
        let err = builder.append(frame(4, 4, 0.0), hour(2)).unwrap_err();
        assert!(matches!(err, AssemblyError::ShapeMismatch { index: 1, .. }));
    }

    #[test]
    fn test_grid_mismatch_on_shifted_transform() {
        let mut builder = StackBuilder::new();
        builder.append(frame(3, 4, 0.0), hour(1)).unwrap();

        let mut shifted = frame(3, 4, 0.0);
        shifted.transform = GeoTransform::north_up(10.5, 1.0, 55.0, -1.0);
        assert!(matches!(
            builder.append(shifted, hour(2)),
            Err(AssemblyError::GridMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_finalize_empty() {
        let builder: StackBuilder<f32> = StackBuilder::new();
        assert!(matches!(builder.finalize(), Err(AssemblyError::Empty)));
    }

    #[test]
    fn test_timestamps_sorted_frames_not_permuted() {
        let mut builder = StackBuilder::new();
        builder.append(frame(2, 2, 30.0), hour(3)).unwrap();
        builder.append(frame(2, 2, 10.0), hour(1)).unwrap();
        builder.append(frame(2, 2, 20.0), hour(2)).unwrap();
        let stack = builder.finalize().unwrap();

        assert_eq!(stack.timestamps(), &[hour(1), hour(2), hour(3)]);
        // Retrieval order is kept
        assert_eq!(stack.get(0, 0, 0), Some(30.0));
        assert_eq!(stack.get(1, 0, 0), Some(10.0));
        assert_eq!(stack.frame_timestamps(), &[hour(3), hour(1), hour(2)]);
    }

    #[test]
    fn test_nodata_remapped_to_reference() {
        let mut builder = StackBuilder::new();
        builder.append(frame(1, 2, 0.0), hour(1)).unwrap();

        let mut other = frame(1, 2, 0.0);
        other.nodata = -1.0;
        other.data = vec![-1.0, 4.0];
        builder.append(other, hour(2)).unwrap();

        let stack = builder.finalize().unwrap();
        assert_eq!(stack.frame(1).unwrap(), &[NODATA as f32, 4.0]);
    }

    #[test]
    fn test_statistics_skip_nodata() {
        let frame = RasterFrame {
            shape: GridShape::new(1, 4),
            data: vec![1.0_f32, 3.0, NODATA as f32, f32::NAN],
            nodata: NODATA as f32,
            transform: transform(),
            crs: CrsCode::Epsg4326,
        };
        let stats = frame.statistics().unwrap();
        assert_eq!(stats.valid_cells, 2);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.mean, 2.0);
    }

    #[test]
    fn test_half_precision_stack() {
        let half_frame = RasterFrame {
            shape: GridShape::new(1, 3),
            data: vec![f16::from_f32(0.5), f16::from_f32(12.25), f16::NAN],
            nodata: <f16 as CellValue>::NODATA,
            transform: transform(),
            crs: CrsCode::Epsg4326,
        };
        let mut builder = StackBuilder::new();
        builder.append(half_frame, hour(0)).unwrap();
        let stack = builder.finalize().unwrap();

        let stats = stack.statistics();
        assert_eq!(stats[0].unwrap().max, 12.25);
        assert_eq!(stats[0].unwrap().valid_cells, 2);
        assert!(stack.get(0, 0, 2).unwrap().is_nan());
        assert!(stack.nodata().is_nan());
    }

    #[test]
    fn test_half_precision_nan_sentinel_not_remapped() {
        let half_frame = || RasterFrame {
            shape: GridShape::new(1, 2),
            data: vec![f16::NAN, f16::from_f32(2.0)],
            nodata: <f16 as CellValue>::NODATA,
            transform: transform(),
            crs: CrsCode::Epsg4326,
        };
        let mut builder = StackBuilder::new();
        builder.append(half_frame(), hour(0)).unwrap();
        builder.append(half_frame(), hour(1)).unwrap();
        let stack = builder.finalize().unwrap();

        assert!(stack.get(1, 0, 0).unwrap().is_nan());
        assert_eq!(stack.get(1, 0, 1), Some(f16::from_f32(2.0)));
    }
}
