//! Geometry collaborators of the pipeline.
//!
//! The pipeline only needs two things from the geometry side: the crop window
//! for a region, and footprint polygons for the final stack cells. Both sit
//! behind traits so richer implementations (polygon clipping, projected
//! footprints) can be plugged in.

use nwp_common::{BoundingBox, CrsCode, GeoTransform, GridShape};
use serde::Serialize;

use crate::error::GeometryError;
use crate::stack::CropWindow;

/// Computes the crop window of a region on a grid.
pub trait RegionClipper: Send + Sync {
    fn clip(
        &self,
        shape: GridShape,
        transform: &GeoTransform,
        crs: CrsCode,
    ) -> Result<CropWindow, GeometryError>;
}

/// Builds one polygon per raster cell.
pub trait FootprintBuilder: Send + Sync {
    fn build(&self, transform: &GeoTransform, shape: GridShape, crs: CrsCode) -> FootprintGrid;
}

/// Keeps the whole frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullExtent;

impl RegionClipper for FullExtent {
    fn clip(
        &self,
        shape: GridShape,
        transform: &GeoTransform,
        _crs: CrsCode,
    ) -> Result<CropWindow, GeometryError> {
        Ok(CropWindow::full(shape, *transform))
    }
}

/// Crops to the cells covering a lon/lat bounding box, plus a margin.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBoxClipper {
    region: BoundingBox,
    buffer_cells: usize,
}

impl BoundingBoxClipper {
    pub fn new(region: BoundingBox, buffer_cells: usize) -> Self {
        Self {
            region,
            buffer_cells,
        }
    }

    pub fn region(&self) -> &BoundingBox {
        &self.region
    }
}

impl RegionClipper for BoundingBoxClipper {
    fn clip(
        &self,
        shape: GridShape,
        transform: &GeoTransform,
        crs: CrsCode,
    ) -> Result<CropWindow, GeometryError> {
        if !crs.is_geographic() {
            return Err(GeometryError::NonGeographicCrs(crs.to_string()));
        }

        let extent = transform.bounds(shape);
        let overlap =
            self.region
                .intersection(&extent)
                .ok_or_else(|| GeometryError::NoIntersection {
                    region: self.region.to_string(),
                    extent: extent.to_string(),
                })?;

        let (r1, c1) = transform
            .to_pixel(overlap.min_x, overlap.max_y)
            .ok_or(GeometryError::RotatedGrid)?;
        let (r2, c2) = transform
            .to_pixel(overlap.max_x, overlap.min_y)
            .ok_or(GeometryError::RotatedGrid)?;

        let row_start = (r1.min(r2).floor().max(0.0) as usize).saturating_sub(self.buffer_cells);
        let col_start = (c1.min(c2).floor().max(0.0) as usize).saturating_sub(self.buffer_cells);
        let row_end = ((r1.max(r2).ceil() as usize) + self.buffer_cells).min(shape.rows);
        let col_end = ((c1.max(c2).ceil() as usize) + self.buffer_cells).min(shape.cols);

        if row_end <= row_start || col_end <= col_start {
            return Err(GeometryError::NoIntersection {
                region: self.region.to_string(),
                extent: extent.to_string(),
            });
        }

        Ok(CropWindow {
            row_off: row_start,
            col_off: col_start,
            shape: GridShape::new(row_end - row_start, col_end - col_start),
            transform: transform.offset(row_start, col_start),
        })
    }
}

/// Closed ring of a cell: four corners clockwise from the top-left, then the first again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellPolygon(pub [(f64, f64); 5]);

impl CellPolygon {
    pub fn centroid(&self) -> (f64, f64) {
        let ring = &self.0[..4];
        let x = ring.iter().map(|p| p.0).sum::<f64>() / 4.0;
        let y = ring.iter().map(|p| p.1).sum::<f64>() / 4.0;
        (x, y)
    }
}

/// Footprint polygons of a stack, row-major like the stack cells.
#[derive(Debug, Clone, Serialize)]
pub struct FootprintGrid {
    pub crs: CrsCode,
    pub shape: GridShape,
    pub cells: Vec<CellPolygon>,
}

impl FootprintGrid {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellPolygon> {
        if row >= self.shape.rows || col >= self.shape.cols {
            return None;
        }
        self.cells.get(row * self.shape.cols + col)
    }
}

/// One rectangle per cell, straight from the geotransform.
#[derive(Debug, Clone, Copy, Default)]
pub struct RectangularFootprint;

impl FootprintBuilder for RectangularFootprint {
    fn build(&self, transform: &GeoTransform, shape: GridShape, crs: CrsCode) -> FootprintGrid {
        let mut cells = Vec::with_capacity(shape.len());
        for row in 0..shape.rows {
            for col in 0..shape.cols {
                let (r, c) = (row as f64, col as f64);
                let top_left = transform.corner(r, c);
                cells.push(CellPolygon([
                    top_left,
                    transform.corner(r, c + 1.0),
                    transform.corner(r + 1.0, c + 1.0),
                    transform.corner(r + 1.0, c),
                    top_left,
                ]));
            }
        }
        FootprintGrid { crs, shape, cells }
    }
}
