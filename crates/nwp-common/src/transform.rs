//! Six-parameter affine geotransform.

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, GridShape};

/// Affine transform mapping (row, col) grid indices to coordinates.
///
/// Coefficients follow GDAL ordering:
/// `x = origin_x + col * pixel_width + row * row_rotation`
/// `y = origin_y + col * col_rotation + row * pixel_height`
///
/// `(origin_x, origin_y)` is the outer corner of cell (0, 0), not its center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation.
    ///
    /// `pixel_height` is negative for rasters whose first row is the northernmost.
    pub fn north_up(origin_x: f64, pixel_width: f64, origin_y: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    pub fn is_rotated(&self) -> bool {
        self.row_rotation != 0.0 || self.col_rotation != 0.0
    }

    /// Coordinate of the outer corner of a cell.
    pub fn corner(&self, row: f64, col: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Coordinate of a cell center.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.corner(row as f64 + 0.5, col as f64 + 0.5)
    }

    /// Fractional (row, col) for a coordinate. Returns `None` for rotated transforms.
    pub fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.is_rotated() || self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return None;
        }
        Some((
            (y - self.origin_y) / self.pixel_height,
            (x - self.origin_x) / self.pixel_width,
        ))
    }

    /// Transform of a sub-window starting at (row_off, col_off).
    pub fn offset(&self, row_off: usize, col_off: usize) -> Self {
        let (origin_x, origin_y) = self.corner(row_off as f64, col_off as f64);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Extent covered by a grid of the given shape.
    pub fn bounds(&self, shape: GridShape) -> BoundingBox {
        let corners = [
            self.corner(0.0, 0.0),
            self.corner(0.0, shape.cols as f64),
            self.corner(shape.rows as f64, 0.0),
            self.corner(shape.rows as f64, shape.cols as f64),
        ];
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }

    /// Coefficient-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}
