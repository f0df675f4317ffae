//! Grid shape and scanning-order helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Spatial shape of a raster, rows first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Scan mode flags for grid data ordering.
///
/// Based on GRIB2 scanning mode (Flag Table 3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMode {
    /// +i direction: false = +x (east), true = -x (west)
    pub i_negative: bool,
    /// +j direction: false = -y (south), true = +y (north)
    pub j_positive: bool,
    /// Adjacent points: false = i direction, true = j direction
    pub j_consecutive: bool,
    /// Row scan direction alternates
    pub alternating_rows: bool,
}

impl ScanMode {
    /// Data starts at top-left, rows go west to east, columns go north to south.
    pub fn standard() -> Self {
        Self {
            i_negative: false,
            j_positive: false,
            j_consecutive: false,
            alternating_rows: false,
        }
    }

    /// Create from GRIB2 flag byte.
    pub fn from_grib2_flag(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
            alternating_rows: (flag & 0x10) != 0,
        }
    }

    /// Index into the scanned value sequence for the north-up (row, col) cell.
    ///
    /// Row 0 is the northernmost row and column 0 the westernmost column.
    pub fn source_index(&self, row: usize, col: usize, shape: GridShape) -> usize {
        let j = if self.j_positive {
            shape.rows - 1 - row
        } else {
            row
        };
        let mut i = if self.i_negative {
            shape.cols - 1 - col
        } else {
            col
        };
        if self.alternating_rows && j % 2 == 1 {
            i = shape.cols - 1 - i;
        }

        if self.j_consecutive {
            i * shape.rows + j
        } else {
            j * shape.cols + i
        }
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_is_identity() {
        let shape = GridShape::new(3, 4);
        let scan = ScanMode::standard();
        assert_eq!(scan.source_index(0, 0, shape), 0);
        assert_eq!(scan.source_index(1, 2, shape), 6);
        assert_eq!(scan.source_index(2, 3, shape), 11);
    }

    #[test]
    fn test_south_to_north_flips_rows() {
        // DWD regular-lat-lon products scan +j (flag 0x40)
        let shape = GridShape::new(3, 4);
        let scan = ScanMode::from_grib2_flag(0x40);
        assert!(scan.j_positive);
        assert_eq!(scan.source_index(0, 0, shape), 8);
        assert_eq!(scan.source_index(2, 3, shape), 3);
    }

    #[test]
    fn test_column_major() {
        let shape = GridShape::new(2, 3);
        let scan = ScanMode::from_grib2_flag(0x20);
        assert_eq!(scan.source_index(1, 0, shape), 1);
        assert_eq!(scan.source_index(0, 2, shape), 4);
    }
}
