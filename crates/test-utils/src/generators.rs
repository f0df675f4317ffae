//! Test data generators for creating synthetic forecast data.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 100 + row`
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 100.0);  // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 100 + row) as f32);
        }
    }
    data
}

/// Creates a test grid with precipitation-like values in kg/m².
///
/// Most cells are dry; the rest get up to 50 mm. The pattern is
/// deterministic for a given seed.
pub fn create_precipitation_grid(width: usize, height: usize, seed: u32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let hash = simple_hash(col as u32, row as u32, seed);
            let precip = if hash % 4 == 0 {
                (hash % 5000) as f32 / 100.0
            } else {
                0.0
            };
            data.push(precip);
        }
    }
    data
}

/// Accumulated precipitation after `lead_hours`: non-decreasing in lead time.
pub fn create_accumulated_precipitation(
    width: usize,
    height: usize,
    seed: u32,
    lead_hours: u32,
) -> Vec<f32> {
    create_precipitation_grid(width, height, seed)
        .into_iter()
        .map(|rate| rate * lead_hours as f32 / 10.0)
        .collect()
}

// Simple deterministic pseudo-random (murmur3 finalizer)
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// DWD open-data file name for a regular lat/lon single-level field.
///
/// ```
/// use test_utils::dwd_file_name;
///
/// assert_eq!(
///     dwd_file_name("icon-eu", "europe", "2023010100", 5, "TOT_PREC"),
///     "icon-eu_europe_regular-lat-lon_single-level_2023010100_005_TOT_PREC.grib2.bz2"
/// );
/// ```
pub fn dwd_file_name(
    model: &str,
    region: &str,
    run: &str,
    lead_hours: u32,
    feature: &str,
) -> String {
    format!(
        "{}_{}_regular-lat-lon_single-level_{}_{:03}_{}.grib2.bz2",
        model, region, run, lead_hours, feature
    )
}

/// Same field on the rotated grid, which the regular-grid filter must skip.
pub fn dwd_rotated_file_name(
    model: &str,
    region: &str,
    run: &str,
    lead_hours: u32,
    feature: &str,
) -> String {
    format!(
        "{}_{}_rotated-lat-lon_single-level_{}_{:03}_{}.grib2.bz2",
        model, region, run, lead_hours, feature
    )
}
