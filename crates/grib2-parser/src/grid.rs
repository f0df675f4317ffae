//! Georeferenced view of a decoded message.

use chrono::{DateTime, Utc};
use nwp_common::{GeoTransform, GridShape, ScanMode};

use crate::message::Grib2Message;
use crate::{Grib2Error, Result};

/// Values of one message reordered north-up, with their geotransform.
#[derive(Debug, Clone)]
pub struct DecodedGrid {
    pub shape: GridShape,
    pub transform: GeoTransform,
    /// Row-major, row 0 northernmost, column 0 westernmost. `None` = masked.
    pub values: Vec<Option<f32>>,
    pub reference_time: DateTime<Utc>,
    pub forecast_time: u32,
}

impl DecodedGrid {
    /// Unpack a regular lat/lon message and georeference it.
    pub fn from_message(message: &Grib2Message) -> Result<Self> {
        let (rows, cols) = message.grid_dims();
        let shape = GridShape::new(rows, cols);
        if shape.is_empty() {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: format!("Empty grid {}", shape),
            });
        }

        let scan = ScanMode::from_grib2_flag(message.grid_definition.scanning_mode);
        let transform = geotransform(message, shape, scan)?;

        let scanned = message.unpack_data()?;
        if scanned.len() != shape.len() {
            return Err(Grib2Error::UnpackingError(format!(
                "Unpacked {} values for a {} grid",
                scanned.len(),
                shape
            )));
        }

        let mut values = Vec::with_capacity(shape.len());
        for row in 0..rows {
            for col in 0..cols {
                values.push(scanned[scan.source_index(row, col, shape)]);
            }
        }

        Ok(Self {
            shape,
            transform,
            values,
            reference_time: message.identification.reference_time,
            forecast_time: message.product_definition.forecast_time,
        })
    }
}

fn geotransform(message: &Grib2Message, shape: GridShape, scan: ScanMode) -> Result<GeoTransform> {
    let gd = &message.grid_definition;
    let micro = |v: i64| v as f64 / 1e6;

    let la1 = micro(gd.first_latitude_micro);
    let la2 = micro(gd.last_latitude_micro);
    let lo1 = micro(gd.first_longitude_micro);
    let lo2 = micro(gd.last_longitude_micro);

    let spacing = |span: f64, n: usize| if n > 1 { span / (n - 1) as f64 } else { 0.0 };

    let dj = gd
        .latitude_increment_micro
        .map(micro)
        .unwrap_or_else(|| spacing((la2 - la1).abs(), shape.rows));
    let di = gd.longitude_increment_micro.map(micro).unwrap_or_else(|| {
        let span = if scan.i_negative { lo1 - lo2 } else { lo2 - lo1 };
        spacing(span.rem_euclid(360.0), shape.cols)
    });

    if di <= 0.0 || dj <= 0.0 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Cannot derive grid spacing (di={}, dj={})", di, dj),
        });
    }

    let north = la1.max(la2);
    let west = normalize_longitude(if scan.i_negative { lo2 } else { lo1 });

    Ok(GeoTransform::north_up(
        west - di / 2.0,
        di,
        north + dj / 2.0,
        -dj,
    ))
}

/// Map a longitude into [-180, 180).
fn normalize_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}
