//! `.grib2.bz2` payloads to raster frames.

use std::io::Read;

use bytes::Bytes;
use grib2_parser::{first_message, DecodedGrid};
use nwp_common::CrsCode;
use tracing::{debug, instrument};

use crate::error::DecodeError;
use crate::precision::CellValue;
use crate::stack::RasterFrame;

const BZIP2_MAGIC: &[u8] = b"BZh";

/// Decompress bzip2-compressed GRIB2 data.
pub fn decompress(data: &[u8]) -> Result<Bytes, DecodeError> {
    if !data.starts_with(BZIP2_MAGIC) {
        return Err(DecodeError::Decompression(
            "payload is not a bzip2 stream".to_string(),
        ));
    }

    let mut decoder = bzip2::read::BzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| DecodeError::Decompression(e.to_string()))?;
    Ok(Bytes::from(decompressed))
}

/// Decode band 1 (the first message) of a GRIB2 file.
///
/// Masked points become `T::NODATA`; values are cast to `T` right after unpacking.
pub fn parse<T: CellValue>(grib: Bytes) -> Result<RasterFrame<T>, DecodeError> {
    let message = first_message(grib)?;
    let grid = DecodedGrid::from_message(&message)?;

    debug!(
        parameter = %message.parameter(),
        shape = %grid.shape,
        forecast_time = grid.forecast_time,
        "Decoded GRIB2 message"
    );

    let nodata = T::NODATA;
    let data = grid
        .values
        .iter()
        .map(|v| v.map_or(nodata, T::from_f32))
        .collect();

    Ok(RasterFrame {
        shape: grid.shape,
        data,
        nodata,
        transform: grid.transform,
        crs: CrsCode::Epsg4326,
    })
}

/// Decompress and decode one retrieved file.
#[instrument(skip(payload), fields(bytes = payload.len()))]
pub fn decode<T: CellValue>(payload: &[u8]) -> Result<RasterFrame<T>, DecodeError> {
    parse(decompress(payload)?)
}
