//! GRIB2 message framing.

use bytes::Bytes;
use tracing::debug;

use crate::sections::{
    self, Bitmap, DataRepresentation, DataSection, GridDefinition, Identification, Indicator,
    ProductDefinition,
};
use crate::unpacking::unpack_simple;
use crate::{Grib2Error, Result};

/// One fully parsed GRIB2 message (a single field / band).
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub bitmap: Option<Bitmap>,
    pub data_section: DataSection,
}

impl Grib2Message {
    /// Parse a message from bytes that start at its "GRIB" magic.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let indicator = sections::parse_indicator(data)?;
        let length = usize::try_from(indicator.message_length).map_err(|_| {
            Grib2Error::InvalidFormat(format!(
                "Message length {} does not fit in memory",
                indicator.message_length
            ))
        })?;

        if length < 20 || length > data.len() {
            return Err(Grib2Error::InvalidFormat(format!(
                "Message length {} exceeds available {} bytes",
                length,
                data.len()
            )));
        }

        let message = &data[..length];
        if &message[length - 4..] != b"7777" {
            return Err(Grib2Error::InvalidFormat(
                "Missing end section '7777'".to_string(),
            ));
        }

        Ok(Self {
            identification: sections::parse_identification(message)?,
            grid_definition: sections::parse_grid_definition(message)?,
            product_definition: sections::parse_product_definition(
                message,
                indicator.discipline,
            )?,
            data_representation: sections::parse_data_representation(message)?,
            bitmap: sections::parse_bitmap(message)?,
            data_section: sections::parse_data_section(message)?,
            indicator,
        })
    }

    /// Short name of the parameter, e.g. "APCP".
    pub fn parameter(&self) -> &str {
        &self.product_definition.parameter_short_name
    }

    /// Grid dimensions as (rows, cols) = (Nj, Ni).
    pub fn grid_dims(&self) -> (usize, usize) {
        (
            self.grid_definition.num_points_latitude as usize,
            self.grid_definition.num_points_longitude as usize,
        )
    }

    /// Unpack the data section in scanning order. Bitmap-masked points are `None`.
    pub fn unpack_data(&self) -> Result<Vec<Option<f32>>> {
        let dr = &self.data_representation;
        if dr.template != 0 {
            return Err(Grib2Error::UnsupportedTemplate {
                section: 5,
                template: dr.template,
            });
        }

        let (rows, cols) = self.grid_dims();
        let num_points = u32::try_from(rows * cols).map_err(|_| {
            Grib2Error::InvalidSection {
                section: 3,
                reason: format!("Grid {}x{} too large", rows, cols),
            }
        })?;

        unpack_simple(
            &self.data_section.data,
            num_points,
            dr.bits_per_value,
            dr.reference_value,
            dr.binary_scale_factor,
            dr.decimal_scale_factor,
            self.bitmap.as_ref().map(|b| b.data.as_ref()),
        )
    }
}

/// Sequential reader over the messages in a GRIB2 file.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Parse the next message, skipping any bytes before its "GRIB" magic.
    ///
    /// Returns `Ok(None)` once no further message is found.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>> {
        let remaining = &self.data[self.offset..];
        let start = match remaining.windows(4).position(|w| w == b"GRIB") {
            Some(pos) => pos,
            None => return Ok(None),
        };

        if start > 0 {
            debug!(skipped = start, "Skipped bytes before GRIB magic");
        }

        let message = Grib2Message::parse(&remaining[start..])?;
        self.offset += start + message.indicator.message_length as usize;
        Ok(Some(message))
    }
}

/// Parse the first message of a GRIB2 file.
pub fn first_message(data: Bytes) -> Result<Grib2Message> {
    Grib2Reader::new(data)
        .next_message()?
        .ok_or_else(|| Grib2Error::InvalidFormat("No GRIB message found".to_string()))
}
