//! GRIB2 section parsing.
//!
//! This module handles parsing of individual GRIB2 message sections.
//! Every parse function takes the bytes of a single message, starting at
//! the "GRIB" magic.

use crate::Grib2Error;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

/// Marker for an all-ones (missing) 32 bit field.
const MISSING_U32: u32 = 0xFFFF_FFFF;

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub magic: [u8; 4],
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 3: Grid Definition Section (template 3.0, regular lat/lon)
///
/// Angles are stored in microdegrees after applying the basic angle.
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub template: u16,
    pub num_data_points: u32,
    pub grid_shape: u8,
    pub num_points_longitude: u32,
    pub num_points_latitude: u32,
    pub first_latitude_micro: i64,
    pub first_longitude_micro: i64,
    pub last_latitude_micro: i64,
    pub last_longitude_micro: i64,
    /// `None` when the increment is flagged as not given
    pub longitude_increment_micro: Option<i64>,
    pub latitude_increment_micro: Option<i64>,
    pub scanning_mode: u8,
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub parameter_short_name: String,
    pub time_range_unit: u8,
    pub forecast_time: u32,
    pub level_type: u8,
    pub level_value: u32,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    /// Number of packed values (excludes points masked by the bitmap)
    pub num_data_points: u32,
    pub template: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octets 1-4: "GRIB", 5-6: reserved, 7: discipline, 8: edition,
    // 9-16: total length of the message (8-byte big-endian)
    let discipline = data[6];
    let edition = data[7];

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    let message_length = u64::from_be_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    Ok(Indicator {
        magic: [data[0], data[1], data[2], data[3]],
        discipline,
        edition,
        message_length,
    })
}

/// Parse Section 1 (Identification)
pub fn parse_identification(data: &[u8]) -> Result<Identification, Grib2Error> {
    let section_offset = find_section(data, 1)?;
    let section_data = section_slice(data, section_offset);

    if section_data.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: "Not enough data".to_string(),
        });
    }

    // Skip section length (4 bytes) and section number (1 byte)
    let sec_data = &section_data[5..];

    let center = u16::from_be_bytes([sec_data[0], sec_data[1]]);
    let sub_center = u16::from_be_bytes([sec_data[2], sec_data[3]]);
    let table_version = sec_data[4];
    let local_table_version = sec_data[5];
    let significance_of_reference_time = sec_data[6];

    let year = u16::from_be_bytes([sec_data[7], sec_data[8]]);
    let month = sec_data[9];
    let day = sec_data[10];
    let hour = sec_data[11];
    let minute = sec_data[12];
    let second = sec_data[13];

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    let reference_time = DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc);

    Ok(Identification {
        center,
        sub_center,
        table_version,
        local_table_version,
        significance_of_reference_time,
        reference_time,
        production_status: sec_data[14],
        data_type: sec_data[15],
    })
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(data: &[u8]) -> Result<GridDefinition, Grib2Error> {
    let section_offset = find_section(data, 3)?;
    let section_data = section_slice(data, section_offset);

    if section_data.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    // Bytes 5: source of grid definition, 6-9: number of data points,
    // 10-11: optional list description, 12-13: template number, 14+: template
    let num_data_points = read_u32(&section_data[6..10]);
    let template = u16::from_be_bytes([section_data[12], section_data[13]]);

    if template != 0 {
        return Err(Grib2Error::UnsupportedTemplate {
            section: 3,
            template,
        });
    }

    // Template 3.0: Latitude/longitude (equidistant cylindrical)
    //
    // Byte 0: Shape of the Earth (Table 3.2)
    // Bytes 1-15: Earth radius / axes (scale factor + scaled value triplets)
    // Bytes 16-19: Ni - number of points along a parallel
    // Bytes 20-23: Nj - number of points along a meridian
    // Bytes 24-27: Basic angle of the initial production domain
    // Bytes 28-31: Subdivisions of basic angle
    // Bytes 32-35: La1, 36-39: Lo1 (sign-magnitude)
    // Byte 40: Resolution and component flags
    // Bytes 41-44: La2, 45-48: Lo2 (sign-magnitude)
    // Bytes 49-52: Di, 53-56: Dj
    // Byte 57: Scanning mode (flags)
    let gd = &section_data[14..];
    if gd.len() < 58 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Template 3.0 needs at least 58 bytes, got {}", gd.len()),
        });
    }

    let ni = read_u32(&gd[16..20]);
    let nj = read_u32(&gd[20..24]);
    let basic_angle = read_u32(&gd[24..28]);
    let subdivisions = read_u32(&gd[28..32]);

    // Angles are in 1e-6 degree units unless a basic angle is given
    let to_micro = |raw: i64| -> Result<i64, Grib2Error> {
        if basic_angle == 0
            || basic_angle == MISSING_U32
            || subdivisions == 0
            || subdivisions == MISSING_U32
        {
            return Ok(raw);
        }
        let micro = raw as i128 * basic_angle as i128 * 1_000_000 / subdivisions as i128;
        i64::try_from(micro).map_err(|_| Grib2Error::InvalidSection {
            section: 3,
            reason: format!(
                "angle {} out of range for basic angle {}/{}",
                raw, basic_angle, subdivisions
            ),
        })
    };

    let resolution_flags = gd[40];
    let di = read_u32(&gd[49..53]);
    let dj = read_u32(&gd[53..57]);

    // Flag bit 3 (0x20) = i increments given, bit 4 (0x10) = j increments given
    let longitude_increment_micro = (resolution_flags & 0x20 != 0 && di != MISSING_U32)
        .then(|| to_micro(di as i64))
        .transpose()?;
    let latitude_increment_micro = (resolution_flags & 0x10 != 0 && dj != MISSING_U32)
        .then(|| to_micro(dj as i64))
        .transpose()?;

    Ok(GridDefinition {
        template,
        num_data_points,
        grid_shape: gd[0],
        num_points_longitude: ni,
        num_points_latitude: nj,
        first_latitude_micro: to_micro(decode_grib2_signed(&gd[32..36]) as i64)?,
        first_longitude_micro: to_micro(decode_grib2_signed(&gd[36..40]) as i64)?,
        last_latitude_micro: to_micro(decode_grib2_signed(&gd[41..45]) as i64)?,
        last_longitude_micro: to_micro(decode_grib2_signed(&gd[45..49]) as i64)?,
        longitude_increment_micro,
        latitude_increment_micro,
        scanning_mode: gd[57],
    })
}

/// Parse Section 4 (Product Definition)
pub fn parse_product_definition(
    data: &[u8],
    discipline: u8,
) -> Result<ProductDefinition, Grib2Error> {
    let section_offset = find_section(data, 4)?;
    let section_data = section_slice(data, section_offset);

    if section_data.len() < 11 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "Not enough data".to_string(),
        });
    }

    // Bytes 5-6: number of coordinate values, 7-8: template number,
    // 9: parameter category, 10: parameter number
    let template = u16::from_be_bytes([section_data[7], section_data[8]]);
    let parameter_category = section_data[9];
    let parameter_number = section_data[10];

    // Templates 4.0 / 4.8 share the layout up to the first fixed surface:
    // byte 17: time range unit, 18-21: forecast time,
    // 22: type of first fixed surface, 23: scale factor, 24-27: scaled value
    let time_range_unit = section_data.get(17).copied().unwrap_or(1);
    let forecast_time = section_data.get(18..22).map(read_u32).unwrap_or(0);
    let level_type = section_data.get(22).copied().unwrap_or(1);
    let level_value = section_data.get(24..28).map(read_u32).unwrap_or(0);

    Ok(ProductDefinition {
        template,
        parameter_category,
        parameter_number,
        parameter_short_name: get_parameter_short_name(
            discipline,
            parameter_category,
            parameter_number,
        ),
        time_range_unit,
        forecast_time,
        level_type,
        level_value,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(data: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    let section_offset = find_section(data, 5)?;
    let section_data = section_slice(data, section_offset);

    if section_data.len() < 11 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "Not enough data".to_string(),
        });
    }

    // Octets 6-9 [5-8]: number of packed values
    // Octets 10-11 [9-10]: data representation template number
    //
    // Template 5.0 (and the packing header shared by 5.2/5.3/5.40/5.41/5.42):
    // [11-14]: reference value (IEEE f32), [15-16]: binary scale factor,
    // [17-18]: decimal scale factor, [19]: bits per value, [20]: original type
    let num_data_points = read_u32(&section_data[5..9]);
    let template = u16::from_be_bytes([section_data[9], section_data[10]]);

    let template_data = &section_data[11..];
    if template_data.len() < 10 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: format!(
                "Packing header needs 10 bytes, got {}",
                template_data.len()
            ),
        });
    }

    Ok(DataRepresentation {
        num_data_points,
        template,
        reference_value: f32::from_be_bytes([
            template_data[0],
            template_data[1],
            template_data[2],
            template_data[3],
        ]),
        binary_scale_factor: decode_grib2_signed16(&template_data[4..6]),
        decimal_scale_factor: decode_grib2_signed16(&template_data[6..8]),
        bits_per_value: template_data[8],
        original_data_type: template_data[9],
    })
}

/// Parse Section 6 (Bitmap). Returns `None` when no bitmap applies.
pub fn parse_bitmap(data: &[u8]) -> Result<Option<Bitmap>, Grib2Error> {
    let section_offset = match find_section(data, 6) {
        Ok(offset) => offset,
        Err(_) => return Ok(None),
    };
    let section_data = section_slice(data, section_offset);

    if section_data.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "Not enough data".to_string(),
        });
    }

    match section_data[5] {
        255 => Ok(None),
        0 => Ok(Some(Bitmap {
            indicator: 0,
            data: Bytes::copy_from_slice(&section_data[6..]),
        })),
        other => Err(Grib2Error::InvalidSection {
            section: 6,
            reason: format!("Unsupported bitmap indicator {}", other),
        }),
    }
}

/// Parse Section 7 (Data)
pub fn parse_data_section(data: &[u8]) -> Result<DataSection, Grib2Error> {
    let section_offset = find_section(data, 7)?;
    let section_data = section_slice(data, section_offset);

    Ok(DataSection {
        data: Bytes::copy_from_slice(section_data.get(5..).unwrap_or_default()),
    })
}

// ===== Helper Functions =====

/// Decode a 4-byte GRIB2 sign-magnitude integer (MSB is the sign bit).
///
/// Returns 0 for slices that are not exactly 4 bytes long.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    if bytes.len() != 4 {
        return 0;
    }
    let raw = read_u32(bytes);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a 2-byte GRIB2 sign-magnitude integer.
pub fn decode_grib2_signed16(bytes: &[u8]) -> i16 {
    if bytes.len() != 2 {
        return 0;
    }
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// The bytes of one section, bounded by its declared length.
fn section_slice(data: &[u8], offset: usize) -> &[u8] {
    let length = read_u32(&data[offset..offset + 4]) as usize;
    &data[offset..offset + length]
}

/// Find a section by number within a message
fn find_section(data: &[u8], section_num: u8) -> Result<usize, Grib2Error> {
    let mut offset = 16; // After Section 0

    loop {
        if data.get(offset..offset + 4) == Some(b"7777".as_slice()) {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Reached end of message without finding section".to_string(),
            });
        }

        if offset + 5 > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Section not found".to_string(),
            });
        }

        let section_length = read_u32(&data[offset..offset + 4]) as usize;

        if section_length < 5 || offset + section_length > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Invalid section length".to_string(),
            });
        }

        if data[offset + 4] == section_num {
            return Ok(offset);
        }

        offset += section_length;
    }
}

/// Get parameter short name
fn get_parameter_short_name(discipline: u8, category: u8, number: u8) -> String {
    match (discipline, category, number) {
        // Category 0: Temperature
        (0, 0, 0) => "TMP".to_string(),
        (0, 0, 6) => "DPT".to_string(),

        // Category 1: Moisture
        (0, 1, 0) => "SPFH".to_string(),
        (0, 1, 1) => "RH".to_string(),
        (0, 1, 7) => "PRATE".to_string(),
        (0, 1, 8) => "APCP".to_string(), // DWD TOT_PREC
        (0, 1, 11) => "SNOD".to_string(),
        (0, 1, 52) => "TPRATE".to_string(),

        // Category 2: Momentum (wind)
        (0, 2, 2) => "UGRD".to_string(),
        (0, 2, 3) => "VGRD".to_string(),
        (0, 2, 22) => "GUST".to_string(),

        // Category 3: Mass
        (0, 3, 0) => "PRES".to_string(),
        (0, 3, 1) => "PRMSL".to_string(),

        // Category 4/5: Radiation
        (0, 4, 7) => "DSWRF".to_string(),
        (0, 5, 3) => "DLWRF".to_string(),

        // Category 6: Cloud
        (0, 6, 1) => "TCDC".to_string(),

        _ => format!("P{}_{}_{}", discipline, category, number),
    }
}
