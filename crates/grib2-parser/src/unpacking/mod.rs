//! GRIB2 data unpacking algorithms.
//!
//! Only simple packing (template 5.0) is implemented; it is what the
//! regular-lat-lon open-data products use.

use crate::Grib2Error;

/// Unpack simple packed GRIB2 data.
///
/// Simple packing formula: value = (reference_value + packed_value * 2^binary_scale) * 10^(-decimal_scale)
///
/// `num_points` is the number of grid points. When a bitmap is given, only
/// points flagged present consume a packed value; the rest come back as `None`.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: u32,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Result<Vec<Option<f32>>, Grib2Error> {
    let num_points = num_points as usize;

    if let Some(bm) = bitmap {
        if bm.len() * 8 < num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "Bitmap covers {} points, grid has {}",
                bm.len() * 8,
                num_points
            )));
        }
    }

    // f64 keeps the scaling exact enough for 24+ bit packing
    let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(decimal_scale_factor as i32));
    let reference = reference_value as f64;
    let bits_per_value = bits_per_value as usize;

    let mut values = Vec::with_capacity(num_points);
    let mut bit_position = 0;

    for i in 0..num_points {
        // Bitmap: 1 bit per grid point, 1 = value present, 0 = missing
        let present = bitmap.map_or(true, |bm| (bm[i / 8] >> (7 - (i % 8))) & 1 == 1);

        if !present {
            values.push(None);
            continue;
        }

        let packed_value = if bits_per_value == 0 {
            // Constant field: every value equals the reference value
            0
        } else {
            let v = extract_bits(packed_data, bit_position, bits_per_value).map_err(|e| {
                Grib2Error::UnpackingError(format!("Failed to extract bits: {}", e))
            })?;
            bit_position += bits_per_value;
            v
        };

        let value = (reference + packed_value as f64 * binary_scale) * decimal_scale;
        values.push(Some(value as f32));
    }

    Ok(values)
}

/// Extract bits from a byte array
/// Returns the bits as a 32-bit unsigned integer
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }

    let end_bit = start_bit + num_bits;
    if (end_bit + 7) / 8 > data.len() {
        return Err("Not enough data to extract bits".to_string());
    }

    let mut result = 0u64;
    let mut bit = start_bit;

    // Leading partial byte, then whole bytes, then trailing bits
    while bit < end_bit {
        let byte = data[bit / 8] as u64;
        let offset_in_byte = bit % 8;
        let take = (8 - offset_in_byte).min(end_bit - bit);
        let shifted = (byte >> (8 - offset_in_byte - take)) & ((1u64 << take) - 1);
        result = (result << take) | shifted;
        bit += take;
    }

    Ok(result as u32)
}
