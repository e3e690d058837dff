//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0) is decoded here. Other packings are handed
//! to the `grib` crate by [`unpack_with_grib_crate`].

use crate::{Grib2Error, Result};
use std::io::Cursor;

/// Unpack simple packed GRIB2 data
///
/// Simple packing formula: value = (reference_value + (packed_value * 2^binary_scale)) * 10^(-decimal_scale)
///
/// With a bitmap, only points whose bit is set consume packed values; the
/// others come back as `None`.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: u32,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Result<Vec<Option<f32>>> {
    let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(decimal_scale_factor as i32));
    let reference = reference_value as f64;

    let mut values = Vec::with_capacity(num_points as usize);
    let mut bit_position = 0;
    let bits_per_value = bits_per_value as usize;

    for i in 0..(num_points as usize) {
        let has_value = match bitmap {
            // 1 bit per data point, 1 = value present, MSB first
            Some(bm) => {
                let byte = bm.get(i / 8).ok_or_else(|| {
                    Grib2Error::UnpackingError(format!(
                        "Bitmap too short for {} points",
                        num_points
                    ))
                })?;
                (byte >> (7 - (i % 8))) & 1 == 1
            }
            None => true,
        };

        if !has_value {
            values.push(None);
            continue;
        }

        // Constant field: no bits are stored
        let packed_value = if bits_per_value == 0 {
            0
        } else {
            let v = extract_bits(packed_data, bit_position, bits_per_value)
                .map_err(|e| Grib2Error::UnpackingError(format!("Failed to extract bits: {}", e)))?;
            bit_position += bits_per_value;
            v
        };

        let value = (reference + packed_value as f64 * binary_scale) * decimal_scale;
        values.push(Some(value as f32));
    }

    Ok(values)
}

/// Decode the first field of a raw message with the `grib` crate.
///
/// Used for packings other than simple packing (complex, JPEG2000, PNG).
/// Values come back in file scan order with missing points as NaN.
pub fn unpack_with_grib_crate(raw_message: &[u8]) -> Result<Vec<f32>> {
    let grib2 = grib::from_reader(Cursor::new(raw_message))
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate could not read message: {}", e)))?;

    let (_, submessage) = grib2
        .iter()
        .next()
        .ok_or_else(|| Grib2Error::UnpackingError("Message holds no fields".to_string()))?;

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("Unsupported packing: {}", e)))?;
    let values = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("Decoding failed: {}", e)))?;

    Ok(values.collect())
}

/// Extract bits from a byte array
/// Returns the bits as a 32-bit unsigned integer
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> std::result::Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }

    let mut result = 0u32;

    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let byte_idx = absolute_bit / 8;
        let bit_idx = 7 - (absolute_bit % 8); // MSB first

        if byte_idx >= data.len() {
            return Err("Not enough data to extract bits".to_string());
        }

        let bit = (data[byte_idx] >> bit_idx) & 1;
        result = (result << 1) | (bit as u32);
    }

    Ok(result)
}
