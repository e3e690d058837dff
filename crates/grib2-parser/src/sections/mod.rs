//! GRIB2 section parsing.
//!
//! A GRIB2 message is a fixed 16-byte indicator followed by length-prefixed
//! sections (1 identification, 2 local use, 3 grid, 4 product, 5 data
//! representation, 6 bitmap, 7 data) and the `7777` end marker. Every parse
//! function here takes the bytes of a single message, starting at `GRIB`.

use crate::{Grib2Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};

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

/// Section 3: Grid Definition Section
///
/// Coordinates are kept in the units of the message (microdegrees unless the
/// basic angle says otherwise); see [`GridDefinition::angle_unit`].
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub template: u16,
    pub num_data_points: u32,
    pub earth_shape: u8,
    /// Ni - points along a parallel
    pub num_points_longitude: u32,
    /// Nj - points along a meridian
    pub num_points_latitude: u32,
    pub basic_angle: u32,
    pub basic_angle_subdivisions: u32,
    pub first_latitude: i32,
    pub first_longitude: i32,
    pub last_latitude: i32,
    pub last_longitude: i32,
    pub i_increment: u32,
    pub j_increment: u32,
    pub scanning_mode: u8,
}

impl GridDefinition {
    /// Size in degrees of one unit of the coordinate fields.
    pub fn angle_unit(&self) -> f64 {
        if self.basic_angle == 0
            || self.basic_angle == u32::MAX
            || self.basic_angle_subdivisions == 0
            || self.basic_angle_subdivisions == u32::MAX
        {
            1e-6
        } else {
            self.basic_angle as f64 / self.basic_angle_subdivisions as f64
        }
    }

    /// Convert a stored coordinate to degrees.
    pub fn to_degrees(&self, value: i32) -> f64 {
        let unit = self.angle_unit();
        if unit == 1e-6 {
            value as f64 / 1e6
        } else {
            value as f64 * unit
        }
    }

    /// Whether this is a regular latitude/longitude grid (template 3.0).
    pub fn is_lat_lon(&self) -> bool {
        self.template == 0
    }
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub parameter_short_name: String,
    pub level_type: u8,
    pub level_value: f64,
    pub level_description: String,
    pub time_range_unit: u8,
    pub forecast_time: u32,
}

impl ProductDefinition {
    /// Lead time of the forecast (start of the period for statistical products).
    ///
    /// `None` for time range units that have no fixed length (months, years).
    pub fn lead_time(&self) -> Option<Duration> {
        let amount = self.forecast_time as i64;
        match self.time_range_unit {
            0 => Some(Duration::minutes(amount)),
            1 => Some(Duration::hours(amount)),
            2 => Some(Duration::days(amount)),
            10 => Some(Duration::hours(3 * amount)),
            11 => Some(Duration::hours(6 * amount)),
            12 => Some(Duration::hours(12 * amount)),
            13 => Some(Duration::seconds(amount)),
            _ => None,
        }
    }
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
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
pub fn parse_indicator(data: &[u8]) -> Result<Indicator> {
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

    // Octets 5-6 reserved, 7 discipline, 8 edition, 9-16 total length
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
pub fn parse_identification(data: &[u8]) -> Result<Identification> {
    let section_offset = find_section(data, 1)?;
    let sec = section_slice(data, section_offset, 1)?;

    if sec.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: format!("Section 1 needs at least 21 bytes, got {}", sec.len()),
        });
    }

    let year = u16::from_be_bytes([sec[12], sec[13]]);
    let (month, day, hour, minute, second) = (sec[14], sec[15], sec[16], sec[17], sec[18]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center: u16::from_be_bytes([sec[5], sec[6]]),
        sub_center: u16::from_be_bytes([sec[7], sec[8]]),
        table_version: sec[9],
        local_table_version: sec[10],
        significance_of_reference_time: sec[11],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: sec[19],
        data_type: sec[20],
    })
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(data: &[u8]) -> Result<GridDefinition> {
    let section_offset = find_section(data, 3)?;
    let sec = section_slice(data, section_offset, 3)?;

    if sec.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    // Octet 6 source, 7-10 number of points, 11-12 optional list, 13-14 template
    let num_data_points = u32::from_be_bytes([sec[6], sec[7], sec[8], sec[9]]);
    let template = u16::from_be_bytes([sec[12], sec[13]]);
    let gd = &sec[14..];

    if template != 0 {
        // Only the dimensions are shared with template 3.0; the rest is left empty
        // and the grid is reported as not lat/lon.
        let read_u32 = |at: usize| {
            gd.get(at..at + 4)
                .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                .unwrap_or(0)
        };
        return Ok(GridDefinition {
            template,
            num_data_points,
            earth_shape: gd.first().copied().unwrap_or(0),
            num_points_longitude: read_u32(16),
            num_points_latitude: read_u32(20),
            basic_angle: 0,
            basic_angle_subdivisions: 0,
            first_latitude: 0,
            first_longitude: 0,
            last_latitude: 0,
            last_longitude: 0,
            i_increment: 0,
            j_increment: 0,
            scanning_mode: 0,
        });
    }

    // Template 3.0 (regular lat/lon), offsets relative to the template start:
    //  0 shape of earth, 16-19 Ni, 20-23 Nj, 24-27 basic angle, 28-31 subdivisions,
    // 32-35 La1, 36-39 Lo1, 40 resolution flags, 41-44 La2, 45-48 Lo2,
    // 49-52 Di, 53-56 Dj, 57 scanning mode
    if gd.len() < 58 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Template 0 needs at least 58 bytes, got {}", gd.len()),
        });
    }

    Ok(GridDefinition {
        template,
        num_data_points,
        earth_shape: gd[0],
        num_points_longitude: u32::from_be_bytes([gd[16], gd[17], gd[18], gd[19]]),
        num_points_latitude: u32::from_be_bytes([gd[20], gd[21], gd[22], gd[23]]),
        basic_angle: u32::from_be_bytes([gd[24], gd[25], gd[26], gd[27]]),
        basic_angle_subdivisions: u32::from_be_bytes([gd[28], gd[29], gd[30], gd[31]]),
        first_latitude: decode_grib2_signed(&gd[32..36]),
        first_longitude: decode_grib2_signed(&gd[36..40]),
        last_latitude: decode_grib2_signed(&gd[41..45]),
        last_longitude: decode_grib2_signed(&gd[45..49]),
        i_increment: u32::from_be_bytes([gd[49], gd[50], gd[51], gd[52]]),
        j_increment: u32::from_be_bytes([gd[53], gd[54], gd[55], gd[56]]),
        scanning_mode: gd[57],
    })
}

/// Parse Section 4 (Product Definition)
///
/// The parameter short name and level description are left empty; they are
/// resolved against the lookup tables by the reader.
pub fn parse_product_definition(data: &[u8]) -> Result<ProductDefinition> {
    let section_offset = find_section(data, 4)?;
    let sec = section_slice(data, section_offset, 4)?;

    if sec.len() < 34 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: format!("Section 4 needs at least 34 bytes, got {}", sec.len()),
        });
    }

    // Templates 4.0 and 4.8 share this prefix:
    // 7-8 template, 9 category, 10 number, 17 time range unit, 18-21 forecast time,
    // 22 first surface type, 23 scale factor, 24-27 scaled value
    let template = u16::from_be_bytes([sec[7], sec[8]]);
    let forecast_time = u32::from_be_bytes([sec[18], sec[19], sec[20], sec[21]]);
    let scale_factor = decode_grib2_signed_byte(sec[23]);
    let scaled_value = decode_grib2_signed(&sec[24..28]);

    let level_value = if scale_factor == 0 {
        scaled_value as f64
    } else {
        scaled_value as f64 / 10f64.powi(scale_factor as i32)
    };

    Ok(ProductDefinition {
        template,
        parameter_category: sec[9],
        parameter_number: sec[10],
        parameter_short_name: String::new(),
        level_type: sec[22],
        level_value,
        level_description: String::new(),
        time_range_unit: sec[17],
        forecast_time,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(data: &[u8]) -> Result<DataRepresentation> {
    let section_offset = find_section(data, 5)?;
    let sec = section_slice(data, section_offset, 5)?;

    if sec.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "Not enough data".to_string(),
        });
    }

    // 5-8 number of points, 9-10 template; templates 5.0/5.2/5.3/5.40/5.41 all
    // begin with R (11-14), E (15-16), D (17-18), bits (19), original type (20)
    Ok(DataRepresentation {
        num_data_points: u32::from_be_bytes([sec[5], sec[6], sec[7], sec[8]]),
        template: u16::from_be_bytes([sec[9], sec[10]]),
        reference_value: f32::from_be_bytes([sec[11], sec[12], sec[13], sec[14]]),
        binary_scale_factor: decode_grib2_signed_i16([sec[15], sec[16]]),
        decimal_scale_factor: decode_grib2_signed_i16([sec[17], sec[18]]),
        bits_per_value: sec[19],
        original_data_type: sec[20],
    })
}

/// Parse Section 6 (Bitmap)
///
/// Returns `None` when the section is absent or its indicator is 255
/// (no bitmap applies).
pub fn parse_bitmap(data: &[u8]) -> Result<Option<Bitmap>> {
    let section_offset = match find_section(data, 6) {
        Ok(offset) => offset,
        Err(_) => return Ok(None),
    };
    let sec = section_slice(data, section_offset, 6)?;

    if sec.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "Not enough data".to_string(),
        });
    }

    match sec[5] {
        255 => Ok(None),
        0 => Ok(Some(Bitmap {
            indicator: 0,
            data: Bytes::copy_from_slice(&sec[6..]),
        })),
        other => Err(Grib2Error::InvalidSection {
            section: 6,
            reason: format!("Bitmap indicator {} (predefined/previous bitmaps) not supported", other),
        }),
    }
}

/// Parse Section 7 (Data)
pub fn parse_data_section(data: &[u8]) -> Result<DataSection> {
    let section_offset = find_section(data, 7)?;
    let sec = section_slice(data, section_offset, 7)?;

    Ok(DataSection {
        data: Bytes::copy_from_slice(&sec[5..]),
    })
}

// ===== Helper Functions =====

/// Decode a 4-byte GRIB2 signed integer.
///
/// GRIB2 stores signed quantities in sign-magnitude form: the most significant
/// bit is the sign and the remaining 31 bits the magnitude. Slices of any
/// other length decode to 0.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    if bytes.len() != 4 {
        return 0;
    }
    let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn decode_grib2_signed_i16(bytes: [u8; 2]) -> i16 {
    let raw = u16::from_be_bytes(bytes);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn decode_grib2_signed_byte(byte: u8) -> i8 {
    let magnitude = (byte & 0x7F) as i8;
    if byte & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Bytes of the section starting at `offset`, bounded by its declared length.
fn section_slice(data: &[u8], offset: usize, section_num: u8) -> Result<&[u8]> {
    let length = u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]) as usize;
    data.get(offset..offset + length)
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: section_num,
            reason: "Section length exceeds available data".to_string(),
        })
}

/// Find a section by number within a message
fn find_section(data: &[u8], section_num: u8) -> Result<usize> {
    let mut offset = 16; // After Section 0

    loop {
        if data.get(offset..offset + 4) == Some(b"7777".as_slice()) || offset + 5 > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Reached end of message without finding section".to_string(),
            });
        }

        let section_length = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_helpers() {
        assert_eq!(decode_grib2_signed_i16([0x80, 0x02]), -2);
        assert_eq!(decode_grib2_signed_i16([0x00, 0x02]), 2);
        assert_eq!(decode_grib2_signed_byte(0x81), -1);
        assert_eq!(decode_grib2_signed_byte(0x02), 2);
    }

    #[test]
    fn test_lead_time_units() {
        let mut pd = ProductDefinition {
            template: 0,
            parameter_category: 0,
            parameter_number: 0,
            parameter_short_name: String::new(),
            level_type: 1,
            level_value: 0.0,
            level_description: String::new(),
            time_range_unit: 1,
            forecast_time: 6,
        };
        assert_eq!(pd.lead_time(), Some(Duration::hours(6)));

        pd.time_range_unit = 10;
        assert_eq!(pd.lead_time(), Some(Duration::hours(18)));

        pd.time_range_unit = 3; // months
        assert_eq!(pd.lead_time(), None);
    }

    #[test]
    fn test_indicator_rejects_edition_1() {
        let mut data = vec![0u8; 16];
        data[..4].copy_from_slice(b"GRIB");
        data[7] = 1;
        assert!(parse_indicator(&data).is_err());
    }

    #[test]
    fn test_find_section_stops_at_end_marker() {
        let mut data = vec![0u8; 16];
        data[..4].copy_from_slice(b"GRIB");
        data.extend_from_slice(b"7777");
        assert!(find_section(&data, 3).is_err());
    }
}
