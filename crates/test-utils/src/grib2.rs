//! Synthetic GRIB2 message builder.
//!
//! Produces structurally valid GRIB2 edition 2 messages with a regular
//! lat/lon grid (template 3.0), an analysis/forecast product (template 4.0)
//! and simple packing (template 5.0). NaN values are encoded through a
//! bitmap (section 6).

/// Builds one GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    // Grid definition, degrees
    ni: u32,
    nj: u32,
    la1: f64,
    lo1: f64,
    la2: f64,
    lo2: f64,
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_value: f64,
    time_unit: u8,
    forecast_time: u32,
    data_values: Vec<f32>,
}

impl Default for Grib2Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Grib2Builder {
    /// 4x3 one-degree grid, 2 m temperature, Canadian Meteorological Centre,
    /// reference time 2024-01-01 00:00 UTC.
    pub fn new() -> Self {
        let ni = 4;
        let nj = 3;
        Self {
            discipline: 0,
            center: 54,
            year: 2024,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            ni,
            nj,
            la1: 50.0,
            lo1: 250.0,
            la2: 48.0,
            lo2: 253.0,
            scanning_mode: 0b0000_0000, // +i, -j, i consecutive
            param_category: 0,
            param_number: 0,
            level_type: 103,
            level_value: 2.0,
            time_unit: 1,
            forecast_time: 0,
            data_values: vec![288.15; (ni * nj) as usize],
        }
    }

    /// Same defaults as [`Grib2Builder::new`] with the NCEP centre code.
    pub fn new_gfs() -> Self {
        Self {
            center: 7,
            ..Self::new()
        }
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    pub fn with_reference_minute(mut self, minute: u8) -> Self {
        self.minute = minute;
        self
    }

    /// Resize to `ni` x `nj` one-degree cells starting at the current first point.
    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.la2 = self.la1 - (nj.saturating_sub(1)) as f64;
        self.lo2 = self.lo1 + (ni.saturating_sub(1)) as f64;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    /// Set first and last grid points in degrees.
    pub fn with_area(mut self, la1: f64, lo1: f64, la2: f64, lo2: f64) -> Self {
        self.la1 = la1;
        self.lo1 = lo1;
        self.la2 = la2;
        self.lo2 = lo2;
        self
    }

    pub fn with_scanning_mode(mut self, mode: u8) -> Self {
        self.scanning_mode = mode;
        self
    }

    pub fn with_discipline(mut self, discipline: u8) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    /// Level in the units of code table 4.5 (Pa for isobaric, m above ground).
    pub fn with_level(mut self, level_type: u8, level_value: f64) -> Self {
        self.level_type = level_type;
        self.level_value = level_value;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.time_unit = 1;
        self.forecast_time = hour;
        self
    }

    /// Forecast time in an arbitrary time range unit (code table 4.4).
    pub fn with_forecast_time(mut self, unit: u8, value: u32) -> Self {
        self.time_unit = unit;
        self.forecast_time = value;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Row-major values; NaN marks missing points.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let sections = [
            self.build_section1(),
            self.build_section3(),
            self.build_section4(),
            self.build_section5(),
            self.build_section6(),
            self.build_section7(),
        ];

        let message_length = 16 + sections.iter().map(Vec::len).sum::<usize>() + 4;

        let mut message = Vec::with_capacity(message_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]); // Reserved
        message.push(self.discipline);
        message.push(2); // Edition 2
        message.extend_from_slice(&(message_length as u64).to_be_bytes());
        for section in &sections {
            message.extend_from_slice(section);
        }
        message.extend_from_slice(b"7777");

        message
    }

    fn present_values(&self) -> Vec<f32> {
        self.data_values.iter().copied().filter(|v| !v.is_nan()).collect()
    }

    fn has_missing(&self) -> bool {
        self.data_values.iter().any(|v| v.is_nan())
    }

    /// (reference value, binary scale factor, bits per value)
    fn packing_parameters(&self) -> (f32, i16, u8) {
        let present = self.present_values();
        let (min_val, max_val) = present.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY),
            |(min, max), &v| (min.min(v), max.max(v)),
        );
        if present.is_empty() {
            return (0.0, 0, 0);
        }
        let range = (max_val - min_val) as f64;
        if range == 0.0 {
            return (min_val, 0, 0);
        }
        // value = R + packed * 2^E with 16-bit packed values
        let binary_scale_factor = (range / 65535.0).log2().ceil() as i16;
        (min_val, binary_scale_factor, 16)
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);

        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Significance of reference time (start of forecast)

        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(self.minute);
        section.push(0); // Second

        section.push(0); // Production status (operational)
        section.push(1); // Type of data (forecast)

        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&(14u32 + 58).to_be_bytes());
        section.push(3);

        section.push(0); // Source of grid definition
        section.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        section.push(0); // Octets for optional list
        section.push(0); // Interpretation of optional list
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 3.0

        section.push(6); // Shape of Earth (sphere, 6371229 m)
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section.extend_from_slice(&self.ni.to_be_bytes());
        section.extend_from_slice(&self.nj.to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions

        let di = if self.ni > 1 {
            ((self.lo2 - self.lo1).abs() / (self.ni - 1) as f64 * 1e6).round() as u32
        } else {
            0
        };
        let dj = if self.nj > 1 {
            ((self.la2 - self.la1).abs() / (self.nj - 1) as f64 * 1e6).round() as u32
        } else {
            0
        };

        section.extend_from_slice(&sign_magnitude_32(microdegrees(self.la1)));
        section.extend_from_slice(&sign_magnitude_32(microdegrees(self.lo1)));
        section.push(48); // Resolution and component flags
        section.extend_from_slice(&sign_magnitude_32(microdegrees(self.la2)));
        section.extend_from_slice(&sign_magnitude_32(microdegrees(self.lo2)));
        section.extend_from_slice(&di.to_be_bytes());
        section.extend_from_slice(&dj.to_be_bytes());
        section.push(self.scanning_mode);

        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&34u32.to_be_bytes());
        section.push(4);

        section.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 4.0

        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // Type of generating process (forecast)
        section.push(0); // Background generating process
        section.push(0); // Analysis or forecast process
        section.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        section.push(0); // Minutes of cutoff
        section.push(self.time_unit);
        section.extend_from_slice(&self.forecast_time.to_be_bytes());

        let (scale, scaled) = scale_level(self.level_value);
        section.push(self.level_type);
        section.push(scale);
        section.extend_from_slice(&sign_magnitude_32(scaled));

        section.push(255); // Type of second fixed surface (none)
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section
    }

    fn build_section5(&self) -> Vec<u8> {
        let (reference_value, binary_scale_factor, bits_per_value) = self.packing_parameters();

        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);

        section.extend_from_slice(&(self.present_values().len() as u32).to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0

        section.extend_from_slice(&reference_value.to_be_bytes());
        section.extend_from_slice(&sign_magnitude_16(binary_scale_factor));
        section.extend_from_slice(&0u16.to_be_bytes()); // Decimal scale factor
        section.push(bits_per_value);
        section.push(0); // Original field type (floating point)

        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut section = Vec::new();
        if !self.has_missing() {
            section.extend_from_slice(&6u32.to_be_bytes());
            section.push(6);
            section.push(255); // No bitmap
            return section;
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, v) in self.data_values.iter().enumerate() {
            if !v.is_nan() {
                bitmap[i / 8] |= 1 << (7 - (i % 8));
            }
        }

        section.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        section.push(6);
        section.push(0); // Bitmap follows
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let packed_data = self.pack_simple();

        let mut section = Vec::new();
        section.extend_from_slice(&(5 + packed_data.len() as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packed_data);
        section
    }

    fn pack_simple(&self) -> Vec<u8> {
        let (reference_value, binary_scale_factor, bits_per_value) = self.packing_parameters();
        if bits_per_value == 0 {
            return Vec::new();
        }

        let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
        let mut packed = Vec::new();
        for val in self.present_values() {
            let packed_value = ((val as f64 - reference_value as f64) / binary_scale)
                .round()
                .clamp(0.0, 65535.0) as u16;
            packed.extend_from_slice(&packed_value.to_be_bytes());
        }
        packed
    }
}

fn microdegrees(degrees: f64) -> i32 {
    (degrees * 1e6).round() as i32
}

/// Smallest decimal scale (0..=6) that makes the level an integer.
fn scale_level(value: f64) -> (u8, i32) {
    for scale in 0u8..=6 {
        let scaled = value * 10f64.powi(scale as i32);
        if (scaled - scaled.round()).abs() < 1e-9 {
            return (scale, scaled.round() as i32);
        }
    }
    (6, (value * 1e6).round() as i32)
}

fn sign_magnitude_32(value: i32) -> [u8; 4] {
    let raw = if value < 0 {
        value.unsigned_abs() | 0x8000_0000
    } else {
        value as u32
    };
    raw.to_be_bytes()
}

fn sign_magnitude_16(value: i16) -> [u8; 2] {
    let raw = if value < 0 {
        value.unsigned_abs() | 0x8000
    } else {
        value as u16
    };
    raw.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_framing() {
        let message = Grib2Builder::new().with_gradient(250.0, 300.0).build();

        assert_eq!(&message[0..4], b"GRIB");
        assert_eq!(message[7], 2);
        let declared = u64::from_be_bytes(message[8..16].try_into().unwrap());
        assert_eq!(declared as usize, message.len());
        assert_eq!(&message[message.len() - 4..], b"7777");
    }

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(sign_magnitude_32(-1), [0x80, 0, 0, 1]);
        assert_eq!(sign_magnitude_32(5), [0, 0, 0, 5]);
        assert_eq!(sign_magnitude_16(-10), [0x80, 10]);
    }

    #[test]
    fn test_scale_level() {
        assert_eq!(scale_level(85000.0), (0, 85000));
        assert_eq!(scale_level(2.5), (1, 25));
    }

    #[test]
    fn test_bitmap_section_present_for_nans() {
        let plain = Grib2Builder::new().with_constant_value(1.0).build();
        let masked = Grib2Builder::new()
            .with_data(vec![1.0, f32::NAN, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0])
            .build();

        // 12 points need 2 bitmap bytes; the missing point also drops 2 packed bytes
        assert!(masked.len() > plain.len());
    }
}
