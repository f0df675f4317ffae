//! Synthetic GRIB2 messages for tests.
//!
//! The generated messages have a valid structure (sections 0-8), a regular
//! lat/lon grid and simple packing, which is what the decoder supports.

use std::io::Write;

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Build a minimal GRIB2 message.
///
/// Values passed to [`Grib2Builder::with_data`] are in scanning order, i.e.
/// the order the scanning mode flag describes.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    reference_time: (u16, u8, u8, u8),
    // Grid definition
    ni: u32,       // columns
    nj: u32,       // rows
    la1: i32,      // first lat (microdegrees)
    lo1: i32,      // first lon (microdegrees)
    la2: i32,      // last lat (microdegrees)
    lo2: i32,      // last lon (microdegrees)
    di: u32,       // lon increment (microdegrees)
    dj: u32,       // lat increment (microdegrees)
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    forecast_hour: u32,
    // Data representation
    data_template: u16,
    decimal_scale: i16,
    data_values: Vec<f32>,
    present: Option<Vec<bool>>,
}

impl Grib2Builder {
    /// A 4x5 grid at 0.25 degree spacing over Saxony, scanned north to south.
    pub fn new_regular_lat_lon() -> Self {
        let ni = 5;
        let nj = 4;
        Self {
            discipline: 0,
            center: 78, // DWD
            reference_time: (2023, 1, 1, 0),
            ni,
            nj,
            la1: 51_750_000,
            lo1: 13_000_000,
            la2: 51_000_000,
            lo2: 14_000_000,
            di: 250_000,
            dj: 250_000,
            scanning_mode: 0b0000_0000, // +i, -j, i consecutive
            param_category: 1,
            param_number: 8, // total precipitation
            forecast_hour: 0,
            data_template: 0,
            decimal_scale: 0,
            data_values: vec![0.0; (ni * nj) as usize],
            present: None,
        }
    }

    pub fn with_reference_time(mut self, time: DateTime<Utc>) -> Self {
        self.reference_time = (
            time.year() as u16,
            time.month() as u8,
            time.day() as u8,
            time.hour() as u8,
        );
        self
    }

    /// Resize the grid keeping the first point and spacing.
    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        let span_lat = (nj.saturating_sub(1) * self.dj) as i32;
        let span_lon = (ni.saturating_sub(1) * self.di) as i32;
        self.la2 = if self.scanning_mode & 0x40 != 0 {
            self.la1 + span_lat
        } else {
            self.la1 - span_lat
        };
        self.lo2 = self.lo1 + span_lon;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self.present = None;
        self
    }

    /// Place the first grid point; the last point follows from size and spacing.
    pub fn with_origin(mut self, la1: i32, lo1: i32) -> Self {
        self.la1 = la1;
        self.lo1 = lo1;
        let (ni, nj) = (self.ni, self.nj);
        self.with_grid(ni, nj)
    }

    /// Switch to south-to-north scanning (flag 0x40), as DWD regular grids use.
    pub fn south_to_north(mut self) -> Self {
        let south = self.la1.min(self.la2);
        let north = self.la1.max(self.la2);
        self.scanning_mode |= 0x40;
        self.la1 = south;
        self.la2 = north;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    pub fn with_decimal_scale(mut self, decimal_scale: i16) -> Self {
        self.decimal_scale = decimal_scale;
        self
    }

    /// Declare a data representation template other than simple packing.
    pub fn with_data_template(mut self, template: u16) -> Self {
        self.data_template = template;
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

    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Mask grid points (scanning-order indices) through a bitmap.
    pub fn with_missing(mut self, indices: &[usize]) -> Self {
        let mut present = vec![true; (self.ni * self.nj) as usize];
        for &i in indices {
            if let Some(p) = present.get_mut(i) {
                *p = false;
            }
        }
        self.present = Some(present);
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let mut message = Vec::new();

        let section1 = self.build_section1();
        let section3 = self.build_section3();
        let section4 = self.build_section4();
        let section5 = self.build_section5();
        let section6 = self.build_section6();
        let section7 = self.build_section7();

        let message_length = 16 // Section 0
            + section1.len()
            + section3.len()
            + section4.len()
            + section5.len()
            + section6.len()
            + section7.len()
            + 4; // Section 8 (end)

        // Section 0: Indicator
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]); // Reserved
        message.push(self.discipline);
        message.push(2); // Edition 2
        message.extend_from_slice(&(message_length as u64).to_be_bytes());

        message.extend_from_slice(&section1);
        message.extend_from_slice(&section3);
        message.extend_from_slice(&section4);
        message.extend_from_slice(&section5);
        message.extend_from_slice(&section6);
        message.extend_from_slice(&section7);

        // Section 8: End
        message.extend_from_slice(b"7777");

        message
    }

    /// Build the message and bzip2 it, the way the archive ships files.
    pub fn build_bz2(&self) -> Vec<u8> {
        bzip2_compress(&self.build())
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let section_length: u32 = 21;
        let (year, month, day, hour) = self.reference_time;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(1); // Section number

        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Significance of reference time (start of forecast)

        section.extend_from_slice(&year.to_be_bytes());
        section.push(month);
        section.push(day);
        section.push(hour);
        section.push(0); // Minute
        section.push(0); // Second

        section.push(0); // Production status (operational)
        section.push(1); // Type of data (forecast)

        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut section = Vec::new();

        // Template 3.0: Latitude/Longitude
        let template_data_len = 58;
        let section_length: u32 = 14 + template_data_len;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(3); // Section number

        section.push(0); // Source of grid definition
        section.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        section.push(0); // Number of octets for optional list
        section.push(0); // Interpretation of optional list
        section.extend_from_slice(&0u16.to_be_bytes()); // Grid definition template (0 = lat/lon)

        section.push(6); // Shape of Earth (spherical with radius 6371229m)
        section.push(0); // Scale factor of radius
        section.extend_from_slice(&0u32.to_be_bytes()); // Scaled value of radius
        section.push(0); // Scale factor of major axis
        section.extend_from_slice(&0u32.to_be_bytes()); // Scaled value of major axis
        section.push(0); // Scale factor of minor axis
        section.extend_from_slice(&0u32.to_be_bytes()); // Scaled value of minor axis

        section.extend_from_slice(&self.ni.to_be_bytes()); // Ni
        section.extend_from_slice(&self.nj.to_be_bytes()); // Nj
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&0xFFFFFFFFu32.to_be_bytes()); // Subdivisions

        section.extend_from_slice(&sign_magnitude32(self.la1)); // La1
        section.extend_from_slice(&sign_magnitude32(self.lo1)); // Lo1
        section.push(48); // Resolution and component flags (increments given)
        section.extend_from_slice(&sign_magnitude32(self.la2)); // La2
        section.extend_from_slice(&sign_magnitude32(self.lo2)); // Lo2
        section.extend_from_slice(&self.di.to_be_bytes()); // Di
        section.extend_from_slice(&self.dj.to_be_bytes()); // Dj
        section.push(self.scanning_mode);

        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::new();

        // Template 4.0: Analysis or forecast at horizontal level
        let section_length: u32 = 34;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(4); // Section number

        section.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        section.extend_from_slice(&0u16.to_be_bytes()); // Product definition template (0)

        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // Type of generating process (forecast)
        section.push(0); // Background generating process
        section.push(0); // Analysis or forecast process
        section.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        section.push(0); // Minutes of cutoff
        section.push(1); // Time range unit (hours)
        section.extend_from_slice(&self.forecast_hour.to_be_bytes());

        section.push(1); // Type of first fixed surface (ground)
        section.push(0); // Scale factor
        section.extend_from_slice(&0u32.to_be_bytes()); // Scaled value

        section.push(255); // Type of second fixed surface (none)
        section.push(0); // Scale factor
        section.extend_from_slice(&0u32.to_be_bytes()); // Scaled value

        section
    }

    fn build_section5(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let packing = self.packing();

        let section_length: u32 = 21;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(5); // Section number

        section.extend_from_slice(&(self.present_values().len() as u32).to_be_bytes());
        section.extend_from_slice(&self.data_template.to_be_bytes());

        section.extend_from_slice(&packing.reference_value.to_be_bytes());
        section.extend_from_slice(&sign_magnitude16(packing.binary_scale_factor));
        section.extend_from_slice(&sign_magnitude16(self.decimal_scale));
        section.push(packing.bits_per_value);
        section.push(0); // Original field type (floating point)

        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut section = Vec::new();

        match &self.present {
            None => {
                section.extend_from_slice(&6u32.to_be_bytes());
                section.push(6);
                section.push(255); // No bitmap, all data present
            }
            Some(present) => {
                let mut bits = vec![0u8; present.len().div_ceil(8)];
                for (i, _) in present.iter().enumerate().filter(|(_, p)| **p) {
                    bits[i / 8] |= 1 << (7 - (i % 8));
                }
                section.extend_from_slice(&(6 + bits.len() as u32).to_be_bytes());
                section.push(6);
                section.push(0); // Bitmap follows
                section.extend_from_slice(&bits);
            }
        }

        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let packed_data = self.pack_simple();

        let section_length: u32 = 5 + packed_data.len() as u32;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(7); // Section number
        section.extend_from_slice(&packed_data);

        section
    }

    fn present_values(&self) -> Vec<f32> {
        match &self.present {
            None => self.data_values.clone(),
            Some(present) => self
                .data_values
                .iter()
                .zip(present)
                .filter(|(_, p)| **p)
                .map(|(v, _)| *v)
                .collect(),
        }
    }

    fn packing(&self) -> Packing {
        // Pack the decimally scaled values Y = value * 10^D
        let decimal = 10.0_f32.powi(self.decimal_scale as i32);
        let (min_val, max_val) = self.present_values().iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY),
            |(min, max), &v| (min.min(v * decimal), max.max(v * decimal)),
        );
        let min_val = if min_val.is_finite() { min_val } else { 0.0 };
        let range = max_val - min_val;

        // Unpacking formula: Y = R + X * 2^E, 16 bit packed values
        if !(range > 0.0) {
            return Packing {
                reference_value: min_val,
                binary_scale_factor: 0,
                bits_per_value: 0,
            };
        }

        Packing {
            reference_value: min_val,
            binary_scale_factor: (range / 65535.0).log2().ceil() as i16,
            bits_per_value: 16,
        }
    }

    fn pack_simple(&self) -> Vec<u8> {
        let packing = self.packing();
        if packing.bits_per_value == 0 {
            return Vec::new();
        }

        let decimal = 10.0_f32.powi(self.decimal_scale as i32);
        let binary_scale = 2.0_f32.powi(packing.binary_scale_factor as i32);

        let mut packed = Vec::new();
        for val in self.present_values() {
            let packed_value =
                ((val * decimal - packing.reference_value) / binary_scale).round() as u16;
            packed.extend_from_slice(&packed_value.to_be_bytes());
        }
        packed
    }
}

struct Packing {
    reference_value: f32,
    binary_scale_factor: i16,
    bits_per_value: u8,
}

/// GRIB2 sign-magnitude encoding of a 32 bit integer.
pub fn sign_magnitude32(v: i32) -> [u8; 4] {
    let magnitude = v.unsigned_abs() & 0x7FFF_FFFF;
    let raw = if v < 0 { magnitude | 0x8000_0000 } else { magnitude };
    raw.to_be_bytes()
}

/// GRIB2 sign-magnitude encoding of a 16 bit integer.
pub fn sign_magnitude16(v: i16) -> [u8; 2] {
    let magnitude = v.unsigned_abs() & 0x7FFF;
    let raw = if v < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

/// bzip2-compress a buffer.
pub fn bzip2_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder
        .write_all(data)
        .expect("writing to an in-memory encoder cannot fail");
    encoder
        .finish()
        .expect("finishing an in-memory encoder cannot fail")
}
