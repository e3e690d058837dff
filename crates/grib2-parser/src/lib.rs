//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! Splits a GRIB2 byte stream into messages and decodes the parts a gridded
//! forecast field needs: parameter and level codes, reference and lead time,
//! the regular lat/lon grid, and the unpacked values.
//!
//! ```no_run
//! use std::sync::Arc;
//! use grib2_parser::{Grib2Reader, Grib2Tables};
//!
//! let bytes = std::fs::read("CMC_glb_TMP_ISBL_850_latlon.15x.15_2024010100_P003.grib2").unwrap();
//! let mut reader = Grib2Reader::new(bytes.into(), Arc::new(Grib2Tables::standard()));
//! while let Some(message) = reader.next_message().unwrap() {
//!     let grid = message.lat_lon_grid().unwrap();
//!     let values = message.unpack_data().unwrap();
//!     println!("{} {} {}x{} {}", message.parameter(), message.level(), grid.nj, grid.ni, values.len());
//! }
//! ```

pub mod grid;
pub mod sections;
pub mod tables;
pub mod unpacking;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use grid::LatLonGrid;
pub use sections::{
    Bitmap, DataRepresentation, DataSection, GridDefinition, Identification, Indicator,
    ProductDefinition,
};
pub use tables::{Grib2Tables, LevelDescription};

#[derive(Error, Debug)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unpacking error: {0}")]
    UnpackingError(String),

    #[error("Unsupported grid template 3.{0}")]
    UnsupportedGrid(u16),
}

pub type Result<T> = std::result::Result<T, Grib2Error>;

/// Iterates the messages of a GRIB2 byte stream.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
    tables: Arc<Grib2Tables>,
}

impl Grib2Reader {
    pub fn new(data: Bytes, tables: Arc<Grib2Tables>) -> Self {
        Self {
            data,
            offset: 0,
            tables,
        }
    }

    /// Size of the underlying buffer in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Decode the next message, or `None` at end of data.
    ///
    /// Bytes between messages are skipped up to the next `GRIB` marker.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>> {
        let start = match find_marker(&self.data[self.offset..]) {
            Some(pos) => self.offset + pos,
            None => {
                self.offset = self.data.len();
                return Ok(None);
            }
        };

        if start > self.offset {
            debug!(
                offset = self.offset,
                skipped = start - self.offset,
                "Skipped bytes before GRIB marker"
            );
        }

        let indicator = sections::parse_indicator(&self.data[start..])?;
        let length = indicator.message_length as usize;
        if length < 16 || start + length > self.data.len() {
            return Err(Grib2Error::InvalidFormat(format!(
                "Message at offset {} declares {} bytes, {} available",
                start,
                length,
                self.data.len() - start
            )));
        }

        let raw = self.data.slice(start..start + length);
        self.offset = start + length;

        Grib2Message::parse(raw, &self.tables).map(Some)
    }

    /// Decode every remaining message.
    pub fn messages(&mut self) -> Result<Vec<Grib2Message>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }
}

fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}

/// One decoded GRIB2 message (first field only when a message repeats
/// sections 3-7).
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub raw: Bytes,
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub bitmap: Option<Bitmap>,
    pub data_section: DataSection,
}

impl Grib2Message {
    /// Parse a message from its raw bytes.
    pub fn parse(raw: Bytes, tables: &Grib2Tables) -> Result<Self> {
        let indicator = sections::parse_indicator(&raw)?;
        let identification = sections::parse_identification(&raw)?;
        let grid_definition = sections::parse_grid_definition(&raw)?;
        let mut product_definition = sections::parse_product_definition(&raw)?;
        let data_representation = sections::parse_data_representation(&raw)?;
        let bitmap = sections::parse_bitmap(&raw)?;
        let data_section = sections::parse_data_section(&raw)?;

        product_definition.parameter_short_name = tables.get_parameter_name(
            indicator.discipline,
            product_definition.parameter_category,
            product_definition.parameter_number,
        );
        product_definition.level_description = tables.get_level_description(
            product_definition.level_type,
            product_definition.level_value,
        );

        Ok(Self {
            raw,
            indicator,
            identification,
            grid_definition,
            product_definition,
            data_representation,
            bitmap,
            data_section,
        })
    }

    /// Parameter short name, e.g. `TMP`.
    pub fn parameter(&self) -> &str {
        &self.product_definition.parameter_short_name
    }

    /// Readable level, e.g. `850 mb`.
    pub fn level(&self) -> &str {
        &self.product_definition.level_description
    }

    /// Grid shape as `(rows, columns)` = `(Nj, Ni)`.
    pub fn grid_dims(&self) -> (usize, usize) {
        (
            self.grid_definition.num_points_latitude as usize,
            self.grid_definition.num_points_longitude as usize,
        )
    }

    /// Forecast cycle initialisation time.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.identification.reference_time
    }

    pub fn lead_time(&self) -> Option<Duration> {
        self.product_definition.lead_time()
    }

    pub fn valid_time(&self) -> Option<DateTime<Utc>> {
        self.lead_time().map(|lead| self.reference_time() + lead)
    }

    pub fn lat_lon_grid(&self) -> Result<LatLonGrid> {
        LatLonGrid::from_definition(&self.grid_definition)
    }

    /// Unpack the field into row-major `[Nj][Ni]` order, missing points as NaN.
    pub fn unpack_data(&self) -> Result<Vec<f32>> {
        let drs = &self.data_representation;

        let mut values = if drs.template == 0 {
            let num_points = self.grid_definition.num_data_points;
            unpacking::unpack_simple(
                &self.data_section.data,
                num_points,
                drs.bits_per_value,
                drs.reference_value,
                drs.binary_scale_factor,
                drs.decimal_scale_factor,
                self.bitmap.as_ref().map(|b| b.data.as_ref()),
            )?
            .into_iter()
            .map(|v| v.unwrap_or(f32::NAN))
            .collect()
        } else {
            debug!(
                template = drs.template,
                discipline = self.indicator.discipline,
                "Unpacking field with the grib crate"
            );
            unpacking::unpack_with_grib_crate(&self.raw)?
        };

        let (nj, ni) = self.grid_dims();
        if self.grid_definition.is_lat_lon() && values.len() != ni * nj {
            return Err(Grib2Error::UnpackingError(format!(
                "Unpacked {} values for a {}x{} grid",
                values.len(),
                nj,
                ni
            )));
        }

        if self.grid_definition.scanning_mode & grid::SCAN_J_CONSECUTIVE != 0 {
            values = transpose(&values, ni, nj);
        }

        Ok(values)
    }
}

/// Reorder column-major (j consecutive) values to row-major.
fn transpose(values: &[f32], ni: usize, nj: usize) -> Vec<f32> {
    let mut out = vec![f32::NAN; values.len()];
    for i in 0..ni {
        for j in 0..nj {
            out[j * ni + i] = values[i * nj + j];
        }
    }
    out
}
