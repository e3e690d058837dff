//! File name conventions of the source products.
//!
//! GDPS: `CMC_glb_<VAR>_<LEVTYPE>_<LEVEL>_latlon<res>_<YYYYMMDDHH>_P<HHH>.grib2`
//! GFS:  `gfs_<grid>_<YYYYMMDD>_<HHMM>_<HHH>.grb2`
//!
//! Either may carry an extra `.gz` suffix.

use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::variables::Product;

/// Metadata carried by a source file name.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFileName {
    /// Cycle initialisation time.
    pub cycle: DateTime<Utc>,
    /// Forecast lead in hours.
    pub lead_hour: u32,
    /// `<VAR>_<LEVTYPE>` token (GDPS only).
    pub variable_token: Option<String>,
    /// Level token, e.g. `850` (GDPS only).
    pub level_token: Option<String>,
}

/// Whether the file is gzip-compressed.
pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Parse a file name following `product`'s convention.
pub fn parse_filename(product: Product, file_name: &str) -> Option<SourceFileName> {
    match product {
        Product::Gdps => parse_gdps_filename(file_name),
        Product::Gfs => parse_gfs_filename(file_name),
    }
}

/// Parse a GDPS file name. The level token is the fifth underscore-delimited
/// token and the cycle the ten characters before `_P<HHH>`.
pub fn parse_gdps_filename(file_name: &str) -> Option<SourceFileName> {
    let stem = strip_extension(file_name, &[".grib2"])?;
    let tokens: Vec<&str> = stem.split('_').collect();
    if tokens.len() < 8 || tokens[0] != "CMC" {
        return None;
    }

    let lead_token = tokens[tokens.len() - 1].strip_prefix('P')?;
    let cycle_token = tokens[tokens.len() - 2];
    if !is_digits(cycle_token, 10) {
        return None;
    }

    Some(SourceFileName {
        cycle: parse_cycle(&cycle_token[0..8], &cycle_token[8..10], "00")?,
        lead_hour: parse_digits(lead_token, 3)?,
        variable_token: Some(format!("{}_{}", tokens[2], tokens[3])),
        level_token: Some(tokens[4].to_string()),
    })
}

/// Parse a GFS file name.
pub fn parse_gfs_filename(file_name: &str) -> Option<SourceFileName> {
    let stem = strip_extension(file_name, &[".grb2", ".grib2"])?;
    let tokens: Vec<&str> = stem.split('_').collect();
    if tokens.len() != 5 || !tokens[0].eq_ignore_ascii_case("gfs") {
        return None;
    }

    let (date, time) = (tokens[2], tokens[3]);
    if !is_digits(date, 8) || !is_digits(time, 4) {
        return None;
    }

    Some(SourceFileName {
        cycle: parse_cycle(date, &time[0..2], &time[2..4])?,
        lead_hour: parse_digits(tokens[4], 3)?,
        variable_token: None,
        level_token: None,
    })
}

/// Output store name for a cycle: `CMC_<YYYYMMDD>_<HH>.zarr` or
/// `GFS_<YYYYMMDD>_<HHMM>.zarr`.
pub fn output_file_name(product: Product, cycle: DateTime<Utc>) -> String {
    match product {
        Product::Gdps => format!("CMC_{}.zarr", cycle.format("%Y%m%d_%H")),
        Product::Gfs => format!("GFS_{}.zarr", cycle.format("%Y%m%d_%H%M")),
    }
}

fn strip_extension<'a>(file_name: &'a str, extensions: &[&str]) -> Option<&'a str> {
    let name = file_name.strip_suffix(".gz").unwrap_or(file_name);
    extensions
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .filter(|stem| !stem.is_empty())
}

/// Exactly `len` ASCII digits, so byte offsets fall on char boundaries.
fn is_digits(token: &str, len: usize) -> bool {
    token.len() == len && token.bytes().all(|b| b.is_ascii_digit())
}

fn parse_digits(token: &str, min_len: usize) -> Option<u32> {
    if token.len() < min_len || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn parse_cycle(date: &str, hour: &str, minute: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let hour = parse_digits(hour, 2)?;
    let minute = parse_digits(minute, 2)?;
    let naive = date.and_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}
