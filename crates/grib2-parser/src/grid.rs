//! Coordinates of regular latitude/longitude grids (template 3.0).

use crate::sections::GridDefinition;
use crate::{Grib2Error, Result};

/// Scanning mode flag: points of the first row run west (i decreasing).
pub const SCAN_I_NEGATIVE: u8 = 0x80;
/// Scanning mode flag: rows run south to north (j increasing).
pub const SCAN_J_POSITIVE: u8 = 0x40;
/// Scanning mode flag: adjacent points are consecutive in j (column-major).
pub const SCAN_J_CONSECUTIVE: u8 = 0x20;

/// 1-D axes of a regular lat/lon grid, in the row/column order of the
/// unpacked field (row `j` has latitude `latitudes[j]`).
#[derive(Debug, Clone, PartialEq)]
pub struct LatLonGrid {
    pub ni: usize,
    pub nj: usize,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
}

impl LatLonGrid {
    /// Build the axes from a grid definition.
    ///
    /// Axis values are interpolated between the first and last grid points
    /// rather than accumulated from the stored increments. Longitudes are
    /// normalised to `[0, 360)` when the grid crosses the prime meridian
    /// from east to west (`lo2 < lo1` with i increasing).
    pub fn from_definition(gd: &GridDefinition) -> Result<Self> {
        if !gd.is_lat_lon() {
            return Err(Grib2Error::UnsupportedGrid(gd.template));
        }

        let ni = gd.num_points_longitude as usize;
        let nj = gd.num_points_latitude as usize;
        if ni == 0 || nj == 0 {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: format!("Empty grid {}x{}", ni, nj),
            });
        }

        let la1 = gd.to_degrees(gd.first_latitude);
        let la2 = gd.to_degrees(gd.last_latitude);
        let lo1 = gd.to_degrees(gd.first_longitude);
        let mut lo2 = gd.to_degrees(gd.last_longitude);

        if gd.scanning_mode & SCAN_I_NEGATIVE == 0 && lo2 < lo1 {
            lo2 += 360.0;
        } else if gd.scanning_mode & SCAN_I_NEGATIVE != 0 && lo2 > lo1 {
            lo2 -= 360.0;
        }

        let latitudes = linspace(la1, la2, nj);
        let longitudes = linspace(lo1, lo2, ni)
            .into_iter()
            .map(|lon| if lon >= 360.0 { lon - 360.0 } else { lon })
            .collect();

        Ok(Self {
            ni,
            nj,
            latitudes,
            longitudes,
        })
    }

    /// Paired 2-D latitude and longitude meshes, row-major `[nj][ni]`.
    pub fn mesh(&self) -> (Vec<f64>, Vec<f64>) {
        let mut lats = Vec::with_capacity(self.ni * self.nj);
        let mut lons = Vec::with_capacity(self.ni * self.nj);
        for lat in &self.latitudes {
            for lon in &self.longitudes {
                lats.push(*lat);
                lons.push(*lon);
            }
        }
        (lats, lons)
    }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|k| start + step * k as f64).collect()
}
