//! Synthetic forecast cycle directories.
//!
//! Writes GRIB2 files named the way the GDPS and GFS distributions name
//! them, so the assembly pipeline can be exercised end-to-end. Every frame
//! holds `lead_hour * 1000 + level + k` in cell `k`, which lets tests
//! recover the lead time and level of any assembled frame from its first
//! cell.

use crate::generators::create_frame_grid;
use crate::grib2::Grib2Builder;
use std::path::{Path, PathBuf};

/// One GDPS variable as it appears in file names and GRIB headers.
#[derive(Debug, Clone, Copy)]
pub struct GdpsField {
    /// `<VAR>_<LEVTYPE>` part of the file name, e.g. `TMP_ISBL`
    pub token: &'static str,
    pub category: u8,
    pub number: u8,
    pub level_type: u8,
}

pub const GDPS_DSWRF: GdpsField = GdpsField {
    token: "DSWRF_SFC",
    category: 4,
    number: 7,
    level_type: 1,
};

pub const GDPS_TCDC: GdpsField = GdpsField {
    token: "TCDC_SFC",
    category: 6,
    number: 1,
    level_type: 1,
};

pub const GDPS_TMP: GdpsField = GdpsField {
    token: "TMP_ISBL",
    category: 0,
    number: 0,
    level_type: 100,
};

pub const GDPS_WIND: GdpsField = GdpsField {
    token: "WIND_TGL",
    category: 2,
    number: 1,
    level_type: 103,
};

pub const GDPS_WDIR: GdpsField = GdpsField {
    token: "WDIR_TGL",
    category: 2,
    number: 0,
    level_type: 103,
};

/// GDPS file name for one field, level and lead hour.
///
/// `cycle` is `YYYYMMDDHH`.
pub fn gdps_filename(field: &GdpsField, level: &str, cycle: &str, lead_hour: u32) -> String {
    format!(
        "CMC_glb_{}_{}_latlon.15x.15_{}_P{:03}.grib2",
        field.token, level, cycle, lead_hour
    )
}

/// GFS file name; `date` is `YYYYMMDD`, `time` is `HHMM`.
pub fn gfs_filename(date: &str, time: &str, lead_hour: u32) -> String {
    format!("gfs_4_{}_{}_{:03}.grb2", date, time, lead_hour)
}

/// Writes synthetic cycles into a directory.
#[derive(Debug, Clone)]
pub struct CycleFixture {
    dir: PathBuf,
    ni: u32,
    nj: u32,
}

impl CycleFixture {
    /// Fixture writing 4x3 grids into `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ni: 4,
            nj: 3,
        }
    }

    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one GDPS file per lead hour for a single level.
    ///
    /// `level` is the file-name token (`850` hPa, `10` m, `0` for surface
    /// fields); the GRIB level is converted to Pa for isobaric fields.
    pub fn write_gdps_series(
        &self,
        field: &GdpsField,
        level: &str,
        cycle: &str,
        lead_hours: impl IntoIterator<Item = u32>,
    ) -> Vec<PathBuf> {
        let level_number: f64 = level.parse().unwrap_or(0.0);
        let grib_level = if field.level_type == 100 {
            level_number * 100.0
        } else {
            level_number
        };
        let (year, month, day, hour) = split_cycle(cycle);

        lead_hours
            .into_iter()
            .map(|lead| {
                let data = create_frame_grid(
                    self.ni as usize,
                    self.nj as usize,
                    (lead as f64 * 1000.0 + level_number) as f32,
                );
                let message = Grib2Builder::new()
                    .with_reference_time(year, month, day, hour)
                    .with_grid(self.ni, self.nj)
                    .with_parameter(field.category, field.number)
                    .with_level(field.level_type, grib_level)
                    .with_forecast_hour(lead)
                    .with_data(data)
                    .build();
                let path = self.dir.join(gdps_filename(field, level, cycle, lead));
                write_file(&path, &message);
                path
            })
            .collect()
    }

    /// Write one GFS file per lead hour, each holding surface downward
    /// short-wave flux and 2 m temperature.
    pub fn write_gfs_series(
        &self,
        date: &str,
        time: &str,
        lead_hours: impl IntoIterator<Item = u32>,
    ) -> Vec<PathBuf> {
        let (year, month, day, _) = split_cycle(&format!("{}00", date));
        let hour: u8 = time.get(0..2).and_then(|h| h.parse().ok()).unwrap_or(0);
        let minute: u8 = time.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);

        lead_hours
            .into_iter()
            .map(|lead| {
                let base = Grib2Builder::new_gfs()
                    .with_reference_time(year, month, day, hour)
                    .with_reference_minute(minute)
                    .with_grid(self.ni, self.nj)
                    .with_forecast_hour(lead);
                let (ni, nj) = (self.ni as usize, self.nj as usize);

                let mut bytes = base
                    .clone()
                    .with_parameter(4, 7)
                    .with_level(1, 0.0)
                    .with_data(create_frame_grid(ni, nj, lead as f32 * 1000.0))
                    .build();
                bytes.extend(
                    base.with_parameter(0, 0)
                        .with_level(103, 2.0)
                        .with_data(create_frame_grid(ni, nj, lead as f32 * 1000.0 + 2.0))
                        .build(),
                );

                let path = self.dir.join(gfs_filename(date, time, lead));
                write_file(&path, &bytes);
                path
            })
            .collect()
    }
}

fn split_cycle(cycle: &str) -> (u16, u8, u8, u8) {
    let part = |range: std::ops::Range<usize>| cycle.get(range).and_then(|s| s.parse().ok());
    (
        part(0..4).unwrap_or(2024),
        part(4..6).unwrap_or(1) as u8,
        part(6..8).unwrap_or(1) as u8,
        part(8..10).unwrap_or(0) as u8,
    )
}

fn write_file(path: &Path, bytes: &[u8]) {
    std::fs::write(path, bytes)
        .unwrap_or_else(|e| panic!("Failed to write fixture {}: {}", path.display(), e));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gdps_filename() {
        assert_eq!(
            gdps_filename(&GDPS_TMP, "850", "2024010112", 3),
            "CMC_glb_TMP_ISBL_850_latlon.15x.15_2024010112_P003.grib2"
        );
    }

    #[test]
    fn test_gfs_filename() {
        assert_eq!(gfs_filename("20240101", "0600", 12), "gfs_4_20240101_0600_012.grb2");
    }

    #[test]
    fn test_split_cycle() {
        assert_eq!(split_cycle("2023123118"), (2023, 12, 31, 18));
    }

    #[test]
    fn test_write_series() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = CycleFixture::new(dir.path());

        let paths = fixture.write_gdps_series(&GDPS_TCDC, "0", "2024010100", (0..24).step_by(3));
        assert_eq!(paths.len(), 8);
        assert!(paths.iter().all(|p| p.exists()));

        let gfs = fixture.write_gfs_series("20240101", "0000", [3, 6]);
        assert_eq!(gfs.len(), 2);
    }
}
