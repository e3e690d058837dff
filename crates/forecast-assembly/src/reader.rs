//! Record Reader: decode the single field of a variable from a source file.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use forecast_dataset::SpatialGrid;
use grib2_parser::{Grib2Message, Grib2Reader, Grib2Tables};
use tracing::debug;

use crate::error::{AssemblyError, Result};
use crate::naming::is_gzip;

/// Tolerance when comparing header level values.
const LEVEL_TOLERANCE: f64 = 1e-6;

/// Identifies the GRIB field holding a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSelector {
    /// Parameter short name, e.g. `TMP`.
    pub parameter: &'static str,
    pub level_type: Option<u8>,
    /// Level value in header units (Pa, m).
    pub level_value: Option<f64>,
}

impl FieldSelector {
    /// Match any field with this parameter.
    pub const fn parameter(parameter: &'static str) -> Self {
        Self {
            parameter,
            level_type: None,
            level_value: None,
        }
    }

    pub const fn at_level_type(mut self, level_type: u8) -> Self {
        self.level_type = Some(level_type);
        self
    }

    pub const fn at_level(mut self, level_type: u8, level_value: f64) -> Self {
        self.level_type = Some(level_type);
        self.level_value = Some(level_value);
        self
    }

    pub fn matches(&self, message: &Grib2Message) -> bool {
        let pds = &message.product_definition;
        message.parameter() == self.parameter
            && self.level_type.map_or(true, |t| pds.level_type == t)
            && self
                .level_value
                .map_or(true, |v| (pds.level_value - v).abs() <= LEVEL_TOLERANCE)
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.parameter)?;
        match (self.level_type, self.level_value) {
            (Some(t), Some(v)) => write!(f, " (level {} = {})", t, v),
            (Some(t), None) => write!(f, " (level {})", t),
            _ => Ok(()),
        }
    }
}

/// One decoded 2-D field of a single variable, level and lead time.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub variable: String,
    /// Row-major `[ny][nx]` values, NaN where missing.
    pub data: Vec<f32>,
    pub ny: usize,
    pub nx: usize,
    /// Row-major latitude mesh.
    pub latitudes: Vec<f64>,
    /// Row-major longitude mesh.
    pub longitudes: Vec<f64>,
    /// Cycle initialisation time from the record header.
    pub reference_time: DateTime<Utc>,
    pub lead_time: Option<Duration>,
    /// Level value from the record header.
    pub level: Option<f64>,
}

impl SourceRecord {
    /// `(ny, nx)`
    pub fn shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    pub fn spatial_grid(&self) -> forecast_dataset::Result<SpatialGrid> {
        SpatialGrid::from_meshes(
            self.ny,
            self.nx,
            self.latitudes.clone(),
            self.longitudes.clone(),
        )
    }
}

/// Source of decoded records.
pub trait RecordReader: Send + Sync {
    /// Read the unique field matching `selector` from `path`.
    ///
    /// Fails with [`AssemblyError::VariableNotFound`] when no field matches
    /// and [`AssemblyError::AmbiguousVariable`] when several do.
    fn read(&self, path: &Path, selector: &FieldSelector) -> Result<SourceRecord>;
}

/// [`RecordReader`] for GRIB2 files, plain or gzip-compressed.
#[derive(Debug, Clone)]
pub struct Grib2RecordReader {
    tables: Arc<Grib2Tables>,
}

impl Default for Grib2RecordReader {
    fn default() -> Self {
        Self::new(Arc::new(Grib2Tables::standard()))
    }
}

impl Grib2RecordReader {
    pub fn new(tables: Arc<Grib2Tables>) -> Self {
        Self { tables }
    }
}

impl RecordReader for Grib2RecordReader {
    fn read(&self, path: &Path, selector: &FieldSelector) -> Result<SourceRecord> {
        let data = read_file_bytes(path)?;
        let grib_err = |source| AssemblyError::Grib2 {
            path: path.to_path_buf(),
            source,
        };

        let messages = Grib2Reader::new(data, self.tables.clone())
            .messages()
            .map_err(grib_err)?;
        let total = messages.len();

        let mut matching: Vec<Grib2Message> =
            messages.into_iter().filter(|m| selector.matches(m)).collect();
        let message = match matching.len() {
            0 => {
                return Err(AssemblyError::VariableNotFound {
                    variable: selector.to_string(),
                    path: path.to_path_buf(),
                })
            }
            1 => matching.remove(0),
            count => {
                return Err(AssemblyError::AmbiguousVariable {
                    variable: selector.to_string(),
                    path: path.to_path_buf(),
                    count,
                })
            }
        };

        let grid = message.lat_lon_grid().map_err(grib_err)?;
        let values = message.unpack_data().map_err(grib_err)?;
        let (latitudes, longitudes) = grid.mesh();

        debug!(
            path = %path.display(),
            parameter = %message.parameter(),
            level = %message.level(),
            messages = total,
            ny = grid.nj,
            nx = grid.ni,
            "Read record"
        );

        Ok(SourceRecord {
            variable: message.parameter().to_string(),
            data: values,
            ny: grid.nj,
            nx: grid.ni,
            latitudes,
            longitudes,
            reference_time: message.reference_time(),
            lead_time: message.lead_time(),
            level: Some(message.product_definition.level_value),
        })
    }
}

/// Read a whole file, decompressing `.gz` files.
pub fn read_file_bytes(path: &Path) -> Result<Bytes> {
    let raw = std::fs::read(path).map_err(|e| AssemblyError::io(path, e))?;
    if is_gzip(path) {
        decompress_gzip(&raw)
    } else {
        Ok(Bytes::from(raw))
    }
}

/// Decompress gzip-compressed GRIB2 data.
pub fn decompress_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| AssemblyError::Decompression(e.to_string()))?;
    Ok(Bytes::from(decompressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use test_utils::{create_constant_grid, Grib2Builder};

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_read_single_field() {
        let dir = tempfile::tempdir().unwrap();
        let message = Grib2Builder::new()
            .with_reference_time(2024, 1, 1, 12)
            .with_grid(4, 3)
            .with_parameter(0, 0)
            .with_level(100, 85000.0)
            .with_forecast_hour(6)
            .with_data(create_constant_grid(4, 3, 271.5))
            .build();
        let path = write(dir.path(), "tmp.grib2", &message);

        let record = Grib2RecordReader::default()
            .read(&path, &FieldSelector::parameter("TMP"))
            .unwrap();

        assert_eq!(record.variable, "TMP");
        assert_eq!(record.shape(), (3, 4));
        assert_eq!(record.data.len(), 12);
        assert!(record.data.iter().all(|v| (v - 271.5).abs() < 0.01));
        assert_eq!(record.latitudes.len(), 12);
        assert_eq!(record.lead_time, Some(Duration::hours(6)));
        assert_eq!(record.level, Some(85000.0));
        assert_eq!(record.reference_time.to_rfc3339(), "2024-01-01T12:00:00+00:00");
    }

    #[test]
    fn test_variable_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "tmp.grib2", &Grib2Builder::new().build());

        let err = Grib2RecordReader::default()
            .read(&path, &FieldSelector::parameter("WIND"))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::VariableNotFound { .. }));
    }

    #[test]
    fn test_ambiguous_variable() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Grib2Builder::new().with_level(103, 2.0).build();
        bytes.extend(Grib2Builder::new().with_level(100, 50000.0).build());
        let path = write(dir.path(), "two.grib2", &bytes);

        let reader = Grib2RecordReader::default();
        match reader.read(&path, &FieldSelector::parameter("TMP")) {
            Err(AssemblyError::AmbiguousVariable { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected result {other:?}"),
        }

        let record = reader
            .read(&path, &FieldSelector::parameter("TMP").at_level(103, 2.0))
            .unwrap();
        assert_eq!(record.level, Some(2.0));
    }

    #[test]
    fn test_read_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&Grib2Builder::new().build()).unwrap();
        let path = write(dir.path(), "tmp.grib2.gz", &encoder.finish().unwrap());

        let record = Grib2RecordReader::default()
            .read(&path, &FieldSelector::parameter("TMP"))
            .unwrap();
        assert_eq!(record.shape(), (3, 4));
    }

    #[test]
    fn test_missing_file_and_corrupt_data() {
        let dir = tempfile::tempdir().unwrap();
        let reader = Grib2RecordReader::default();

        let err = reader
            .read(&dir.path().join("absent.grib2"), &FieldSelector::parameter("TMP"))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Io { .. }));

        let path = write(dir.path(), "bad.grib2.gz", b"not gzip");
        let err = reader.read(&path, &FieldSelector::parameter("TMP")).unwrap_err();
        assert!(matches!(err, AssemblyError::Decompression(_)));
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(FieldSelector::parameter("TMP").to_string(), "TMP");
        assert_eq!(
            FieldSelector::parameter("TMP").at_level(103, 2.0).to_string(),
            "TMP (level 103 = 2)"
        );
    }
}
