//! Dataset data model: coordinates, variable blocks and the merged dataset.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use ndarray::{ArrayD, IxDyn};

use crate::error::{DatasetError, Result};
use crate::layout::GridLayout;

/// Units of cycle date coordinates.
pub const DATE_UNITS: &str = "days since 1970-01-01";
/// Units of cycle time-of-day coordinates.
pub const TIME_UNITS: &str = "minutes since 00:00";
/// Units of lead time coordinates.
pub const LEAD_UNITS: &str = "hours";

/// Coordinate payload; 1-D for axes, 2-D for curvilinear meshes.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateValues {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
}

impl CoordinateValues {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(a) => a.shape(),
            Self::Int(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float(a) => a.len(),
            Self::Int(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as `f64`, in row-major order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Self::Float(a) => a.iter().copied().collect(),
            Self::Int(a) => a.iter().map(|v| *v as f64).collect(),
        }
    }
}

/// A labelled axis (or 2-D coordinate mesh) of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub dims: Vec<String>,
    pub values: CoordinateValues,
    pub units: String,
    pub long_name: String,
}

impl Coordinate {
    /// A 1-D float coordinate indexed by its own dimension.
    pub fn float_axis(
        name: impl Into<String>,
        values: Vec<f64>,
        units: impl Into<String>,
        long_name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            dims: vec![name.clone()],
            name,
            values: CoordinateValues::Float(to_1d(values)),
            units: units.into(),
            long_name: long_name.into(),
        }
    }

    /// A 1-D integer coordinate indexed by its own dimension.
    pub fn int_axis(
        name: impl Into<String>,
        values: Vec<i64>,
        units: impl Into<String>,
        long_name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            dims: vec![name.clone()],
            name,
            values: CoordinateValues::Int(to_1d(values)),
            units: units.into(),
            long_name: long_name.into(),
        }
    }

    /// Cycle date as days since the Unix epoch.
    pub fn cycle_date(name: impl Into<String>, reference_time: DateTime<Utc>) -> Self {
        let days = reference_time.timestamp().div_euclid(86_400);
        Self::int_axis(name, vec![days], DATE_UNITS, "forecast cycle date")
    }

    /// Cycle time of day in minutes.
    pub fn cycle_time(name: impl Into<String>, reference_time: DateTime<Utc>) -> Self {
        let minutes = reference_time.hour() as i64 * 60 + reference_time.minute() as i64;
        Self::int_axis(name, vec![minutes], TIME_UNITS, "forecast cycle time of day")
    }

    /// Lead time axis in whole hours.
    pub fn lead_hours(name: impl Into<String>, hours: Vec<i64>) -> Self {
        Self::int_axis(name, hours, LEAD_UNITS, "forecast lead time")
    }

    /// Length along each of `dims`.
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }
}

/// Decode a cycle date/time coordinate pair back into a timestamp.
pub fn reference_time_from(date_days: i64, time_minutes: i64) -> Option<DateTime<Utc>> {
    let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)?
        .checked_add_signed(chrono::Duration::days(date_days))?;
    let time = NaiveTime::from_hms_opt((time_minutes / 60) as u32, (time_minutes % 60) as u32, 0)?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(time), Utc))
}

fn to_1d<T>(values: Vec<T>) -> ArrayD<T> {
    ndarray::Array1::from(values).into_dyn()
}

/// Raw paired latitude/longitude meshes of one field, `[ny, nx]` each.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialGrid {
    pub latitudes: ndarray::Array2<f64>,
    pub longitudes: ndarray::Array2<f64>,
}

impl SpatialGrid {
    /// Build from row-major meshes of identical shape.
    pub fn from_meshes(ny: usize, nx: usize, lats: Vec<f64>, lons: Vec<f64>) -> Result<Self> {
        let latitudes = ndarray::Array2::from_shape_vec((ny, nx), lats)
            .map_err(|e| DatasetError::dimension_mismatch("latitude", e.to_string()))?;
        let longitudes = ndarray::Array2::from_shape_vec((ny, nx), lons)
            .map_err(|e| DatasetError::dimension_mismatch("longitude", e.to_string()))?;
        Ok(Self {
            latitudes,
            longitudes,
        })
    }

    /// `(ny, nx)`
    pub fn shape(&self) -> (usize, usize) {
        self.latitudes.dim()
    }
}

/// One assembled physical variable of a cycle.
///
/// `coords` holds every non-spatial coordinate of the block (cycle date and
/// time, lead time, level); the spatial coordinates come from `grid`.
#[derive(Debug, Clone)]
pub struct VariableBlock {
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
    pub coords: Vec<Coordinate>,
    pub grid: GridLayout,
}

impl VariableBlock {
    /// Create a block, checking that every dimension length matches the
    /// coordinates declared for it.
    pub fn new(
        name: impl Into<String>,
        long_name: impl Into<String>,
        units: impl Into<String>,
        dims: Vec<String>,
        data: ArrayD<f32>,
        coords: Vec<Coordinate>,
        grid: GridLayout,
    ) -> Result<Self> {
        let block = Self {
            name: name.into(),
            long_name: long_name.into(),
            units: units.into(),
            dims,
            data,
            coords,
            grid,
        };
        block.validate()?;
        Ok(block)
    }

    fn validate(&self) -> Result<()> {
        if self.dims.len() != self.data.ndim() {
            return Err(DatasetError::dimension_mismatch(
                &self.name,
                format!(
                    "{} dimension names for a {}-D array",
                    self.dims.len(),
                    self.data.ndim()
                ),
            ));
        }

        let mut all_coords: Vec<Coordinate> = self.coords.clone();
        all_coords.extend(self.grid.coordinates());

        for coord in &all_coords {
            for (axis, dim) in coord.dims.iter().enumerate() {
                let position = self.dims.iter().position(|d| d == dim).ok_or_else(|| {
                    DatasetError::dimension_mismatch(
                        &self.name,
                        format!("coordinate '{}' uses unknown dimension '{}'", coord.name, dim),
                    )
                })?;
                let expected = self.data.shape()[position];
                let actual = coord.shape()[axis];
                if expected != actual {
                    return Err(DatasetError::dimension_mismatch(
                        &self.name,
                        format!(
                            "dimension '{}' has length {} but coordinate '{}' has {}",
                            dim, expected, coord.name, actual
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coords.iter().find(|c| c.name == name)
    }
}

/// A variable as stored in the merged dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVariable {
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
}

/// All variables of one forecast cycle under a shared coordinate set.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDataset {
    pub product: String,
    pub reference_time: DateTime<Utc>,
    pub variables: Vec<DataVariable>,
    pub coordinates: Vec<Coordinate>,
}

impl OutputDataset {
    pub fn variable(&self, name: &str) -> Option<&DataVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coordinates.iter().find(|c| c.name == name)
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cycle_coordinates() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 12, 30, 0).unwrap();
        let date = Coordinate::cycle_date("forecastdate", t);
        let time = Coordinate::cycle_time("forecasttime", t);

        assert_eq!(date.values, CoordinateValues::Int(to_1d(vec![19724])));
        assert_eq!(time.values, CoordinateValues::Int(to_1d(vec![750])));
        assert_eq!(reference_time_from(19724, 750), Some(t));
    }

    #[test]
    fn test_block_rejects_wrong_coordinate_length() {
        let grid = GridLayout::Separable {
            latitude: vec![1.0, 0.0],
            longitude: vec![0.0, 1.0, 2.0],
        };
        let data = ArrayD::zeros(IxDyn(&[3, 2, 3]));
        let dims = vec!["step".to_string(), "latitude".to_string(), "longitude".to_string()];

        let ok = VariableBlock::new(
            "t",
            "temperature",
            "K",
            dims.clone(),
            data.clone(),
            vec![Coordinate::lead_hours("step", vec![0, 3, 6])],
            grid.clone(),
        );
        assert!(ok.is_ok());

        let bad = VariableBlock::new(
            "t",
            "temperature",
            "K",
            dims,
            data,
            vec![Coordinate::lead_hours("step", vec![0, 3])],
            grid,
        );
        assert!(matches!(bad, Err(DatasetError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_spatial_grid_from_meshes() {
        let grid = SpatialGrid::from_meshes(2, 2, vec![1.0, 1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(grid.shape(), (2, 2));
        assert!(SpatialGrid::from_meshes(2, 3, vec![0.0; 4], vec![0.0; 4]).is_err());
    }
}
