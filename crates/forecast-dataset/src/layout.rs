//! Spatial grid regularity detection.
//!
//! A mesh is separable when latitude is constant along each row and
//! longitude is constant along each column; it then collapses to two 1-D
//! axes. Anything else keeps the full 2-D meshes on generic `y`/`x` dims.

use ndarray::{Array2, Axis};

use crate::types::{Coordinate, CoordinateValues, SpatialGrid};

/// Tolerance (degrees) for treating two coordinates as equal.
const COORD_TOLERANCE: f64 = 1e-9;

/// Spatial coordinates of a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum GridLayout {
    /// Regular lat/lon grid with 1-D axes.
    Separable {
        latitude: Vec<f64>,
        longitude: Vec<f64>,
    },
    /// Curvilinear grid keeping the paired 2-D meshes.
    Curvilinear {
        latitude: Array2<f64>,
        longitude: Array2<f64>,
    },
}

impl GridLayout {
    /// Classify a mesh. Pure function of the input, so repeated detection
    /// on the same grid always yields the same layout.
    pub fn detect(grid: &SpatialGrid) -> Self {
        if is_separable(grid) {
            Self::Separable {
                latitude: grid.latitudes.column(0).to_vec(),
                longitude: grid.longitudes.row(0).to_vec(),
            }
        } else {
            Self::Curvilinear {
                latitude: grid.latitudes.clone(),
                longitude: grid.longitudes.clone(),
            }
        }
    }

    pub fn is_separable(&self) -> bool {
        matches!(self, Self::Separable { .. })
    }

    /// `(ny, nx)`
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Separable {
                latitude,
                longitude,
            } => (latitude.len(), longitude.len()),
            Self::Curvilinear { latitude, .. } => latitude.dim(),
        }
    }

    /// Names of the two spatial dimensions, `[y, x]`.
    pub fn dim_names(&self) -> [&'static str; 2] {
        match self {
            Self::Separable { .. } => ["latitude", "longitude"],
            Self::Curvilinear { .. } => ["y", "x"],
        }
    }

    /// Latitude and longitude coordinates in this layout.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        match self {
            Self::Separable {
                latitude,
                longitude,
            } => vec![
                Coordinate::float_axis("latitude", latitude.clone(), "degrees_north", "latitude"),
                Coordinate::float_axis("longitude", longitude.clone(), "degrees_east", "longitude"),
            ],
            Self::Curvilinear {
                latitude,
                longitude,
            } => vec![
                Coordinate {
                    name: "latitude".to_string(),
                    dims: vec!["y".to_string(), "x".to_string()],
                    values: CoordinateValues::Float(latitude.clone().into_dyn()),
                    units: "degrees_north".to_string(),
                    long_name: "latitude".to_string(),
                },
                Coordinate {
                    name: "longitude".to_string(),
                    dims: vec!["y".to_string(), "x".to_string()],
                    values: CoordinateValues::Float(longitude.clone().into_dyn()),
                    units: "degrees_east".to_string(),
                    long_name: "longitude".to_string(),
                },
            ],
        }
    }
}

fn is_separable(grid: &SpatialGrid) -> bool {
    let (ny, nx) = grid.shape();
    if ny == 0 || nx == 0 || grid.longitudes.dim() != (ny, nx) {
        return false;
    }

    let rows_constant = grid
        .latitudes
        .axis_iter(Axis(0))
        .all(|row| row.iter().all(|v| (v - row[0]).abs() <= COORD_TOLERANCE));
    let columns_constant = grid
        .longitudes
        .axis_iter(Axis(1))
        .all(|col| col.iter().all(|v| (v - col[0]).abs() <= COORD_TOLERANCE));

    rows_constant && columns_constant
}
