//! Reading dataset stores back into an [`OutputDataset`].

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::{ArrayD, IxDyn};
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;

use crate::error::{DatasetError, Result};
use crate::types::{Coordinate, CoordinateValues, DataVariable, OutputDataset};

type Attributes = serde_json::Map<String, serde_json::Value>;

/// Open a store written by [`crate::ZarrDatasetWriter`].
pub fn read_dataset(path: &Path) -> Result<OutputDataset> {
    let store = Arc::new(FilesystemStore::new(path).map_err(DatasetError::read_failed)?);

    let group = Group::open(store.clone(), "/").map_err(DatasetError::read_failed)?;
    let attrs = group.attributes();

    let product = string_attr(attrs, "product")?;
    let reference_time: DateTime<Utc> = string_attr(attrs, "reference_time")?
        .parse()
        .map_err(|e| DatasetError::invalid_metadata(format!("reference_time: {}", e)))?;

    let mut coordinates = Vec::new();
    for name in string_list_attr(attrs, "coordinates")? {
        coordinates.push(read_coordinate(&store, &name)?);
    }

    let mut variables = Vec::new();
    for name in string_list_attr(attrs, "variables")? {
        variables.push(read_variable(&store, &name)?);
    }

    Ok(OutputDataset {
        product,
        reference_time,
        variables,
        coordinates,
    })
}

fn open_array(store: &Arc<FilesystemStore>, name: &str) -> Result<Array<FilesystemStore>> {
    Array::open(store.clone(), &format!("/{}", name))
        .map_err(|e| DatasetError::read_failed(format!("array '{}': {}", name, e)))
}

fn read_variable(store: &Arc<FilesystemStore>, name: &str) -> Result<DataVariable> {
    let array = open_array(store, name)?;
    let attrs = array.attributes();
    let shape = usize_shape(array.shape());

    if array.data_type() != &DataType::Float32 {
        return Err(DatasetError::invalid_metadata(format!(
            "variable '{}' is not float32",
            name
        )));
    }
    let values: Vec<f32> = retrieve(&array)?;

    Ok(DataVariable {
        name: name.to_string(),
        long_name: string_attr(attrs, "long_name")?,
        units: string_attr(attrs, "units")?,
        dims: string_list_attr(attrs, "_ARRAY_DIMENSIONS")?,
        data: to_array(name, &shape, values)?,
    })
}

fn read_coordinate(store: &Arc<FilesystemStore>, name: &str) -> Result<Coordinate> {
    let array = open_array(store, name)?;
    let attrs = array.attributes();
    let shape = usize_shape(array.shape());

    let values = match array.data_type() {
        DataType::Float64 => CoordinateValues::Float(to_array(name, &shape, retrieve(&array)?)?),
        DataType::Int64 => CoordinateValues::Int(to_array(name, &shape, retrieve(&array)?)?),
        other => {
            return Err(DatasetError::invalid_metadata(format!(
                "coordinate '{}' has unsupported data type {:?}",
                name, other
            )))
        }
    };

    Ok(Coordinate {
        name: name.to_string(),
        dims: string_list_attr(attrs, "_ARRAY_DIMENSIONS")?,
        values,
        units: string_attr(attrs, "units")?,
        long_name: string_attr(attrs, "long_name")?,
    })
}

fn retrieve<T: zarrs::array::ElementOwned>(array: &Array<FilesystemStore>) -> Result<Vec<T>> {
    if array.shape().iter().any(|&d| d == 0) {
        return Ok(Vec::new());
    }
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .retrieve_array_subset_elements(&subset)
        .map_err(DatasetError::read_failed)
}

fn usize_shape(shape: &[u64]) -> Vec<usize> {
    shape.iter().map(|&d| d as usize).collect()
}

fn to_array<T>(name: &str, shape: &[usize], values: Vec<T>) -> Result<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| DatasetError::dimension_mismatch(name, e.to_string()))
}

fn string_attr(attrs: &Attributes, key: &str) -> Result<String> {
    attrs
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| DatasetError::invalid_metadata(format!("missing '{}' attribute", key)))
}

fn string_list_attr(attrs: &Attributes, key: &str) -> Result<Vec<String>> {
    let value = attrs
        .get(key)
        .cloned()
        .ok_or_else(|| DatasetError::invalid_metadata(format!("missing '{}' attribute", key)))?;
    Ok(serde_json::from_value(value)?)
}
