//! Zarr V3 writer for cycle datasets.
//!
//! Layout of one store:
//! - root group attributes: `product`, `reference_time`, `variables`, `coordinates`
//! - one array per variable and per coordinate at `/<name>`, each with
//!   `_ARRAY_DIMENSIONS`, `units` and `long_name` attributes
//!
//! Variables are `float32` with one 2-D frame per chunk; coordinates are a
//! single chunk of `float64` or `int64`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::config::{StoreConfig, ZarrCompression};
use crate::error::{DatasetError, Result};
use crate::types::{Coordinate, CoordinateValues, DataVariable, OutputDataset};

/// Result of writing a dataset store.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub arrays: usize,
    /// Uncompressed payload size.
    pub bytes: u64,
}

/// Writer for Zarr V3 dataset stores on the local filesystem.
pub struct ZarrDatasetWriter {
    config: StoreConfig,
}

impl ZarrDatasetWriter {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Write `dataset` to `path`, replacing any existing store.
    ///
    /// The store is first written to a hidden `.<name>.partial` sibling and
    /// renamed into place once complete. On failure the partial directory is
    /// removed and nothing is left at `path` from this attempt.
    pub fn write(&self, dataset: &OutputDataset, path: &Path) -> Result<WriteSummary> {
        let partial = partial_path(path)?;

        if partial.exists() {
            warn!(path = %partial.display(), "Removing stale partial output");
            std::fs::remove_dir_all(&partial)
                .map_err(|e| DatasetError::serialization(&partial, e))?;
        }

        let result = self
            .write_store(dataset, &partial)
            .and_then(|summary| {
                replace_dir(&partial, path)?;
                Ok(WriteSummary {
                    path: path.to_path_buf(),
                    ..summary
                })
            });

        if result.is_err() && partial.exists() {
            if let Err(e) = std::fs::remove_dir_all(&partial) {
                warn!(path = %partial.display(), error = %e, "Failed to remove partial output");
            }
        }

        if let Ok(summary) = &result {
            info!(
                path = %summary.path.display(),
                arrays = summary.arrays,
                bytes = summary.bytes,
                "Wrote dataset"
            );
        }

        result
    }

    fn write_store(&self, dataset: &OutputDataset, dir: &Path) -> Result<WriteSummary> {
        std::fs::create_dir_all(dir).map_err(|e| DatasetError::serialization(dir, e))?;
        let store = Arc::new(
            FilesystemStore::new(dir).map_err(|e| DatasetError::serialization(dir, e))?,
        );

        let mut attrs = serde_json::Map::new();
        attrs.insert("product".to_string(), serde_json::json!(dataset.product));
        attrs.insert(
            "reference_time".to_string(),
            serde_json::json!(dataset.reference_time.to_rfc3339()),
        );
        attrs.insert(
            "variables".to_string(),
            serde_json::json!(dataset.variable_names()),
        );
        attrs.insert(
            "coordinates".to_string(),
            serde_json::json!(dataset
                .coordinates
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()),
        );

        let group = GroupBuilder::new()
            .attributes(attrs)
            .build(store.clone(), "/")
            .map_err(|e| DatasetError::serialization(dir, e))?;
        group
            .store_metadata()
            .map_err(|e| DatasetError::serialization(dir, e))?;

        let mut bytes = 0u64;
        for coord in &dataset.coordinates {
            bytes += self.write_coordinate(&store, dir, coord)?;
        }
        for variable in &dataset.variables {
            bytes += self.write_variable(&store, dir, variable)?;
        }

        Ok(WriteSummary {
            path: dir.to_path_buf(),
            arrays: dataset.coordinates.len() + dataset.variables.len(),
            bytes,
        })
    }

    fn write_variable(
        &self,
        store: &Arc<FilesystemStore>,
        dir: &Path,
        variable: &DataVariable,
    ) -> Result<u64> {
        let shape: Vec<u64> = variable.data.shape().iter().map(|&d| d as u64).collect();
        // One 2-D frame per chunk
        let ndim = shape.len();
        let chunk_shape: Vec<u64> = shape
            .iter()
            .enumerate()
            .map(|(i, &d)| if i + 2 >= ndim { d.max(1) } else { 1 })
            .collect();

        let array = self.build_array(
            store,
            dir,
            &variable.name,
            shape,
            chunk_shape,
            DataType::Float32,
            FillValue::from(f32::NAN),
            array_attributes(&variable.dims, &variable.units, &variable.long_name),
            4,
        )?;

        let values: Vec<f32> = variable.data.iter().copied().collect();
        store_elements(&array, dir, &values)?;

        debug!(variable = %variable.name, shape = ?variable.data.shape(), "Stored variable");
        Ok((values.len() * std::mem::size_of::<f32>()) as u64)
    }

    fn write_coordinate(
        &self,
        store: &Arc<FilesystemStore>,
        dir: &Path,
        coord: &Coordinate,
    ) -> Result<u64> {
        let shape: Vec<u64> = coord.shape().iter().map(|&d| d as u64).collect();
        let chunk_shape: Vec<u64> = shape.iter().map(|&d| d.max(1)).collect();
        let attrs = array_attributes(&coord.dims, &coord.units, &coord.long_name);

        match &coord.values {
            CoordinateValues::Float(values) => {
                let array = self.build_array(
                    store,
                    dir,
                    &coord.name,
                    shape,
                    chunk_shape,
                    DataType::Float64,
                    FillValue::from(f64::NAN),
                    attrs,
                    8,
                )?;
                let values: Vec<f64> = values.iter().copied().collect();
                store_elements(&array, dir, &values)?;
                Ok((values.len() * 8) as u64)
            }
            CoordinateValues::Int(values) => {
                let array = self.build_array(
                    store,
                    dir,
                    &coord.name,
                    shape,
                    chunk_shape,
                    DataType::Int64,
                    FillValue::from(0i64),
                    attrs,
                    8,
                )?;
                let values: Vec<i64> = values.iter().copied().collect();
                store_elements(&array, dir, &values)?;
                Ok((values.len() * 8) as u64)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_array(
        &self,
        store: &Arc<FilesystemStore>,
        dir: &Path,
        name: &str,
        shape: Vec<u64>,
        chunk_shape: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        attrs: serde_json::Map<String, serde_json::Value>,
        typesize: usize,
    ) -> Result<Array<FilesystemStore>> {
        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .try_into()
            .map_err(|e| DatasetError::ConfigError(format!("{:?}", e)))?;

        let mut builder = ArrayBuilder::new(shape, data_type, chunk_grid, fill_value);
        builder.attributes(attrs);

        if self.config.compression != ZarrCompression::None {
            builder.bytes_to_bytes_codecs(vec![self.create_compression_codec(typesize)?]);
        }

        let array = builder
            .build(store.clone(), &format!("/{}", name))
            .map_err(|e| DatasetError::serialization(dir, e))?;
        array
            .store_metadata()
            .map_err(|e| DatasetError::serialization(dir, e))?;
        Ok(array)
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
        typesize: usize,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| DatasetError::ConfigError("Invalid compression level".to_string()))?;

        let shuffle = if self.config.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = self.config.shuffle.then_some(typesize);

        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(DatasetError::ConfigError(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| DatasetError::ConfigError(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

fn array_attributes(
    dims: &[String],
    units: &str,
    long_name: &str,
) -> serde_json::Map<String, serde_json::Value> {
    let mut attrs = serde_json::Map::new();
    attrs.insert("_ARRAY_DIMENSIONS".to_string(), serde_json::json!(dims));
    attrs.insert("units".to_string(), serde_json::json!(units));
    attrs.insert("long_name".to_string(), serde_json::json!(long_name));
    attrs
}

fn store_elements<T: zarrs::array::Element>(
    array: &Array<FilesystemStore>,
    dir: &Path,
    values: &[T],
) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .store_array_subset_elements(&subset, values)
        .map_err(|e| DatasetError::serialization(dir, e))
}

/// `<parent>/.<name>.partial`
fn partial_path(path: &Path) -> Result<PathBuf> {
    sibling_path(path, "partial")
}

/// `<parent>/.<name>.<suffix>`
fn sibling_path(path: &Path, suffix: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| DatasetError::serialization(path, "output path has no file name"))?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(".{}.{}", name.to_string_lossy(), suffix)))
}

/// Move `from` to `to`. An existing `to` is set aside first and only deleted
/// once the new store is in place; it is restored if the move fails.
fn replace_dir(from: &Path, to: &Path) -> Result<()> {
    if !to.exists() {
        return std::fs::rename(from, to).map_err(|e| DatasetError::serialization(to, e));
    }

    let previous = sibling_path(to, "previous")?;
    if previous.exists() {
        warn!(path = %previous.display(), "Removing stale previous output");
        remove_path(&previous)?;
    }

    debug!(path = %to.display(), "Replacing existing output");
    std::fs::rename(to, &previous).map_err(|e| DatasetError::serialization(to, e))?;

    if let Err(e) = std::fs::rename(from, to) {
        if let Err(restore) = std::fs::rename(&previous, to) {
            warn!(
                path = %to.display(),
                backup = %previous.display(),
                error = %restore,
                "Failed to restore previous output"
            );
        }
        return Err(DatasetError::serialization(to, e));
    }

    if let Err(e) = remove_path(&previous) {
        warn!(path = %previous.display(), error = %e, "Failed to remove previous output");
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.map_err(|e| DatasetError::serialization(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path() {
        let partial = partial_path(Path::new("/data/out/CMC_20240101_00.zarr")).unwrap();
        assert_eq!(partial, PathBuf::from("/data/out/.CMC_20240101_00.zarr.partial"));
        assert!(partial_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_replace_dir_swaps_stores() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.zarr");
        let partial = partial_path(&target).unwrap();
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("zarr.json"), b"old").unwrap();
        std::fs::create_dir(&partial).unwrap();
        std::fs::write(partial.join("zarr.json"), b"new").unwrap();

        replace_dir(&partial, &target).unwrap();

        assert_eq!(std::fs::read(target.join("zarr.json")).unwrap(), b"new");
        assert!(!partial.exists());
        assert!(!sibling_path(&target, "previous").unwrap().exists());
    }

    #[test]
    fn test_failed_replace_keeps_previous_store() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.zarr");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("zarr.json"), b"old").unwrap();

        // nothing to move into place
        let missing = partial_path(&target).unwrap();
        assert!(replace_dir(&missing, &target).is_err());

        assert_eq!(std::fs::read(target.join("zarr.json")).unwrap(), b"old");
        assert!(!sibling_path(&target, "previous").unwrap().exists());
    }
}
