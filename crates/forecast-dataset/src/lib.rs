//! Coordinate-labelled forecast cycle datasets.
//!
//! A cycle dataset holds every assembled variable of one forecast run under
//! one shared coordinate set: cycle date and time, per-variable lead time
//! axes, optional level axes and the spatial grid.
//!
//! ```text
//! VariableBlock ─┐
//! VariableBlock ─┼─► DatasetBuilder ──► OutputDataset ──► ZarrDatasetWriter ──► <cycle>.zarr
//! VariableBlock ─┘   (grid + shared                            │
//!                     axis checks)                             └─► read_dataset (round trip)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use forecast_dataset::{merge_blocks, StoreConfig, ZarrDatasetWriter};
//!
//! let dataset = merge_blocks("GDPS", reference_time, blocks)?;
//! ZarrDatasetWriter::new(StoreConfig::from_env()).write(&dataset, &out_path)?;
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod layout;
pub mod reader;
pub mod types;
pub mod writer;

// Re-export commonly used types at crate root
pub use builder::{merge_blocks, DatasetBuilder};
pub use config::{StoreConfig, ZarrCompression};
pub use error::{DatasetError, Result};
pub use layout::GridLayout;
pub use reader::read_dataset;
pub use types::{
    reference_time_from, Coordinate, CoordinateValues, DataVariable, OutputDataset, SpatialGrid,
    VariableBlock, DATE_UNITS, LEAD_UNITS, TIME_UNITS,
};
pub use writer::{WriteSummary, ZarrDatasetWriter};
