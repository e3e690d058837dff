//! Dataset serialization to Zarr V3 directory stores.

mod zarr_writer;

pub use zarr_writer::{WriteSummary, ZarrDatasetWriter};
