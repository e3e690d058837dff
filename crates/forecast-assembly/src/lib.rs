//! Forecast cycle assembly.
//!
//! Turns directories of per-field GRIB2 files into one labelled dataset per
//! forecast cycle:
//!
//! ```text
//! files ──► group_cycles ──► CycleGroup ──► infer_plan ──► GridAssembler ──► VariableBlock
//!                                 (per variable)      (Record Reader)          │
//!                                                                              ▼
//!                                       <cycle>.zarr ◄── ZarrDatasetWriter ◄── DatasetBuilder
//! ```
//!
//! # Example
//!
//! ```ignore
//! use forecast_assembly::{AssemblyConfig, CycleConverter, CycleFilter, Product};
//!
//! let converter = CycleConverter::new(AssemblyConfig::new(Product::Gdps))?;
//! let report = converter.run_batch(input, output, &CycleFilter::default(), 1)?;
//! ```

pub mod assembler;
pub mod config;
pub mod converter;
pub mod error;
pub mod grouper;
pub mod inference;
pub mod naming;
pub mod reader;
pub mod variables;

// Re-exports
pub use assembler::{cycle_coordinates, GridAssembler};
pub use config::AssemblyConfig;
pub use converter::{
    BatchReport, CycleAssembly, CycleConverter, CycleFailure, CycleOutput, OmittedVariable,
};
pub use error::{AssemblyError, Result};
pub use grouper::{group_cycles, group_paths, list_source_files, CycleFilter, CycleGroup, SourceFile};
pub use inference::{
    infer_plan, LevelStepPlan, DEFAULT_STEP_INTERVAL_HOURS, MAX_STEP_INTERVAL_HOURS,
};
pub use naming::{output_file_name, parse_filename, SourceFileName};
pub use reader::{
    decompress_gzip, read_file_bytes, FieldSelector, Grib2RecordReader, RecordReader, SourceRecord,
};
pub use variables::{LevelAxis, Product, StepPolicy, VariableKind, AIR_PRESSURE, GROUND_LEVEL};
