//! Per-cycle conversion and the batch driver.
//!
//! Within a cycle, variables are assembled one after another and merged
//! into a single dataset. A variable that is missing or fails is omitted
//! with a warning unless it is required, in which case the cycle fails and
//! writes nothing. Cycles are independent; a failed cycle is recorded in the
//! [`BatchReport`] and the batch moves on.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use forecast_dataset::{DatasetBuilder, DatasetError, OutputDataset, VariableBlock, ZarrDatasetWriter};
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::assembler::GridAssembler;
use crate::config::AssemblyConfig;
use crate::error::{AssemblyError, Result};
use crate::grouper::{group_cycles, CycleFilter, CycleGroup};
use crate::inference::infer_plan;
use crate::naming::output_file_name;
use crate::reader::{Grib2RecordReader, RecordReader};
use crate::variables::VariableKind;

/// A variable left out of a cycle dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct OmittedVariable {
    pub variable: VariableKind,
    pub reason: String,
}

/// Dataset of one cycle plus the variables that could not be assembled.
#[derive(Debug)]
pub struct CycleAssembly {
    pub dataset: OutputDataset,
    pub omitted: Vec<OmittedVariable>,
}

/// A cycle written to disk.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub reference_time: DateTime<Utc>,
    pub path: PathBuf,
    pub variables: Vec<String>,
    pub omitted: Vec<OmittedVariable>,
}

/// A cycle that produced no output.
#[derive(Debug, Clone)]
pub struct CycleFailure {
    pub reference_time: DateTime<Utc>,
    pub error: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub written: Vec<CycleOutput>,
    pub failed: Vec<CycleFailure>,
    /// Cycles excluded by the filter.
    pub skipped: usize,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Whether `axis` belongs to `kind` alone (its lead or level axis).
fn is_variable_axis(kind: VariableKind, axis: &str) -> bool {
    axis == kind.lead_axis() || kind.level_axis().is_some_and(|level| level.name == axis)
}

/// Record a failed variable, or fail the cycle when it is required.
fn omit_variable(
    cycle: DateTime<Utc>,
    kind: VariableKind,
    required: bool,
    error: AssemblyError,
    omitted: &mut Vec<OmittedVariable>,
) -> Result<()> {
    if required {
        return Err(AssemblyError::RequiredVariableFailed {
            variable: kind.key().to_string(),
            source: Box::new(error),
        });
    }
    warn!(cycle = %cycle, variable = %kind, error = %error, "Omitting variable");
    omitted.push(OmittedVariable {
        variable: kind,
        reason: error.to_string(),
    });
    Ok(())
}

/// Converts forecast cycles into datasets.
pub struct CycleConverter<R: RecordReader = Grib2RecordReader> {
    config: AssemblyConfig,
    reader: R,
    writer: ZarrDatasetWriter,
}

impl CycleConverter<Grib2RecordReader> {
    /// Converter reading GRIB2 files with the standard tables.
    pub fn new(config: AssemblyConfig) -> Result<Self> {
        Self::with_reader(config, Grib2RecordReader::default())
    }
}

impl<R: RecordReader> CycleConverter<R> {
    pub fn with_reader(config: AssemblyConfig, reader: R) -> Result<Self> {
        config.validate()?;
        let writer = ZarrDatasetWriter::new(config.store.clone());
        Ok(Self {
            config,
            reader,
            writer,
        })
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Infer and stack one variable of a cycle.
    pub fn assemble_variable(&self, group: &CycleGroup, kind: VariableKind) -> Result<VariableBlock> {
        let files = group.files_for(kind);
        if files.is_empty() {
            return Err(AssemblyError::NoSourceFiles(kind.key().to_string()));
        }
        let plan = infer_plan(kind, &files, self.config.step_interval_hours)?;
        GridAssembler::new(&self.reader).assemble(kind, &plan, group.reference_time)
    }

    /// Assemble every enabled variable of a cycle into one dataset.
    pub fn assemble_cycle(&self, group: &CycleGroup) -> Result<CycleAssembly> {
        let cycle = group.reference_time;
        let mut builder = DatasetBuilder::new(self.config.product.label(), cycle);
        let mut omitted = Vec::new();

        for kind in self.config.enabled_variables() {
            let required = self.config.is_required(kind);

            if group.files_for(kind).is_empty() {
                if required {
                    return Err(AssemblyError::NoSourceFiles(kind.key().to_string()));
                }
                warn!(cycle = %cycle, variable = %kind, "No source files, omitting variable");
                omitted.push(OmittedVariable {
                    variable: kind,
                    reason: "no source files".to_string(),
                });
                continue;
            }

            let block = match self.assemble_variable(group, kind) {
                Ok(block) => block,
                Err(e) => {
                    omit_variable(cycle, kind, required, e, &mut omitted)?;
                    continue;
                }
            };

            // Lead and level axes are per variable, so a conflict there only
            // disqualifies this variable. Grid and time conflicts fail the cycle.
            match builder.add_block(block) {
                Ok(()) => {}
                Err(DatasetError::CoordinateConflict { axis, detail })
                    if is_variable_axis(kind, &axis) =>
                {
                    let e = AssemblyError::Dataset(DatasetError::CoordinateConflict { axis, detail });
                    omit_variable(cycle, kind, required, e, &mut omitted)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if builder.is_empty() {
            return Err(AssemblyError::Dataset(DatasetError::Empty));
        }

        Ok(CycleAssembly {
            dataset: builder.build()?,
            omitted,
        })
    }

    /// Assemble a cycle and write it under `output_dir`.
    pub fn convert_cycle(&self, group: &CycleGroup, output_dir: &Path) -> Result<CycleOutput> {
        let assembly = self.assemble_cycle(group)?;
        let path = output_dir.join(output_file_name(self.config.product, group.reference_time));
        self.writer.write(&assembly.dataset, &path)?;

        Ok(CycleOutput {
            reference_time: group.reference_time,
            path,
            variables: assembly
                .dataset
                .variable_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            omitted: assembly.omitted,
        })
    }

    /// Convert every cycle found in `input_dir`.
    ///
    /// With `jobs > 1` cycles are converted on a thread pool of that size,
    /// one cycle per task. Only listing `input_dir` or creating `output_dir`
    /// fails the whole batch; cycle failures go into the report.
    pub fn run_batch(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        filter: &CycleFilter,
        jobs: usize,
    ) -> Result<BatchReport> {
        let groups = group_cycles(self.config.product, input_dir)?;
        std::fs::create_dir_all(output_dir).map_err(|e| AssemblyError::io(output_dir, e))?;

        let total = groups.len();
        let selected: Vec<CycleGroup> = groups
            .into_values()
            .filter(|g| filter.matches(&g.reference_time))
            .collect();

        info!(
            product = %self.config.product,
            input = %input_dir.display(),
            cycles = selected.len(),
            skipped = total - selected.len(),
            jobs,
            "Starting batch"
        );

        let convert = |group: &CycleGroup| -> std::result::Result<CycleOutput, CycleFailure> {
            info!(cycle = %group.reference_time, files = group.files.len(), "Converting cycle");
            self.convert_cycle(group, output_dir).map_err(|e| {
                error!(cycle = %group.reference_time, error = %e, "Cycle failed");
                CycleFailure {
                    reference_time: group.reference_time,
                    error: e.to_string(),
                }
            })
        };

        let results: Vec<_> = if jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .map_err(|e| AssemblyError::InvalidConfig(format!("thread pool: {}", e)))?;
            pool.install(|| selected.par_iter().map(convert).collect())
        } else {
            selected.iter().map(convert).collect()
        };

        let mut report = BatchReport {
            skipped: total - selected.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(output) => report.written.push(output),
                Err(failure) => report.failed.push(failure),
            }
        }

        info!(
            written = report.written.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            "Batch complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::Product;
    use test_utils::{CycleFixture, GDPS_TCDC};

    #[test]
    fn test_missing_required_variable_fails_cycle() {
        let dir = tempfile::tempdir().unwrap();
        CycleFixture::new(dir.path()).write_gdps_series(&GDPS_TCDC, "0", "2024010100", [0, 3]);

        let mut config = AssemblyConfig::new(Product::Gdps);
        config.required = vec![VariableKind::Ghi];
        let converter = CycleConverter::new(config).unwrap();

        let groups = group_cycles(Product::Gdps, dir.path()).unwrap();
        let group = groups.values().next().unwrap();
        match converter.assemble_cycle(group) {
            Err(AssemblyError::NoSourceFiles(name)) => assert_eq!(name, "ghi"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AssemblyConfig::new(Product::Gfs);
        config.variables = vec![VariableKind::Temperature];
        assert!(matches!(
            CycleConverter::new(config),
            Err(AssemblyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        CycleFixture::new(dir.path()).write_gdps_series(&GDPS_TCDC, "0", "2024010100", [0, 3]);

        let mut config = AssemblyConfig::new(Product::Gdps);
        config.variables = vec![VariableKind::Ghi];
        let converter = CycleConverter::new(config).unwrap();

        let groups = group_cycles(Product::Gdps, dir.path()).unwrap();
        let err = converter
            .assemble_cycle(groups.values().next().unwrap())
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Dataset(DatasetError::Empty)));
    }
}
