//! Grid Assembler: stack the 2-D fields of one variable into a labelled
//! block with canonical axis order
//! `[cycle_date, cycle_time, lead_time, level?, y, x]`.

use chrono::{DateTime, Utc};
use forecast_dataset::{Coordinate, GridLayout, VariableBlock};
use ndarray::{ArrayD, IxDyn};
use tracing::{debug, warn};

use crate::error::{AssemblyError, Result};
use crate::inference::LevelStepPlan;
use crate::reader::RecordReader;
use crate::variables::{Product, VariableKind};

/// Stacks the records of a [`LevelStepPlan`] through a [`RecordReader`].
pub struct GridAssembler<'a, R: RecordReader + ?Sized> {
    reader: &'a R,
}

impl<'a, R: RecordReader + ?Sized> GridAssembler<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    /// Read every file of `plan` in order and build the variable's block.
    ///
    /// The first record fixes the grid shape and spatial layout; a later
    /// record with another shape is a [`AssemblyError::GridShapeMismatch`].
    /// A failed read aborts the whole variable.
    pub fn assemble(
        &self,
        kind: VariableKind,
        plan: &LevelStepPlan,
        reference_time: DateTime<Utc>,
    ) -> Result<VariableBlock> {
        let variable = kind.key();
        let expected_frames = plan.n_steps() * plan.n_levels();
        if plan.files.len() != expected_frames {
            return Err(AssemblyError::inconsistent(
                variable,
                format!(
                    "{} files for {} steps x {} levels",
                    plan.files.len(),
                    plan.n_steps(),
                    plan.n_levels()
                ),
            ));
        }

        let selector = kind.selector();
        let mut layout: Option<(GridLayout, (usize, usize))> = None;
        let mut values: Vec<f32> = Vec::new();

        for path in &plan.files {
            let record = self.reader.read(path, &selector).map_err(|e| {
                warn!(
                    variable = %variable,
                    path = %path.display(),
                    error = %e,
                    "Failed to read record"
                );
                e
            })?;

            if record.reference_time != reference_time {
                return Err(AssemblyError::ReferenceTimeMismatch {
                    path: path.clone(),
                    expected: reference_time.to_rfc3339(),
                    actual: record.reference_time.to_rfc3339(),
                });
            }

            match &layout {
                Some((_, shape)) if *shape != record.shape() => {
                    return Err(AssemblyError::GridShapeMismatch {
                        variable: variable.to_string(),
                        path: path.clone(),
                        expected: *shape,
                        actual: record.shape(),
                    });
                }
                Some(_) => {}
                None => {
                    let grid = GridLayout::detect(&record.spatial_grid()?);
                    let (ny, nx) = record.shape();
                    values.reserve_exact(expected_frames * ny * nx);
                    debug!(
                        variable = %variable,
                        separable = grid.is_separable(),
                        ny,
                        nx,
                        "Detected grid layout"
                    );
                    layout = Some((grid, record.shape()));
                }
            }

            values.extend_from_slice(&record.data);
        }

        let Some((grid, (ny, nx))) = layout else {
            return Err(AssemblyError::inconsistent(variable, "no files to stack"));
        };

        let product = kind.product();
        let mut shape = vec![1, 1, plan.n_steps()];
        let mut dims = vec![
            product.date_axis().to_string(),
            product.time_axis().to_string(),
            kind.lead_axis().to_string(),
        ];
        let mut coords = cycle_coordinates(product, reference_time);
        coords.push(Coordinate::lead_hours(kind.lead_axis(), plan.lead_hours.clone()));

        if let Some(axis) = kind.level_axis() {
            shape.push(plan.n_levels());
            dims.push(axis.name.to_string());
            coords.push(Coordinate::float_axis(
                axis.name,
                plan.levels.clone(),
                axis.units,
                axis.long_name,
            ));
        }

        shape.extend([ny, nx]);
        dims.extend(grid.dim_names().iter().map(|d| d.to_string()));

        let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            AssemblyError::inconsistent(variable, format!("cannot reshape to {:?}: {}", shape, e))
        })?;

        debug!(variable = %variable, shape = ?shape, "Assembled variable");

        Ok(VariableBlock::new(
            kind.output_name(),
            kind.long_name(),
            kind.units(),
            dims,
            data,
            coords,
            grid,
        )?)
    }
}

/// Cycle date and time-of-day coordinates of a product.
pub fn cycle_coordinates(product: Product, reference_time: DateTime<Utc>) -> Vec<Coordinate> {
    vec![
        Coordinate::cycle_date(product.date_axis(), reference_time),
        Coordinate::cycle_time(product.time_axis(), reference_time),
    ]
}
