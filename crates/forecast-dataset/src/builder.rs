//! Merging variable blocks into one cycle dataset.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{DatasetError, Result};
use crate::layout::GridLayout;
use crate::types::{Coordinate, DataVariable, OutputDataset, VariableBlock};

/// Accumulates the variable blocks of one cycle.
///
/// The first block fixes the spatial grid; every later block must carry the
/// same grid, and any coordinate name seen twice must have identical values.
/// A rejected block leaves the builder unchanged.
#[derive(Debug)]
pub struct DatasetBuilder {
    product: String,
    reference_time: DateTime<Utc>,
    grid: Option<GridLayout>,
    coordinates: Vec<Coordinate>,
    variables: Vec<DataVariable>,
}

impl DatasetBuilder {
    pub fn new(product: impl Into<String>, reference_time: DateTime<Utc>) -> Self {
        Self {
            product: product.into(),
            reference_time,
            grid: None,
            coordinates: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Merge one block.
    pub fn add_block(&mut self, block: VariableBlock) -> Result<()> {
        if self.variables.iter().any(|v| v.name == block.name) {
            return Err(DatasetError::DuplicateVariable(block.name));
        }

        if let Some(grid) = &self.grid {
            check_grid(grid, &block)?;
        }

        let mut new_coords = Vec::new();
        for coord in block.coords.iter().chain(block.grid.coordinates().iter()) {
            match self.coordinates.iter().find(|c| c.name == coord.name) {
                Some(existing) => check_coordinate(existing, coord, &block.name)?,
                None => {
                    if !new_coords.iter().any(|c: &Coordinate| c.name == coord.name) {
                        new_coords.push(coord.clone());
                    }
                }
            }
        }

        debug!(
            variable = %block.name,
            dims = ?block.dims,
            new_coordinates = new_coords.len(),
            "Merged variable block"
        );

        if self.grid.is_none() {
            self.grid = Some(block.grid.clone());
        }
        self.coordinates.extend(new_coords);
        self.variables.push(DataVariable {
            name: block.name,
            long_name: block.long_name,
            units: block.units,
            dims: block.dims,
            data: block.data,
        });

        Ok(())
    }

    /// Finish the dataset. Fails when no block was merged.
    pub fn build(self) -> Result<OutputDataset> {
        if self.variables.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(OutputDataset {
            product: self.product,
            reference_time: self.reference_time,
            variables: self.variables,
            coordinates: self.coordinates,
        })
    }
}

/// Merge a whole set of blocks at once.
pub fn merge_blocks(
    product: impl Into<String>,
    reference_time: DateTime<Utc>,
    blocks: impl IntoIterator<Item = VariableBlock>,
) -> Result<OutputDataset> {
    let mut builder = DatasetBuilder::new(product, reference_time);
    for block in blocks {
        builder.add_block(block)?;
    }
    builder.build()
}

fn check_grid(grid: &GridLayout, block: &VariableBlock) -> Result<()> {
    if grid == &block.grid {
        return Ok(());
    }

    let (ny, nx) = grid.shape();
    let (by, bx) = block.grid.shape();
    let detail = if (ny, nx) != (by, bx) {
        format!(
            "variable '{}' has a {}x{} grid, dataset grid is {}x{}",
            block.name, by, bx, ny, nx
        )
    } else if grid.is_separable() != block.grid.is_separable() {
        format!(
            "variable '{}' grid regularity differs from the dataset grid",
            block.name
        )
    } else {
        format!(
            "variable '{}' grid coordinates differ from the dataset grid",
            block.name
        )
    };
    Err(DatasetError::coordinate_conflict("latitude/longitude", detail))
}

fn check_coordinate(existing: &Coordinate, incoming: &Coordinate, variable: &str) -> Result<()> {
    if existing.dims != incoming.dims || existing.values != incoming.values {
        return Err(DatasetError::coordinate_conflict(
            &existing.name,
            format!(
                "variable '{}' has {} values {:?}, dataset has {:?}",
                variable,
                incoming.values.len(),
                preview(&incoming.values.to_f64_vec()),
                preview(&existing.values.to_f64_vec()),
            ),
        ));
    }
    Ok(())
}

fn preview(values: &[f64]) -> Vec<f64> {
    values.iter().take(8).copied().collect()
}
