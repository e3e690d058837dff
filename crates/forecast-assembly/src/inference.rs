//! Level/Step Inferencer: derive the level set and lead-time axis of one
//! variable from its files.
//!
//! The plan is computed from the variable's own files only; no level set is
//! shared between variables.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{AssemblyError, Result};
use crate::grouper::SourceFile;
use crate::variables::{StepPolicy, VariableKind};

/// Default spacing of lead times in hours.
pub const DEFAULT_STEP_INTERVAL_HOURS: u32 = 3;

/// Largest accepted spacing between lead times.
pub const MAX_STEP_INTERVAL_HOURS: u32 = 24;

/// Stacking plan for one variable of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelStepPlan {
    /// Distinct levels in ascending order, empty for level-free variables.
    pub levels: Vec<f64>,
    /// Lead time of each step in hours.
    pub lead_hours: Vec<i64>,
    /// Files in stacking order: step-major, then level.
    pub files: Vec<PathBuf>,
}

impl LevelStepPlan {
    pub fn n_steps(&self) -> usize {
        self.lead_hours.len()
    }

    /// Number of levels, 1 for level-free variables.
    pub fn n_levels(&self) -> usize {
        self.levels.len().max(1)
    }
}

/// Infer the stacking plan for `kind` from its files.
///
/// Variables undefined at the initial time drop their lead-0 file first.
/// The remaining file count must split evenly across the levels, and each
/// level's lead hours must run `offset, offset + interval, ...` with no gap
/// or duplicate; anything else is an [`AssemblyError::InconsistentRecordCount`].
pub fn infer_plan(
    kind: VariableKind,
    files: &[&SourceFile],
    interval_hours: u32,
) -> Result<LevelStepPlan> {
    let variable = kind.key();
    if interval_hours == 0 {
        return Err(AssemblyError::InvalidConfig(
            "step interval must be positive".to_string(),
        ));
    }

    let files: Vec<&SourceFile> = match kind.step_policy() {
        StepPolicy::AfterInitial => files
            .iter()
            .copied()
            .filter(|f| f.name.lead_hour != 0)
            .collect(),
        StepPolicy::FromInitial => files.to_vec(),
    };
    if files.is_empty() {
        return Err(AssemblyError::inconsistent(variable, "no usable files"));
    }

    let by_level = partition_by_level(kind, &files)?;
    let levels: Vec<f64> = if kind.level_axis().is_some() {
        by_level.keys().map(|k| k.0).collect()
    } else {
        Vec::new()
    };

    let n_levels = levels.len().max(1);
    if files.len() % n_levels != 0 {
        return Err(AssemblyError::inconsistent(
            variable,
            format!(
                "{} files do not divide evenly across {} levels",
                files.len(),
                n_levels
            ),
        ));
    }
    let n_steps = files.len() / n_levels;

    let offset = kind.step_policy().offset_hours(interval_hours);
    let expected: Vec<u32> = (0..n_steps)
        .map(|k| {
            u32::try_from(k)
                .ok()
                .and_then(|k| k.checked_mul(interval_hours))
                .and_then(|hours| hours.checked_add(offset))
        })
        .collect::<Option<_>>()
        .ok_or_else(|| {
            AssemblyError::inconsistent(
                variable,
                format!("{} steps of {} h overflow the lead hour range", n_steps, interval_hours),
            )
        })?;

    let mut columns = Vec::with_capacity(by_level.len());
    for (level, mut level_files) in by_level {
        level_files.sort_by_key(|f| f.name.lead_hour);
        let leads: Vec<u32> = level_files.iter().map(|f| f.name.lead_hour).collect();
        if leads != expected {
            let at_level = if levels.is_empty() {
                String::new()
            } else {
                format!(" at level {}", level.0)
            };
            return Err(AssemblyError::inconsistent(
                variable,
                format!("lead hours{} are {:?}, expected {:?}", at_level, leads, expected),
            ));
        }
        columns.push(level_files);
    }

    let mut ordered = Vec::with_capacity(files.len());
    for step in 0..n_steps {
        for column in &columns {
            ordered.push(column[step].path.clone());
        }
    }

    debug!(
        variable = %variable,
        levels = ?levels,
        steps = n_steps,
        "Inferred level/step plan"
    );

    Ok(LevelStepPlan {
        levels,
        lead_hours: expected.into_iter().map(i64::from).collect(),
        files: ordered,
    })
}

/// Level value ordered numerically.
#[derive(Debug, Clone, Copy)]
struct LevelKey(f64);

impl PartialEq for LevelKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for LevelKey {}

impl PartialOrd for LevelKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LevelKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

fn partition_by_level<'a>(
    kind: VariableKind,
    files: &[&'a SourceFile],
) -> Result<BTreeMap<LevelKey, Vec<&'a SourceFile>>> {
    let mut by_level: BTreeMap<LevelKey, Vec<&SourceFile>> = BTreeMap::new();

    if kind.level_axis().is_none() {
        by_level.insert(LevelKey(0.0), files.to_vec());
        return Ok(by_level);
    }

    for file in files {
        let token = file.name.level_token.as_deref().unwrap_or_default();
        let level: f64 = token.parse().map_err(|_| {
            AssemblyError::InvalidFileName(format!(
                "{}: level token '{}' of '{}' is not a number",
                file.path.display(),
                token,
                kind
            ))
        })?;
        by_level
            .entry(LevelKey(level))
            .or_default()
            .push(file);
    }
    Ok(by_level)
}
