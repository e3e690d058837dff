//! Cycle Grouper: partition a directory of source files by forecast cycle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::naming::{parse_filename, SourceFileName};
use crate::variables::{Product, VariableKind};

/// A source file with the metadata parsed from its name.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: SourceFileName,
}

impl SourceFile {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Every source file of one forecast cycle, sorted by file name.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleGroup {
    pub product: Product,
    pub reference_time: DateTime<Utc>,
    pub files: Vec<SourceFile>,
}

impl CycleGroup {
    /// Files holding `kind`. For one-field-per-file products this selects
    /// on the file-name token; otherwise every file of the cycle applies.
    pub fn files_for(&self, kind: VariableKind) -> Vec<&SourceFile> {
        match kind.file_token() {
            Some(token) => self
                .files
                .iter()
                .filter(|f| f.name.variable_token.as_deref() == Some(token))
                .collect(),
            None => self.files.iter().collect(),
        }
    }
}

/// Calendar and time-of-day filter on cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleFilter {
    /// First cycle day, inclusive.
    pub start: Option<NaiveDate>,
    /// Last cycle day, inclusive.
    pub end: Option<NaiveDate>,
    pub time_of_day: Option<NaiveTime>,
}

impl CycleFilter {
    pub fn matches(&self, cycle: &DateTime<Utc>) -> bool {
        let day = cycle.date_naive();
        self.start.map_or(true, |start| day >= start)
            && self.end.map_or(true, |end| day <= end)
            && self.time_of_day.map_or(true, |t| cycle.time() == t)
    }
}

/// List regular files directly inside `dir`, sorted by name.
pub fn list_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Group the files of `dir` by cycle.
pub fn group_cycles(product: Product, dir: &Path) -> Result<BTreeMap<DateTime<Utc>, CycleGroup>> {
    Ok(group_paths(product, list_source_files(dir)?))
}

/// Group paths by the cycle encoded in their names. Names that do not follow
/// the product's convention are skipped with a warning.
pub fn group_paths(
    product: Product,
    paths: impl IntoIterator<Item = PathBuf>,
) -> BTreeMap<DateTime<Utc>, CycleGroup> {
    let mut groups: BTreeMap<DateTime<Utc>, CycleGroup> = BTreeMap::new();

    for path in paths {
        let parsed = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| parse_filename(product, n));

        let Some(name) = parsed else {
            warn!(
                path = %path.display(),
                product = %product,
                "Skipping file that does not follow the naming convention"
            );
            continue;
        };

        groups
            .entry(name.cycle)
            .or_insert_with(|| CycleGroup {
                product,
                reference_time: name.cycle,
                files: Vec::new(),
            })
            .files
            .push(SourceFile { path, name });
    }

    for group in groups.values_mut() {
        group.files.sort_by(|a, b| a.file_name().cmp(b.file_name()));
        debug!(
            cycle = %group.reference_time,
            files = group.files.len(),
            "Grouped cycle"
        );
    }

    groups
}
