//! Locating optional sample GRIB2 files.
//!
//! Real model output is too large to commit, so tests that want it look in
//! `$TEST_DATA_DIR` first and then in the `testdata/` folders of the
//! workspace. See [`require_test_file!`](crate::require_test_file).

use std::path::{Path, PathBuf};

/// Workspace root, two levels above this crate's manifest.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .unwrap_or(manifest_dir)
        .to_path_buf()
}

/// First existing `name` among the sample data locations.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let root = workspace_root();
    let env_dir = std::env::var_os("TEST_DATA_DIR").map(PathBuf::from);

    env_dir
        .into_iter()
        .chain([
            root.join("crates/grib2-parser/testdata"),
            root.join("crates/forecast-assembly/testdata"),
            root.join("testdata"),
        ])
        .map(|dir| dir.join(name))
        .find(|path| path.exists())
}
