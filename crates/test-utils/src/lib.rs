//! Test helpers shared by the workspace crates.
//!
//! Most tests never touch real model output: [`Grib2Builder`] encodes small
//! synthetic messages and [`CycleFixture`] lays them out as a GDPS or GFS
//! source directory. Tests that do want a real file use
//! [`require_test_file!`] and skip when it is absent.
//!
//! ```ignore
//! use test_utils::{assert_approx_eq, CycleFixture, GDPS_TMP};
//! ```

pub mod fixtures;
pub mod generators;
pub mod grib2;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use grib2::Grib2Builder;
pub use paths::*;

/// Resolve a sample file with [`find_test_file`], or return early from the
/// calling test with a skip note.
#[macro_export]
macro_rules! require_test_file {
    ($name:expr) => {{
        match $crate::find_test_file($name) {
            Some(path) => path,
            None => {
                eprintln!(
                    "SKIPPED: sample '{}' not found (set TEST_DATA_DIR to run this test)",
                    $name
                );
                return;
            }
        }
    }};
}

/// Assert two numbers differ by at most `epsilon`, comparing as `f64`.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        let diff = (left - right).abs();
        assert!(
            diff <= epsilon,
            "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
            left,
            right,
            diff,
            epsilon
        );
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(6001.0_f32, 6001, 0.5);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }
}
