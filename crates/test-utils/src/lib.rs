//! Test helpers shared by the FA crates.
//!
//! - locating the reference FA file and the R decoder script
//! - skip macros for tests that need either of them
//! - [`FaFixture`], a synthetic FA file that writes decoder output
//! - names and grid constants of the reference domain
//!
//! Used as a dev-dependency:
//!
//! ```ignore
//! use test_utils::{fields, require_test_file, FaFixture};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Path of a test file, or return from the test when it is not available.
///
/// FA files are large and cannot be redistributed; tests using one are
/// skipped wherever it has not been copied to a test data directory.
///
/// ```ignore
/// #[test]
/// fn test_reference_file() {
///     let path = test_utils::require_test_file!("ICMSHAR13+0014");
/// }
/// ```
#[macro_export]
macro_rules! require_test_file {
    ($name:expr) => {{
        let name = $name;
        match $crate::find_test_file(name) {
            Some(path) => path,
            None => {
                eprintln!(
                    "SKIPPED: FA file '{}' not found (copy it to testdata/ or set TEST_DATA_DIR)",
                    name
                );
                return;
            }
        }
    }};
}

/// Path of the decoder script, or return from the test when `Rscript` or
/// the script is not available.
#[macro_export]
macro_rules! require_decoder {
    () => {{
        if !$crate::rscript_available() {
            eprintln!("SKIPPED: Rscript not available.");
            return;
        }
        match $crate::find_decoder_script() {
            Some(path) => path,
            None => {
                eprintln!("SKIPPED: decoder script not found. Set FA_DECODER_SCRIPT.");
                return;
            }
        }
    }};
}

/// `|left - right| <= epsilon`, with both sides converted to `f64`.
///
/// ```ignore
/// test_utils::assert_approx_eq!(50.80001, 50.8, 1e-4);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        let diff = (left - right).abs();
        assert!(
            diff <= epsilon,
            "values not within {}: left = {}, right = {} (diff {})",
            epsilon,
            left,
            right,
            diff
        );
    }};
}
