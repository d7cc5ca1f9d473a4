//! # DAQ Integration-Test Checks
//!
//! Validation of the outputs of a data-acquisition integration-test run: the
//! run-control log files and the HDF5 raw data files. Every check is a
//! synchronous function over read-only inputs that returns `Ok(bool)` for
//! pass/fail and reports each individual violation through `tracing`. Only
//! I/O failures, malformed patterns and structurally broken files are errors.
//!
//! ## Crate Structure
//!
//! - **`log_checks`**: Line classification and per-file exclusion/requirement
//!   rules for log files.
//! - **`ordinal`**: Positional tags ("first", "penultimate", "last", ...) for a
//!   record within a file.
//! - **`params`**: `FragmentTypeParams` and the layered resolution of count,
//!   size and error-mask limits per record.
//! - **`data_file`**: The `RawDataFile` trait, the fixed fragment header, an
//!   in-memory file and the HDF5 reader (feature `hdf5_files`).
//! - **`data_checks`**: Sanity, attribute, record-count and fragment checks.
//! - **`artifacts`**: Discovery of log and data files in a run directory.
//! - **`runner`**: Runs the configured checks over files or a whole run.
//! - **`config`**: Figment-based TOML/environment configuration.
//! - **`error`**: The `IntegtestError` type.
//! - **`tracing_setup`**: Subscriber installation for the CLI.

pub mod artifacts;
pub mod config;
pub mod data_checks;
pub mod data_file;
pub mod error;
pub mod log_checks;
pub mod ordinal;
pub mod params;
pub mod runner;
pub mod tracing_setup;

pub use error::{CheckResult, IntegtestError};
