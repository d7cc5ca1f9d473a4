//! Custom error types for the validation library.
//!
//! This module defines `IntegtestError`, the single error type returned by every
//! check in the crate. Using the `thiserror` crate, it gives a consistent way to
//! surface the failures that must stop a check outright, as opposed to validation
//! failures, which are reported and folded into a `false` result.
//!
//! ## Error Hierarchy
//!
//! - **`Io`**: Wraps `std::io::Error`. A missing or unreadable log or data file is
//!   fatal and is never downgraded to a failed check.
//! - **`Regex`**: A malformed exclusion, requirement or file-name pattern. Patterns
//!   are compiled before any file is read so nothing is half-evaluated.
//! - **`Config`**: Wraps errors from `figment` while loading the TOML/env config.
//! - **`Configuration`**: Semantic problems in a config that parsed fine.
//! - **`DataFile`**: The raw data file is structurally unusable (bad fragment
//!   header, unexpected layout).
//! - **`FeatureNotEnabled`**: Functionality that was compiled out, such as opening
//!   HDF5 files without the `hdf5_files` feature.

use crate::data_file::{RecordId, SourceId};
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type CheckResult<T> = std::result::Result<T, IntegtestError>;

/// Errors that abort a check instead of failing it.
#[derive(Error, Debug)]
pub enum IntegtestError {
    /// File could not be opened or read.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Pattern failed to compile.
    #[error("Invalid pattern '{pattern}': {source}")]
    Regex {
        /// The offending pattern text.
        pattern: String,
        /// Underlying error.
        #[source]
        source: regex::Error,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but is not usable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Fragment parameters could not be parsed.
    #[error("Parameter parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data file content is malformed.
    #[error("Data file error: {0}")]
    DataFile(String),

    /// A record requested from a data file does not exist.
    #[error("Record {0} not found in data file")]
    MissingRecord(RecordId),

    /// A fragment requested from a data file does not exist.
    #[error("Fragment {source_id} not found in record {record}")]
    MissingFragment {
        /// Record that was searched.
        record: RecordId,
        /// Source that was requested.
        source_id: SourceId,
    },

    /// Error reported by libhdf5.
    #[cfg(feature = "hdf5_files")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Functionality compiled out of this build.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl IntegtestError {
    /// Build an `Io` variant tagged with the path that failed.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Build a `Regex` variant tagged with the pattern that failed.
    pub fn regex(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::Regex {
            pattern: pattern.into(),
            source,
        }
    }
}

/// Compile a pattern, keeping the source text in the error.
pub fn compile_pattern(pattern: &str) -> CheckResult<regex::Regex> {
    regex::Regex::new(pattern).map_err(|e| IntegtestError::regex(pattern, e))
}
