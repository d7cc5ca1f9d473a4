//! Read-only access to raw data files.
//!
//! The checks in [`crate::data_checks`] never touch a storage library directly.
//! They work against the [`RawDataFile`] trait, which exposes exactly what they
//! need: file-level attributes, the ordered list of records, and per record the
//! fragments of a given type.
//!
//! Two implementations are provided:
//!
//! - [`MemoryDataFile`]: built in code, used by tests and by callers that already
//!   hold decoded records.
//! - `Hdf5RawDataFile` (feature `hdf5_files`): reads the on-disk HDF5 layout.
//!
//! Use [`open`] to get a boxed file for a path; without the `hdf5_files` feature
//! it fails with [`crate::error::IntegtestError::FeatureNotEnabled`].

pub mod header;
pub mod memory;

#[cfg(feature = "hdf5_files")]
pub mod hdf5_file;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::CheckResult;

pub use header::{Fragment, FragmentHeader};
pub use memory::MemoryDataFile;

#[cfg(feature = "hdf5_files")]
pub use hdf5_file::Hdf5RawDataFile;

/// Identifier of one record: trigger number plus sequence number.
///
/// Ordering follows the trigger number first, which is the order records are
/// listed in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Trigger number.
    pub trigger_number: u64,
    /// Sequence number within a split trigger.
    pub sequence_number: u16,
}

impl RecordId {
    /// Record id from its two parts.
    pub fn new(trigger_number: u64, sequence_number: u16) -> Self {
        Self {
            trigger_number,
            sequence_number,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.trigger_number, self.sequence_number)
    }
}

/// Subsystem that produced a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subsystem {
    /// Unrecognised subsystem code.
    Unknown,
    /// Detector readout electronics.
    DetectorReadout,
    /// Hardware signals interface.
    HwSignalsInterface,
    /// Trigger system.
    Trigger,
    /// Trigger record builder.
    TrBuilder,
}

impl Subsystem {
    /// Decode the on-disk subsystem code.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::DetectorReadout,
            2 => Self::HwSignalsInterface,
            3 => Self::Trigger,
            4 => Self::TrBuilder,
            _ => Self::Unknown,
        }
    }

    /// On-disk subsystem code.
    pub fn code(self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::DetectorReadout => 1,
            Self::HwSignalsInterface => 2,
            Self::Trigger => 3,
            Self::TrBuilder => 4,
        }
    }

    /// Name used in dataset names and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::DetectorReadout => "Detector_Readout",
            Self::HwSignalsInterface => "HW_Signals_Interface",
            Self::Trigger => "Trigger",
            Self::TrBuilder => "TR_Builder",
        }
    }
}

/// Producer of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId {
    /// Producing subsystem.
    pub subsystem: Subsystem,
    /// Id within the subsystem.
    pub id: u32,
}

impl SourceId {
    /// Source id from its two parts.
    pub fn new(subsystem: Subsystem, id: u32) -> Self {
        Self { subsystem, id }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subsystem: {} id: {}", self.subsystem.name(), self.id)
    }
}

/// Value of a file-level attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Any integer type.
    Int(i64),
    /// Any floating point type.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Any string type.
    Str(String),
    /// A type the checks do not interpret; holds a description.
    Other(String),
}

impl AttributeValue {
    /// Integer view of the value; numeric strings are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) | Self::Other(v) => f.write_str(v),
        }
    }
}

/// Read-only view of a raw data file.
///
/// Implementations hold whatever handle they need for their lifetime and release
/// it on drop; checks open, use and drop a file within a single call.
pub trait RawDataFile {
    /// Base name of the file, used for name/attribute cross checks.
    fn file_name(&self) -> &str;

    /// File-level attribute, `None` when absent.
    fn attribute(&self, name: &str) -> CheckResult<Option<AttributeValue>>;

    /// All record ids in ascending order.
    fn record_ids(&self) -> CheckResult<Vec<RecordId>>;

    /// Number of record headers (trigger-record or time-slice) stored for `record`.
    fn record_header_count(&self, record: &RecordId) -> CheckResult<usize>;

    /// Sources of the fragments of `fragment_type` in `record`, optionally
    /// restricted to one subdetector.
    fn source_ids_for_fragment_type(
        &self,
        record: &RecordId,
        fragment_type: &str,
        subdetector: Option<&str>,
    ) -> CheckResult<Vec<SourceId>>;

    /// The fragment produced by `source` in `record`.
    fn fragment(&self, record: &RecordId, source: &SourceId) -> CheckResult<Fragment>;
}

/// Trigger-candidate type of a record, `"kUnknown"` when it cannot be decoded.
///
/// The type is taken from the record's single `Trigger_Candidate` fragment; zero
/// or several candidates, or a candidate without payload, give `"kUnknown"`.
pub fn tc_type(file: &dyn RawDataFile, record: &RecordId) -> CheckResult<String> {
    let sources = file.source_ids_for_fragment_type(record, "Trigger_Candidate", None)?;
    if let [source] = sources.as_slice() {
        let fragment = file.fragment(record, source)?;
        if let Some(name) = fragment.tc_type() {
            return Ok(name.to_string());
        }
    }
    Ok(header::UNKNOWN_TC_TYPE.to_string())
}

/// Open a raw data file from disk.
pub fn open(path: &Path) -> CheckResult<Box<dyn RawDataFile>> {
    #[cfg(feature = "hdf5_files")]
    {
        Ok(Box::new(Hdf5RawDataFile::open(path)?))
    }

    #[cfg(not(feature = "hdf5_files"))]
    {
        tracing::debug!(path = %path.display(), "cannot open data file without HDF5 support");
        Err(crate::error::IntegtestError::FeatureNotEnabled(
            "hdf5_files".to_string(),
        ))
    }
}

/// Base name of a path as a string, falling back to the full path.
pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
