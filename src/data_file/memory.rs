//! In-memory raw data file.

use std::collections::BTreeMap;

use super::header::{fragment_type_code, Fragment, FragmentHeader};
use super::{AttributeValue, RawDataFile, RecordId, SourceId};
use crate::error::{CheckResult, IntegtestError};

#[derive(Debug, Clone)]
struct MemoryRecord {
    header_count: usize,
    fragments: BTreeMap<SourceId, Fragment>,
}

impl Default for MemoryRecord {
    fn default() -> Self {
        Self {
            header_count: 1,
            fragments: BTreeMap::new(),
        }
    }
}

/// A [`RawDataFile`] assembled in code.
///
/// Records get one trigger-record header by default.
///
/// # Example
///
/// ```
/// use daq_integtest::data_file::{MemoryDataFile, RawDataFile, RecordId, SourceId, Subsystem};
/// use daq_integtest::data_file::memory::fragment;
///
/// let record = RecordId::new(1, 0);
/// let file = MemoryDataFile::new("integtest_raw_run000101_0000_df-01_dw_0_20240105T100000.hdf5")
///     .with_fragment(record, fragment("WIBEth", SourceId::new(Subsystem::DetectorReadout, 0), 7200));
///
/// assert_eq!(file.record_ids().unwrap(), vec![record]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDataFile {
    name: String,
    attributes: BTreeMap<String, AttributeValue>,
    records: BTreeMap<RecordId, MemoryRecord>,
}

impl MemoryDataFile {
    /// Empty file with the given base name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add or replace a file-level attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Add an empty record.
    pub fn with_record(mut self, record: RecordId) -> Self {
        self.records.entry(record).or_default();
        self
    }

    /// Add a fragment to a record, creating the record if needed.
    pub fn with_fragment(mut self, record: RecordId, fragment: Fragment) -> Self {
        self.insert_fragment(record, fragment);
        self
    }

    /// Override how many trigger-record headers a record has.
    pub fn with_header_count(mut self, record: RecordId, count: usize) -> Self {
        self.records.entry(record).or_default().header_count = count;
        self
    }

    /// Add a fragment to a record in place.
    pub fn insert_fragment(&mut self, record: RecordId, fragment: Fragment) {
        self.records
            .entry(record)
            .or_default()
            .fragments
            .insert(fragment.header.source_id, fragment);
    }

    fn record(&self, record: &RecordId) -> CheckResult<&MemoryRecord> {
        self.records
            .get(record)
            .ok_or(IntegtestError::MissingRecord(*record))
    }
}

impl RawDataFile for MemoryDataFile {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn attribute(&self, name: &str) -> CheckResult<Option<AttributeValue>> {
        Ok(self.attributes.get(name).cloned())
    }

    fn record_ids(&self) -> CheckResult<Vec<RecordId>> {
        Ok(self.records.keys().copied().collect())
    }

    fn record_header_count(&self, record: &RecordId) -> CheckResult<usize> {
        Ok(self.record(record)?.header_count)
    }

    fn source_ids_for_fragment_type(
        &self,
        record: &RecordId,
        fragment_type: &str,
        subdetector: Option<&str>,
    ) -> CheckResult<Vec<SourceId>> {
        Ok(self
            .record(record)?
            .fragments
            .values()
            .filter(|f| f.header.fragment_type_name() == fragment_type)
            .filter(|f| subdetector.map_or(true, |s| f.header.subdetector() == s))
            .map(|f| f.header.source_id)
            .collect())
    }

    fn fragment(&self, record: &RecordId, source: &SourceId) -> CheckResult<Fragment> {
        self.record(record)?
            .fragments
            .get(source)
            .cloned()
            .ok_or(IntegtestError::MissingFragment {
                record: *record,
                source_id: *source,
            })
    }
}

/// Fragment of a named type with a zero-filled payload of `payload_len` bytes.
///
/// Unknown type names produce a fragment of type `"Unknown"`.
pub fn fragment(fragment_type: &str, source: SourceId, payload_len: usize) -> Fragment {
    fragment_with_payload(fragment_type, source, vec![0u8; payload_len])
}

/// Fragment of a named type carrying `payload`.
pub fn fragment_with_payload(fragment_type: &str, source: SourceId, payload: Vec<u8>) -> Fragment {
    let code = fragment_type_code(fragment_type).unwrap_or(0);
    Fragment {
        header: FragmentHeader::new(code, source, payload.len()),
        payload,
    }
}
