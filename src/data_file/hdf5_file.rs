//! HDF5-backed raw data file.
//!
//! Layout read by this module:
//!
//! ```text
//! /                                   file attributes (run_number, file_index, ...)
//! /TriggerRecord00001.0000/RawData/   one group per record
//!     TR_Builder_0x00000000_TriggerRecordHeader
//!     Detector_Readout_0x00000064_WIBEth
//!     Trigger_0x00000000_Trigger_Candidate
//!     ...
//! ```
//!
//! Every dataset is a 1-D byte array. Datasets whose name contains
//! `TriggerRecordHeader` (or `TimeSliceHeader` in `TimeSliceNNNNN` groups of
//! TP files) are record headers; all others are fragments and start with the
//! fixed header decoded by [`super::header`].
//!
//! Fragment headers are read once per record, [`FRAGMENT_HEADER_SIZE`] bytes per
//! dataset, and cached; a full dataset is only read for a requested fragment.

use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{File, Group};
use regex::Regex;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

use super::header::{Fragment, FragmentHeader, FRAGMENT_HEADER_SIZE};
use super::{base_name, AttributeValue, RawDataFile, RecordId, SourceId};
use crate::error::{compile_pattern, CheckResult, IntegtestError};

const RAW_DATA_GROUP: &str = "RawData";
const RECORD_HEADER_MARKERS: [&str; 2] = ["TriggerRecordHeader", "TimeSliceHeader"];
const RECORD_GROUP_PATTERN: &str = r"^(?:TriggerRecord|TimeSlice)(\d+)(?:\.(\d+))?$";

/// Raw data file opened read-only through libhdf5.
///
/// The file handle is held for the lifetime of this value and closed on drop.
pub struct Hdf5RawDataFile {
    file: File,
    name: String,
    records: BTreeMap<RecordId, String>,
    fragment_index: RefCell<BTreeMap<RecordId, Rc<[IndexedFragment]>>>,
}

/// A fragment dataset and its decoded header.
struct IndexedFragment {
    dataset: String,
    header: FragmentHeader,
}

/// Whether a dataset in a `RawData` group holds a record header.
fn is_record_header(dataset_name: &str) -> bool {
    RECORD_HEADER_MARKERS
        .iter()
        .any(|marker| dataset_name.contains(marker))
}

impl Hdf5RawDataFile {
    /// Open `path` and index its record groups.
    pub fn open(path: &Path) -> CheckResult<Self> {
        if !path.is_file() {
            return Err(IntegtestError::io(
                path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        let file = File::open(path)?;
        let pattern = compile_pattern(RECORD_GROUP_PATTERN)?;

        let mut records = BTreeMap::new();
        for group_name in file.member_names()? {
            if let Some(id) = parse_record_group(&pattern, &group_name) {
                records.insert(id, group_name);
            }
        }
        debug!(
            path = %path.display(),
            records = records.len(),
            "opened raw data file"
        );

        Ok(Self {
            file,
            name: base_name(path),
            records,
            fragment_index: RefCell::new(BTreeMap::new()),
        })
    }

    fn raw_data(&self, record: &RecordId) -> CheckResult<Group> {
        let group_name = self
            .records
            .get(record)
            .ok_or(IntegtestError::MissingRecord(*record))?;
        Ok(self.file.group(group_name)?.group(RAW_DATA_GROUP)?)
    }

    /// Fragment datasets of a record with their headers, read on first use.
    fn fragments_of(&self, record: &RecordId) -> CheckResult<Rc<[IndexedFragment]>> {
        if let Some(entries) = self.fragment_index.borrow().get(record) {
            return Ok(Rc::clone(entries));
        }

        let raw = self.raw_data(record)?;
        let mut entries = Vec::new();
        for name in raw.member_names()? {
            if is_record_header(&name) {
                continue;
            }
            let dataset = raw.dataset(&name)?;
            let bytes = if dataset.size() > FRAGMENT_HEADER_SIZE {
                dataset
                    .read_slice_1d::<u8, _>(..FRAGMENT_HEADER_SIZE)?
                    .to_vec()
            } else {
                dataset.read_raw::<u8>()?
            };
            let header = FragmentHeader::decode(&bytes).map_err(|e| {
                IntegtestError::DataFile(format!("{}: dataset '{name}': {e}", self.name))
            })?;
            entries.push(IndexedFragment {
                dataset: name,
                header,
            });
        }
        debug!(%record, fragments = entries.len(), "indexed record");

        let entries: Rc<[IndexedFragment]> = entries.into();
        self.fragment_index
            .borrow_mut()
            .insert(*record, Rc::clone(&entries));
        Ok(entries)
    }
}

fn parse_record_group(pattern: &Regex, name: &str) -> Option<RecordId> {
    let caps = pattern.captures(name)?;
    let trigger_number = caps.get(1)?.as_str().parse().ok()?;
    let sequence_number = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    Some(RecordId::new(trigger_number, sequence_number))
}

fn read_attribute(attr: &hdf5::Attribute) -> CheckResult<AttributeValue> {
    let value = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(_) => AttributeValue::Int(attr.read_scalar::<i64>()?),
        TypeDescriptor::Unsigned(_) => AttributeValue::Int(attr.read_scalar::<u64>()? as i64),
        TypeDescriptor::Float(_) => AttributeValue::Float(attr.read_scalar::<f64>()?),
        TypeDescriptor::Boolean => AttributeValue::Bool(attr.read_scalar::<bool>()?),
        TypeDescriptor::VarLenUnicode => {
            AttributeValue::Str(attr.read_scalar::<VarLenUnicode>()?.to_string())
        }
        TypeDescriptor::VarLenAscii => {
            AttributeValue::Str(attr.read_scalar::<VarLenAscii>()?.to_string())
        }
        other => AttributeValue::Other(format!("{other:?}")),
    };
    Ok(value)
}

impl RawDataFile for Hdf5RawDataFile {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn attribute(&self, name: &str) -> CheckResult<Option<AttributeValue>> {
        if !self.file.attr_names()?.iter().any(|n| n == name) {
            return Ok(None);
        }
        let attr = self.file.attr(name)?;
        Ok(Some(read_attribute(&attr)?))
    }

    fn record_ids(&self) -> CheckResult<Vec<RecordId>> {
        Ok(self.records.keys().copied().collect())
    }

    fn record_header_count(&self, record: &RecordId) -> CheckResult<usize> {
        Ok(self
            .raw_data(record)?
            .member_names()?
            .iter()
            .filter(|name| is_record_header(name))
            .count())
    }

    fn source_ids_for_fragment_type(
        &self,
        record: &RecordId,
        fragment_type: &str,
        subdetector: Option<&str>,
    ) -> CheckResult<Vec<SourceId>> {
        Ok(self
            .fragments_of(record)?
            .iter()
            .map(|entry| &entry.header)
            .filter(|h| h.fragment_type_name() == fragment_type)
            .filter(|h| subdetector.map_or(true, |s| h.subdetector() == s))
            .map(|h| h.source_id)
            .collect())
    }

    fn fragment(&self, record: &RecordId, source: &SourceId) -> CheckResult<Fragment> {
        let entries = self.fragments_of(record)?;
        let entry = entries
            .iter()
            .find(|entry| entry.header.source_id == *source)
            .ok_or(IntegtestError::MissingFragment {
                record: *record,
                source_id: *source,
            })?;
        let bytes = self
            .raw_data(record)?
            .dataset(&entry.dataset)?
            .read_raw::<u8>()?;
        Fragment::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_file::memory::fragment;
    use crate::data_file::Subsystem;

    fn write_time_slice_file(path: &Path, sources: &[SourceId], payload_len: usize) {
        let file = File::create(path).unwrap();
        let raw = file
            .create_group("TimeSlice00001")
            .unwrap()
            .create_group(RAW_DATA_GROUP)
            .unwrap();
        raw.new_dataset_builder()
            .with_data(&[0u8; 16][..])
            .create("TR_Builder_0x00000000_TimeSliceHeader")
            .unwrap();
        for source in sources {
            let frag = fragment("WIBEth", *source, payload_len);
            let mut bytes = frag.header.encode().to_vec();
            bytes.extend_from_slice(&frag.payload);
            raw.new_dataset_builder()
                .with_data(&bytes[..])
                .create(format!("Detector_Readout_0x{:08x}_WIBEth", source.id).as_str())
                .unwrap();
        }
    }

    #[test]
    fn parses_record_group_names() {
        let pattern = compile_pattern(RECORD_GROUP_PATTERN).unwrap();
        assert_eq!(
            parse_record_group(&pattern, "TriggerRecord00012.0003"),
            Some(RecordId::new(12, 3))
        );
        assert_eq!(
            parse_record_group(&pattern, "TimeSlice00007"),
            Some(RecordId::new(7, 0))
        );
        assert_eq!(parse_record_group(&pattern, "RawData"), None);
    }

    #[test]
    fn record_headers_of_both_file_kinds_are_recognised() {
        assert!(is_record_header("TR_Builder_0x00000000_TriggerRecordHeader"));
        assert!(is_record_header("TR_Builder_0x00000000_TimeSliceHeader"));
        assert!(!is_record_header("Detector_Readout_0x00000064_WIBEth"));
        assert!(!is_record_header("Trigger_0x00000000_Trigger_Candidate"));
    }

    #[test]
    fn time_slice_records_index_headers_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integtest_tp_run000001_0000_tpw_20240105T100000.hdf5");
        let sources = [
            SourceId::new(Subsystem::DetectorReadout, 1),
            SourceId::new(Subsystem::DetectorReadout, 2),
        ];
        write_time_slice_file(&path, &sources, 500);

        let file = Hdf5RawDataFile::open(&path).unwrap();
        let record = RecordId::new(1, 0);
        assert_eq!(file.record_ids().unwrap(), vec![record]);
        assert_eq!(file.record_header_count(&record).unwrap(), 1);
        assert_eq!(
            file.source_ids_for_fragment_type(&record, "WIBEth", None)
                .unwrap(),
            sources.to_vec()
        );

        let second = file.fragment(&record, &sources[1]).unwrap();
        assert_eq!(second.header.source_id, sources[1]);
        assert_eq!(second.payload.len(), 500);
        assert_eq!(second.size(), (FRAGMENT_HEADER_SIZE + 500) as u64);
        assert_eq!(file.fragment_index.borrow().len(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Hdf5RawDataFile::open(&dir.path().join("absent.hdf5"));
        assert!(matches!(result, Err(IntegtestError::Io { .. })));
    }
}
