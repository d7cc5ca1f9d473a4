//! Checks on raw data files.
//!
//! All checks take a [`RawDataFile`] and report through `tracing`: every
//! violation is logged as a warning and evaluation continues, so one call
//! surfaces every bad record. The returned `bool` is the AND over everything
//! that was checked. Only structural failures (unreadable file, missing record)
//! are returned as errors.
//!
//! The fragment checks resolve their limits per record from the record's
//! trigger-candidate type and ordinal position, see [`crate::params`].

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt::Display;
use tracing::{debug, info, warn};

use crate::data_file::{tc_type, RawDataFile, RecordId, SourceId};
use crate::error::{compile_pattern, CheckResult};
use crate::ordinal::ordinal_tags;
use crate::params::{
    FragmentTypeParams, DEBUG_COUNT_LIMITS, DEBUG_COUNT_VALUES, DEBUG_SIZE_LIMITS,
    DEBUG_SIZE_VALUES,
};

pub use crate::data_file::header::error_bit_names;

/// File-level attributes every raw data file must carry.
pub const EXPECTED_ATTRIBUTES: [&str; 13] = [
    "application_name",
    "closing_timestamp",
    "creation_timestamp",
    "file_index",
    "filelayout_params",
    "filelayout_version",
    "offline_data_stream",
    "operational_environment",
    "record_type",
    "recorded_size",
    "run_number",
    "run_was_for_test_purposes",
    "source_id_geo_id_map",
];

/// Timestamp format embedded in data file names.
pub const FILE_NAME_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

const RECORD_HEADER: &str = "TriggerRecordHeader";

/// Per-record inputs to the layered limit resolution.
#[derive(Debug, Clone)]
struct RecordContext {
    id: RecordId,
    tc_type: String,
    ordinal_tags: Vec<String>,
}

fn record_contexts(file: &dyn RawDataFile) -> CheckResult<Vec<RecordContext>> {
    let records = file.record_ids()?;
    records
        .iter()
        .map(|id| {
            Ok(RecordContext {
                id: *id,
                tc_type: tc_type(file, id)?,
                ordinal_tags: ordinal_tags(id, &records),
            })
        })
        .collect()
}

fn source_ids(
    file: &dyn RawDataFile,
    record: &RecordId,
    params: &FragmentTypeParams,
) -> CheckResult<Vec<SourceId>> {
    file.source_ids_for_fragment_type(record, &params.fragment_type, params.subdetector.as_deref())
}

/// Render a set of limits as a single value when they are all the same.
fn summarize<T: Display>(values: &BTreeSet<T>) -> String {
    match values.len() {
        1 => values.iter().map(ToString::to_string).collect(),
        _ => format!(
            "[{}]",
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Every record must have exactly one trigger-record header.
pub fn sanity_check(file: &dyn RawDataFile) -> CheckResult<bool> {
    let mut passed = true;
    for record in file.record_ids()? {
        match file.record_header_count(&record)? {
            1 => {}
            0 => {
                warn!(file = file.file_name(), %record, "no {RECORD_HEADER} in record");
                passed = false;
            }
            n => {
                warn!(file = file.file_name(), %record, count = n, "more than one {RECORD_HEADER} in record");
                passed = false;
            }
        }
    }
    if passed {
        info!(file = file.file_name(), "sanity check passed");
    }
    Ok(passed)
}

/// First integer in `name` captured by `pattern`'s first group.
fn number_in_name(pattern: &str, name: &str) -> CheckResult<Option<i64>> {
    let re = compile_pattern(pattern)?;
    Ok(re
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok()))
}

/// Name-embedded timestamps accepted for a creation time in milliseconds.
fn timestamp_candidates(creation_ms: i64) -> Vec<String> {
    let seconds = creation_ms.div_euclid(1000);
    [seconds, seconds - 1, seconds + 1]
        .into_iter()
        .filter_map(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.format(FILE_NAME_TIMESTAMP_FORMAT).to_string())
        .collect()
}

/// Required attributes exist and agree with the file name.
///
/// `run_number` is compared with the first `_run<digits>_` of the name and
/// `file_index` with the first `_<digits>_`; either comparison is skipped when
/// the name has no such group. `creation_timestamp` must appear in the name as
/// UTC `YYYYMMDDTHHMMSS`, allowing one second either way.
pub fn check_file_attributes(file: &dyn RawDataFile) -> CheckResult<bool> {
    let name = file.file_name();
    let mut passed = true;

    for attr_name in EXPECTED_ATTRIBUTES {
        let Some(value) = file.attribute(attr_name)? else {
            warn!(file = name, "attribute '{attr_name}' not found");
            passed = false;
            continue;
        };

        let from_name = match attr_name {
            "run_number" => number_in_name(r"_run(\d+)_", name)?,
            "file_index" => number_in_name(r"_(\d+)_", name)?,
            "creation_timestamp" => {
                let candidates = value.as_i64().map(timestamp_candidates).unwrap_or_default();
                if !candidates.iter().any(|stamp| name.contains(stamp.as_str())) {
                    warn!(
                        file = name,
                        value = %value,
                        accepted = ?candidates,
                        "attribute '{attr_name}' does not match the file name"
                    );
                    passed = false;
                }
                continue;
            }
            _ => continue,
        };

        if let Some(expected) = from_name {
            if value.as_i64() != Some(expected) {
                warn!(
                    file = name,
                    value = %value,
                    from_name = expected,
                    "attribute '{attr_name}' does not match the file name"
                );
                passed = false;
            }
        }
    }

    if passed {
        info!(file = name, "all attribute checks passed");
    }
    Ok(passed)
}

/// The number of records is within `tolerance` of `expected`.
pub fn check_record_count(
    file: &dyn RawDataFile,
    expected: u64,
    tolerance: u64,
) -> CheckResult<bool> {
    let count = file.record_ids()?.len() as u64;
    let min = expected.saturating_sub(tolerance);
    let max = expected.saturating_add(tolerance);
    if count < min || count > max {
        warn!(
            file = file.file_name(),
            count,
            expected,
            tolerance,
            "record count is outside the tolerance"
        );
        return Ok(false);
    }
    info!(file = file.file_name(), count, expected, tolerance, "record count within tolerance");
    Ok(true)
}

/// Every record holds an allowed number of fragments of the given type.
pub fn check_fragment_count(
    file: &dyn RawDataFile,
    params: &FragmentTypeParams,
) -> CheckResult<bool> {
    let description = &params.fragment_type_description;
    let records = record_contexts(file)?;
    let mut passed = true;
    let mut mins = BTreeSet::new();
    let mut maxs = BTreeSet::new();

    for record in &records {
        let limits = params.count_bounds(&record.tc_type, &record.ordinal_tags);
        if params.debug(DEBUG_COUNT_LIMITS) {
            debug!(
                %limits,
                tc_type = %record.tc_type,
                ordinals = ?record.ordinal_tags,
                "fragment count limits"
            );
        }
        mins.insert(limits.min);
        maxs.insert(limits.max);

        let count = source_ids(file, &record.id, params)?.len() as u64;
        if params.debug(DEBUG_COUNT_VALUES) {
            debug!(record = %record.id, count, "fragment count");
        }
        if !limits.contains(count) {
            warn!(
                file = file.file_name(),
                record = %record.id,
                count,
                %limits,
                "unexpected number of {description} fragments"
            );
            passed = false;
        }
    }

    if passed {
        if mins.len() == 1 && mins == maxs {
            info!(
                "{description} fragment count of {} confirmed in all {} records",
                summarize(&mins),
                records.len()
            );
        } else {
            info!(
                "{description} fragment count in range {} to {} confirmed in all {} records",
                summarize(&mins),
                summarize(&maxs),
                records.len()
            );
        }
    }
    Ok(passed)
}

/// Every fragment of the given type has an allowed size.
///
/// Passes without reading the file when no fragments are expected.
pub fn check_fragment_sizes(
    file: &dyn RawDataFile,
    params: &FragmentTypeParams,
) -> CheckResult<bool> {
    if params.expects_no_fragments() {
        return Ok(true);
    }
    let description = &params.fragment_type_description;
    let records = record_contexts(file)?;
    let mut passed = true;
    let mut mins = BTreeSet::new();
    let mut maxs = BTreeSet::new();

    for record in &records {
        let limits = params.size_bounds(&record.tc_type, &record.ordinal_tags);
        if params.debug(DEBUG_SIZE_LIMITS) {
            debug!(
                %limits,
                tc_type = %record.tc_type,
                ordinals = ?record.ordinal_tags,
                "fragment size limits"
            );
        }
        mins.insert(limits.min);
        maxs.insert(limits.max);

        for source in source_ids(file, &record.id, params)? {
            let size = file.fragment(&record.id, &source)?.size();
            if params.debug(DEBUG_SIZE_VALUES) {
                debug!(%source, size, "fragment size");
            }
            if !limits.contains(size) {
                warn!(
                    file = file.file_name(),
                    record = %record.id,
                    %source,
                    size,
                    %limits,
                    "{description} fragment size out of range"
                );
                passed = false;
            }
        }
    }

    if passed {
        info!(
            "all {description} fragments in {} records have sizes between {} and {}",
            records.len(),
            summarize(&mins),
            summarize(&maxs)
        );
    }
    Ok(passed)
}

/// No fragment of the given type has an error bit set inside its mask.
///
/// Passes without reading the file when no fragments are expected.
pub fn check_fragment_error_flags(
    file: &dyn RawDataFile,
    params: &FragmentTypeParams,
) -> CheckResult<bool> {
    if params.expects_no_fragments() {
        return Ok(true);
    }
    let description = &params.fragment_type_description;
    let records = record_contexts(file)?;
    let mut passed = true;

    for record in &records {
        let mask = params.error_bitmask(&record.tc_type, &record.ordinal_tags);
        for source in source_ids(file, &record.id, params)? {
            let fragment = file.fragment(&record.id, &source)?;
            let flagged = fragment.header.error_bits & mask;
            if flagged != 0 {
                warn!(
                    file = file.file_name(),
                    record = %record.id,
                    %source,
                    error_bits = fragment.header.error_bits,
                    mask,
                    bits = ?error_bit_names(flagged),
                    "{description} fragment has error bits set"
                );
                passed = false;
            }
        }
    }

    if passed {
        info!(
            "no unexpected error bits in {description} fragments in {} records",
            records.len()
        );
    }
    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_file::header::tc_payload;
    use crate::data_file::memory::{fragment, fragment_with_payload};
    use crate::data_file::{AttributeValue, MemoryDataFile, Subsystem};
    use crate::params::{CountOverride, SizeOverride};
    use tracing_test::traced_test;

    const FILE_NAME: &str = "integtest_raw_run000101_0003_df-01_dw_0_20240105T100000.hdf5";
    // 2024-01-05T10:00:00Z
    const CREATION_MS: i64 = 1_704_448_800_000;

    fn readout(id: u32) -> SourceId {
        SourceId::new(Subsystem::DetectorReadout, id)
    }

    fn trigger_candidate(tc: u16) -> crate::data_file::Fragment {
        fragment_with_payload(
            "Trigger_Candidate",
            SourceId::new(Subsystem::Trigger, 0),
            tc_payload(tc),
        )
    }

    /// Records 1..=n, each with `per_record` WIBEth fragments of `payload` bytes.
    fn wib_file(records: u64, per_record: u32, payload: usize) -> MemoryDataFile {
        let mut file = MemoryDataFile::new(FILE_NAME);
        for n in 1..=records {
            let record = RecordId::new(n, 0);
            file = file.with_record(record);
            for id in 0..per_record {
                file.insert_fragment(record, fragment("WIBEth", readout(id), payload));
            }
        }
        file
    }

    fn wib_params() -> FragmentTypeParams {
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params.expected_fragment_count = Some(2);
        params.min_size_bytes = Some(72);
        params.max_size_bytes = Some(1072);
        params
    }

    fn complete_attributes(file: MemoryDataFile) -> MemoryDataFile {
        EXPECTED_ATTRIBUTES
            .iter()
            .fold(file, |f, name| f.with_attribute(*name, AttributeValue::Str("x".into())))
            .with_attribute("run_number", AttributeValue::Int(101))
            .with_attribute("file_index", AttributeValue::Int(3))
            .with_attribute("creation_timestamp", AttributeValue::Int(CREATION_MS))
    }

    #[test]
    fn sanity_check_requires_one_header_per_record() {
        let good = wib_file(3, 1, 10);
        assert!(sanity_check(&good).unwrap());

        let none = wib_file(3, 1, 10).with_header_count(RecordId::new(2, 0), 0);
        assert!(!sanity_check(&none).unwrap());
        let two = wib_file(3, 1, 10).with_header_count(RecordId::new(3, 0), 2);
        assert!(!sanity_check(&two).unwrap());
    }

    #[test]
    fn consistent_attributes_pass() {
        let file = complete_attributes(MemoryDataFile::new(FILE_NAME));
        assert!(check_file_attributes(&file).unwrap());
    }

    #[test]
    #[traced_test]
    fn missing_attribute_fails() {
        let file = complete_attributes(MemoryDataFile::new(FILE_NAME));
        let mut stripped = MemoryDataFile::new(FILE_NAME);
        for name in EXPECTED_ATTRIBUTES.iter().filter(|n| **n != "recorded_size") {
            stripped = stripped.with_attribute(*name, file.attribute(name).unwrap().unwrap());
        }
        assert!(!check_file_attributes(&stripped).unwrap());
        assert!(logs_contain("attribute 'recorded_size' not found"));
    }

    #[test]
    fn run_number_and_index_must_match_name() {
        let wrong_run = complete_attributes(MemoryDataFile::new(FILE_NAME))
            .with_attribute("run_number", AttributeValue::Int(102));
        assert!(!check_file_attributes(&wrong_run).unwrap());

        let wrong_index = complete_attributes(MemoryDataFile::new(FILE_NAME))
            .with_attribute("file_index", AttributeValue::Int(0));
        assert!(!check_file_attributes(&wrong_index).unwrap());
    }

    #[test]
    fn creation_timestamp_allows_one_second_either_way() {
        for offset in [-1_000, 0, 999, 1_000, 1_999] {
            let file = complete_attributes(MemoryDataFile::new(FILE_NAME))
                .with_attribute("creation_timestamp", AttributeValue::Int(CREATION_MS + offset));
            assert!(check_file_attributes(&file).unwrap(), "offset {offset}");
        }
        for offset in [-2_000, 2_000] {
            let file = complete_attributes(MemoryDataFile::new(FILE_NAME))
                .with_attribute("creation_timestamp", AttributeValue::Int(CREATION_MS + offset));
            assert!(!check_file_attributes(&file).unwrap(), "offset {offset}");
        }
    }

    #[test]
    fn record_count_tolerance() {
        let file = wib_file(5, 0, 0);
        assert!(check_record_count(&file, 5, 0).unwrap());
        assert!(check_record_count(&file, 6, 1).unwrap());
        assert!(check_record_count(&file, 4, 1).unwrap());
        assert!(!check_record_count(&file, 7, 1).unwrap());
        assert!(!check_record_count(&file, 3, 1).unwrap());
    }

    #[test]
    fn fragment_count_boundary() {
        let params = wib_params();
        assert!(check_fragment_count(&wib_file(3, 2, 100), &params).unwrap());
        assert!(!check_fragment_count(&wib_file(3, 1, 100), &params).unwrap());
        assert!(!check_fragment_count(&wib_file(3, 3, 100), &params).unwrap());
    }

    #[test]
    #[traced_test]
    fn every_bad_record_is_reported() {
        let mut file = wib_file(3, 2, 100);
        file.insert_fragment(RecordId::new(1, 0), fragment("WIBEth", readout(7), 100));
        file.insert_fragment(RecordId::new(3, 0), fragment("WIBEth", readout(7), 100));
        assert!(!check_fragment_count(&file, &wib_params()).unwrap());
        assert!(logs_contain("record=(1, 0)"));
        assert!(logs_contain("record=(3, 0)"));
        assert!(!logs_contain("record=(2, 0)"));
    }

    #[test]
    fn unconfigured_count_always_fails() {
        let params = FragmentTypeParams::new("WIB", "WIBEth");
        assert!(!check_fragment_count(&wib_file(1, 0, 0), &params).unwrap());
    }

    #[test]
    fn count_limits_follow_tc_type_and_ordinal() {
        let mut file = MemoryDataFile::new(FILE_NAME);
        for n in 1..=3 {
            let record = RecordId::new(n, 0);
            file.insert_fragment(record, trigger_candidate(if n == 2 { 4 } else { 1 }));
            if n != 3 {
                file.insert_fragment(record, fragment("WIBEth", readout(0), 10));
            }
        }
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params.expected_fragment_count = Some(1);
        params.counts_by_ordinal.insert(
            "last".to_string(),
            CountOverride {
                min_count: Some(0),
                max_count: None,
            },
        );
        assert!(check_fragment_count(&file, &params).unwrap());

        // The middle record is kRandom and must now have no WIB fragments.
        params.counts_by_tc_type.insert(
            "kRandom".to_string(),
            CountOverride {
                min_count: Some(0),
                max_count: Some(0),
            },
        );
        assert!(!check_fragment_count(&file, &params).unwrap());
    }

    #[test]
    fn subdetector_restricts_lookup() {
        let record = RecordId::new(1, 0);
        let mut tpc = fragment("WIBEth", readout(0), 10);
        tpc.header.detector_id = 3;
        let mut pds = fragment("WIBEth", readout(1), 10);
        pds.header.detector_id = 2;
        let file = MemoryDataFile::new(FILE_NAME)
            .with_fragment(record, tpc)
            .with_fragment(record, pds);

        let mut params = FragmentTypeParams::new("TPC", "WIBEth");
        params.expected_fragment_count = Some(1);
        params.subdetector = Some("HD_TPC".to_string());
        assert!(check_fragment_count(&file, &params).unwrap());
        params.subdetector = None;
        assert!(!check_fragment_count(&file, &params).unwrap());
    }

    #[test]
    fn fragment_sizes_within_limits() {
        let params = wib_params();
        assert!(check_fragment_sizes(&wib_file(2, 2, 1000), &params).unwrap());
        assert!(!check_fragment_sizes(&wib_file(2, 2, 1001), &params).unwrap());
    }

    #[test]
    fn size_limits_can_be_relaxed_per_ordinal() {
        let mut params = wib_params();
        params.sizes_by_ordinal.insert(
            "first".to_string(),
            SizeOverride {
                min_size_bytes: None,
                max_size_bytes: Some(5000),
            },
        );
        let mut file = wib_file(3, 1, 100);
        file.insert_fragment(RecordId::new(1, 0), fragment("WIBEth", readout(5), 4000));
        assert!(check_fragment_sizes(&file, &params).unwrap());
        file.insert_fragment(RecordId::new(2, 0), fragment("WIBEth", readout(5), 4000));
        assert!(!check_fragment_sizes(&file, &params).unwrap());
    }

    #[test]
    fn zero_expected_count_skips_size_check() {
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params.expected_fragment_count = Some(0);
        // Fragments would violate the sentinel size limits if they were read.
        assert!(check_fragment_sizes(&wib_file(2, 2, 100), &params).unwrap());
        assert!(check_fragment_error_flags(&wib_file(2, 2, 100), &params).unwrap());
    }

    #[test]
    #[traced_test]
    fn error_bits_inside_mask_fail() {
        let record = RecordId::new(1, 0);
        let mut bad = fragment("WIBEth", readout(0), 10);
        bad.header.error_bits = 0b10;
        let file = MemoryDataFile::new(FILE_NAME).with_fragment(record, bad);

        let mut params = wib_params();
        params.error_bitmask = Some(0b01);
        assert!(check_fragment_error_flags(&file, &params).unwrap());

        params.error_bitmask = Some(0b11);
        assert!(!check_fragment_error_flags(&file, &params).unwrap());
        assert!(logs_contain("kIncomplete"));
    }

    #[test]
    fn default_mask_flags_any_bit() {
        let record = RecordId::new(1, 0);
        let mut bad = fragment("WIBEth", readout(0), 10);
        bad.header.error_bits = 1 << 20;
        let file = MemoryDataFile::new(FILE_NAME).with_fragment(record, bad);
        assert!(!check_fragment_error_flags(&file, &wib_params()).unwrap());
        assert_eq!(error_bit_names(1 << 20), vec!["kUnassigned20".to_string()]);
    }

    #[test]
    fn summary_collapses_identical_limits() {
        assert_eq!(summarize(&BTreeSet::from([4u64])), "4");
        assert_eq!(summarize(&BTreeSet::from([0u64, 4])), "[0, 4]");
    }
}
