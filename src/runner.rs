//! Drive the configured checks over logs, data files and whole runs.

use std::path::Path;
use tracing::{info, info_span, warn};

use crate::artifacts::RunArtifacts;
use crate::config::{DataChecksConfig, IntegtestConfig, LogChecksConfig};
use crate::data_checks::{
    check_file_attributes, check_fragment_count, check_fragment_error_flags,
    check_fragment_sizes, check_record_count, sanity_check,
};
use crate::data_file::{self, RawDataFile};
use crate::error::CheckResult;
use crate::log_checks::check_log_files;

/// Run the configured log checks over `paths`.
pub fn check_logs<P: AsRef<Path>>(paths: &[P], config: &LogChecksConfig) -> CheckResult<bool> {
    let exclusions = config.exclusion_map()?;
    let requirements = config.requirement_map()?;
    check_log_files(paths, config.show_all, &exclusions, &requirements)
}

/// Run every configured data check on one file.
///
/// All checks run even after one fails.
pub fn check_data_file(file: &dyn RawDataFile, config: &DataChecksConfig) -> CheckResult<bool> {
    let _span = info_span!("data_file", name = file.file_name()).entered();
    let mut passed = true;

    if config.sanity_check {
        passed &= sanity_check(file)?;
    }
    if config.check_attributes {
        passed &= check_file_attributes(file)?;
    }
    if let Some(expected) = config.expected_record_count {
        passed &= check_record_count(file, expected, config.record_count_tolerance)?;
    }
    for params in &config.fragments {
        passed &= check_fragment_count(file, params)?;
        passed &= check_fragment_sizes(file, params)?;
        passed &= check_fragment_error_flags(file, params)?;
    }
    Ok(passed)
}

/// Open and check each data file in turn.
pub fn check_data_files<P: AsRef<Path>>(
    paths: &[P],
    config: &DataChecksConfig,
) -> CheckResult<bool> {
    let mut passed = true;
    for path in paths {
        let file = data_file::open(path.as_ref())?;
        passed &= check_data_file(file.as_ref(), config)?;
    }
    Ok(passed)
}

/// Check everything a run left behind.
///
/// Raw data files get the full data checks; TP files only the sanity and
/// attribute checks, since fragment expectations describe raw data.
pub fn check_run(artifacts: &RunArtifacts, config: &IntegtestConfig) -> CheckResult<bool> {
    if artifacts.log_files.is_empty() && artifacts.data_files.is_empty() {
        warn!("no log or data files found for this run");
        return Ok(false);
    }

    let mut passed = check_logs(&artifacts.log_files, &config.log_checks)?;
    if !passed && !config.log_checks.show_all {
        return Ok(false);
    }

    passed &= check_data_files(&artifacts.data_files, &config.data_checks)?;

    let tp_config = DataChecksConfig {
        expected_record_count: None,
        fragments: Vec::new(),
        ..config.data_checks.clone()
    };
    passed &= check_data_files(&artifacts.tp_files, &tp_config)?;

    if passed {
        info!(
            logs = artifacts.log_files.len(),
            data = artifacts.data_files.len(),
            tp = artifacts.tp_files.len(),
            opmon = artifacts.opmon_files.len(),
            "all run checks passed"
        );
    }
    Ok(passed)
}
