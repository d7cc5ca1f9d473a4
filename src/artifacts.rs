//! Discovery of the files a run leaves in its run directory.

use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{compile_pattern, CheckResult, IntegtestError};

/// Files produced by one run, each list sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArtifacts {
    /// Process logs, `log_*.txt` and `log_*.log`.
    pub log_files: Vec<PathBuf>,
    /// Raw data files, `<op_env>_raw_*.hdf5`.
    pub data_files: Vec<PathBuf>,
    /// Trigger-primitive files, `<op_env>_tp_*.hdf5`.
    pub tp_files: Vec<PathBuf>,
    /// Operational monitoring dumps, `info_*.json`.
    pub opmon_files: Vec<PathBuf>,
}

struct ArtifactPatterns {
    log: Regex,
    data: Regex,
    tp: Regex,
    opmon: Regex,
}

impl ArtifactPatterns {
    fn new(op_env: &str) -> CheckResult<Self> {
        let op_env = regex::escape(op_env);
        Ok(Self {
            log: compile_pattern(r"^log_.*\.(?:txt|log)$")?,
            data: compile_pattern(&format!(r"^{op_env}_raw_.*\.hdf5$"))?,
            tp: compile_pattern(&format!(r"^{op_env}_tp_.*\.hdf5$"))?,
            opmon: compile_pattern(r"^info_.*\.json$")?,
        })
    }
}

impl RunArtifacts {
    /// Collect the artifacts in `run_dir` for the operational environment `op_env`.
    ///
    /// Only regular files directly inside `run_dir` are considered.
    pub fn discover(run_dir: impl AsRef<Path>, op_env: &str) -> CheckResult<Self> {
        let run_dir = run_dir.as_ref();
        let patterns = ArtifactPatterns::new(op_env)?;
        let mut artifacts = Self::default();

        let entries = std::fs::read_dir(run_dir).map_err(|e| IntegtestError::io(run_dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| IntegtestError::io(run_dir, e))?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                debug!(path = %path.display(), "skipping non UTF-8 file name");
                continue;
            };

            let bucket = if patterns.log.is_match(name) {
                &mut artifacts.log_files
            } else if patterns.data.is_match(name) {
                &mut artifacts.data_files
            } else if patterns.tp.is_match(name) {
                &mut artifacts.tp_files
            } else if patterns.opmon.is_match(name) {
                &mut artifacts.opmon_files
            } else {
                continue;
            };
            bucket.push(path);
        }

        artifacts.log_files.sort();
        artifacts.data_files.sort();
        artifacts.tp_files.sort();
        artifacts.opmon_files.sort();

        info!(
            run_dir = %run_dir.display(),
            logs = artifacts.log_files.len(),
            data = artifacts.data_files.len(),
            tp = artifacts.tp_files.len(),
            opmon = artifacts.opmon_files.len(),
            "discovered run artifacts"
        );
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn picks_up_only_matching_names() {
        let dir = TempDir::new().unwrap();
        let log_b = touch(&dir, "log_ru-01_3335.txt");
        let log_a = touch(&dir, "log_dfo_3333.log");
        let raw = touch(&dir, "integtest_raw_run000101_0000_df-01_dw_0_20240105T100000.hdf5");
        let tp = touch(&dir, "integtest_tp_run000101_0000_tp-stream-writer_20240105T100000.hdf5");
        let info = touch(&dir, "info_dfo.json");
        touch(&dir, "other_raw_run000101_0000.hdf5");
        touch(&dir, "log_notes.md");
        touch(&dir, "integtest_raw_run000101.hdf5.writing");
        std::fs::create_dir(dir.path().join("log_dir.txt")).unwrap();

        let artifacts = RunArtifacts::discover(dir.path(), "integtest").unwrap();
        assert_eq!(artifacts.log_files, vec![log_a, log_b]);
        assert_eq!(artifacts.data_files, vec![raw]);
        assert_eq!(artifacts.tp_files, vec![tp]);
        assert_eq!(artifacts.opmon_files, vec![info]);
    }

    #[test]
    fn op_env_is_matched_literally() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "integXtest_raw_run1_0000.hdf5");
        let artifacts = RunArtifacts::discover(dir.path(), "integ.test").unwrap();
        assert!(artifacts.data_files.is_empty());
        assert!(artifacts.tp_files.is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = RunArtifacts::discover(dir.path().join("nope"), "integtest");
        assert!(matches!(result, Err(IntegtestError::Io { .. })));
    }
}
