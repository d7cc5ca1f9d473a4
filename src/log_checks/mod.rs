//! Log file checks.
//!
//! Every line of a log file is classified with [`classify_line`]. Bad lines are
//! reported unless an exclusion pattern matches them, in which case they are
//! only counted. Lines matching a requirement pattern are never bad, and each
//! requirement must be seen at least once for the file to pass.
//!
//! Which exclusions and requirements apply to a file is decided by a
//! [`FileRuleMap`]: an ordered list of file-name patterns, the first of which
//! that matches the file's base name wins.
//!
//! # Example
//!
//! ```no_run
//! use daq_integtest::log_checks::{check_log_files, FileRuleMap, LogRule};
//!
//! let exclusions = FileRuleMap::compile(&[LogRule::new("log_.*_trigger", ["Unable to find"])])?;
//! let requirements = FileRuleMap::default();
//! let ok = check_log_files(&["run/log_trigger.txt"], true, &exclusions, &requirements)?;
//! # Ok::<(), daq_integtest::error::IntegtestError>(())
//! ```

mod classify;

pub use classify::{classify_line, LineClass, Severity, PROBLEM_KEYWORDS};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::data_file::base_name;
use crate::error::{compile_pattern, CheckResult, IntegtestError};

/// Result of checking one log file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCheckResult {
    /// No reported problems and every requirement was met.
    pub ok: bool,
    /// Bad lines suppressed by an exclusion.
    pub ignored_count: usize,
    /// Requirement patterns that never matched.
    pub missing_requirements: BTreeSet<String>,
    /// Reported problem lines, in file order.
    pub problems: Vec<String>,
}

/// One `{ file, patterns }` rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRule {
    /// Pattern matched against the log file's base name.
    pub file: String,
    /// Line patterns that apply to matching files.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl LogRule {
    /// Build a rule from a file pattern and its line patterns.
    pub fn new<I, S>(file: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            file: file.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered file-name pattern to line-pattern mapping.
#[derive(Debug, Clone, Default)]
pub struct FileRuleMap {
    rules: Vec<(Regex, Vec<Regex>)>,
}

impl FileRuleMap {
    /// Compile every file and line pattern, failing on the first bad one.
    pub fn compile(rules: &[LogRule]) -> CheckResult<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok((
                    compile_pattern(&rule.file)?,
                    compile_patterns(&rule.patterns)?,
                ))
            })
            .collect::<CheckResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Line patterns for `file_name`; empty when no file pattern matches.
    pub fn patterns_for(&self, file_name: &str) -> &[Regex] {
        self.rules
            .iter()
            .find(|(key, _)| key.is_match(file_name))
            .map(|(_, patterns)| patterns.as_slice())
            .unwrap_or(&[])
    }

    /// Number of file patterns.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Compile a list of patterns.
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> CheckResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| compile_pattern(p.as_ref()))
        .collect()
}

/// Check a single log file.
///
/// The file is decoded permissively, so invalid UTF-8 never fails the check.
/// When `print_filename_on_first_problem` is set, the file name is logged once
/// before its first problem line.
pub fn check_log_file(
    path: impl AsRef<Path>,
    exclusions: &[Regex],
    requireds: &[Regex],
    print_filename_on_first_problem: bool,
) -> CheckResult<LogCheckResult> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| IntegtestError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut result = LogCheckResult::default();
    let mut required_counts = vec![0usize; requireds.len()];

    for line in text.lines() {
        let mut is_required = false;
        for (count, pattern) in required_counts.iter_mut().zip(requireds) {
            if pattern.is_match(line) {
                *count += 1;
                is_required = true;
            }
        }
        if is_required || !classify_line(line).is_bad {
            continue;
        }
        if exclusions.iter().any(|e| e.is_match(line)) {
            result.ignored_count += 1;
            continue;
        }
        if result.problems.is_empty() && print_filename_on_first_problem {
            warn!(file = %path.display(), "problem(s) found in log file");
        }
        warn!(file = %path.display(), "{line}");
        result.problems.push(line.to_string());
    }

    if result.ignored_count > 0 {
        info!(
            file = %path.display(),
            ignored = result.ignored_count,
            "ignored problem lines matching exclusions"
        );
    }

    result.missing_requirements = required_counts
        .iter()
        .zip(requireds)
        .filter(|(count, _)| **count == 0)
        .map(|(_, pattern)| pattern.as_str().to_string())
        .collect();
    if !result.missing_requirements.is_empty() {
        warn!(
            file = %path.display(),
            missing = ?result.missing_requirements,
            "required messages not found in log file"
        );
    }

    result.ok = result.problems.is_empty() && result.missing_requirements.is_empty();
    debug!(file = %path.display(), ok = result.ok, "checked log file");
    Ok(result)
}

/// Check a set of log files, each against the rules its name selects.
///
/// With `show_all` false, evaluation stops at the first failing file.
pub fn check_log_files<P: AsRef<Path>>(
    paths: &[P],
    show_all: bool,
    exclusion_map: &FileRuleMap,
    required_map: &FileRuleMap,
) -> CheckResult<bool> {
    let mut all_ok = true;
    for path in paths {
        let path = path.as_ref();
        let name = base_name(path);
        let result = check_log_file(
            path,
            exclusion_map.patterns_for(&name),
            required_map.patterns_for(&name),
            true,
        )?;
        if !result.ok {
            all_ok = false;
            if !show_all {
                break;
            }
        }
    }
    if all_ok {
        info!(files = paths.len(), "log files are free of problems");
    }
    Ok(all_ok)
}

/// Check log files with no exclusions or requirements.
pub fn logs_are_error_free<P: AsRef<Path>>(paths: &[P]) -> CheckResult<bool> {
    check_log_files(paths, true, &FileRuleMap::default(), &FileRuleMap::default())
}
