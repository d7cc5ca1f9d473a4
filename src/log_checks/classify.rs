//! Per-line classification.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `2024-Jan-05 10:00:00,000 ERROR ...`
#[allow(clippy::expect_used)]
static STRUCTURED_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d{4}-[A-Za-z]{3}-\d{1,2}\s+\d{1,2}:\d{2}:\d{2}(?:[,.]\d+)?\s+([A-Z]+)\b")
        .expect("valid regex")
});

/// Substrings that mark an unstructured line as bad, matched case-insensitively.
pub const PROBLEM_KEYWORDS: [&str; 4] = ["warn", "error", "fatal", "segmentation fault"];

/// Severity word of a structured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// `DEBUG`
    Debug,
    /// `INFO`
    Info,
    /// `WARNING` or `WARN`
    Warning,
    /// `ERROR`
    Error,
    /// `FATAL`
    Fatal,
    /// Any other uppercase word in the severity position.
    Unknown,
}

impl Severity {
    /// Parse the uppercase severity word.
    pub fn parse(word: &str) -> Self {
        match word {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARNING" | "WARN" => Self::Warning,
            "ERROR" => Self::Error,
            "FATAL" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Whether lines at this severity count as problems.
    pub fn is_bad(self) -> bool {
        matches!(self, Self::Warning | Self::Error | Self::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Outcome of classifying one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineClass {
    /// The line starts with a date, time and severity word.
    pub structured: bool,
    /// Parsed severity, only for structured lines.
    pub severity: Option<Severity>,
    /// The line reports a problem.
    pub is_bad: bool,
}

/// Classify a single log line.
///
/// Structured lines are judged by their severity alone, so an `INFO` line that
/// mentions "error" is clean. Anything else falls back to a keyword search.
pub fn classify_line(line: &str) -> LineClass {
    if let Some(caps) = STRUCTURED_PREFIX.captures(line) {
        let severity = caps
            .get(1)
            .map_or(Severity::Unknown, |m| Severity::parse(m.as_str()));
        return LineClass {
            structured: true,
            severity: Some(severity),
            is_bad: severity.is_bad(),
        };
    }

    let lower = line.to_lowercase();
    LineClass {
        structured: false,
        severity: None,
        is_bad: PROBLEM_KEYWORDS.iter().any(|k| lower.contains(k)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_line_is_bad() {
        let class = classify_line("2024-Jan-05 10:00:00,000 ERROR something broke");
        assert_eq!(
            class,
            LineClass {
                structured: true,
                severity: Some(Severity::Error),
                is_bad: true,
            }
        );
    }

    #[test]
    fn warn_and_warning_are_equivalent() {
        let warn = classify_line("2024-Feb-29 23:59:59,999 WARN queue is filling up");
        let warning = classify_line("2024-Feb-29 23:59:59,999 WARNING queue is filling up");
        assert_eq!(warn.severity, Some(Severity::Warning));
        assert_eq!(warn, warning);
        assert!(warn.is_bad);
    }

    #[test]
    fn structured_info_line_ignores_keywords() {
        let class = classify_line("2024-Jan-05 10:00:00,000 INFO error counter reset to 0");
        assert!(class.structured);
        assert_eq!(class.severity, Some(Severity::Info));
        assert!(!class.is_bad);
    }

    #[test]
    fn unrecognised_severity_word_is_clean() {
        let class = classify_line("2024-Jan-05 10:00:00,000 LOG fatal-looking text");
        assert_eq!(class.severity, Some(Severity::Unknown));
        assert!(!class.is_bad);
    }

    #[test]
    fn unstructured_lines_use_keywords() {
        for line in [
            "Segmentation fault (core dumped)",
            "some Warning here",
            "FATAL: cannot bind",
            "terminate called after throwing an instance of std::runtime_error",
        ] {
            let class = classify_line(line);
            assert!(!class.structured, "{line}");
            assert_eq!(class.severity, None);
            assert!(class.is_bad, "{line}");
        }
        assert!(!classify_line("Run 101 started").is_bad);
        assert!(!classify_line("").is_bad);
    }

    #[test]
    fn lowercase_severity_is_not_structured() {
        let class = classify_line("2024-Jan-05 10:00:00,000 error lowercase");
        assert!(!class.structured);
        assert!(class.is_bad);
    }
}
