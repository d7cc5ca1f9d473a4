//! Configuration for the checks, loaded with Figment.
//!
//! Configuration is merged from:
//! 1. a TOML file
//! 2. environment variables prefixed with `INTEGTEST_`, with `__` separating
//!    nested keys (`INTEGTEST_APPLICATION__LOG_LEVEL=debug`)
//!
//! Every section is optional; an empty file gives a config that checks logs
//! with no exclusions and runs only the file-level data checks.
//!
//! # Example
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [log_checks]
//! show_all = true
//!
//! [[log_checks.exclusions]]
//! file = "log_.*_trigger"
//! patterns = ["Unable to find .* in the buffer"]
//!
//! [[log_checks.requirements]]
//! file = "log_.*_dfo"
//! patterns = ["Run \\d+ started"]
//!
//! [data_checks]
//! expected_record_count = 10
//! record_count_tolerance = 1
//!
//! [[data_checks.fragments]]
//! fragment_type_description = "WIB"
//! fragment_type = "WIBEth"
//! expected_fragment_count = 4
//! min_size_bytes = 7272
//! max_size_bytes = 14472
//! ```
//!
//! ```no_run
//! use daq_integtest::config::IntegtestConfig;
//!
//! let config = IntegtestConfig::load_from("integtest.toml")?;
//! config.validate()?;
//! # Ok::<(), daq_integtest::error::IntegtestError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CheckResult, IntegtestError};
use crate::log_checks::{FileRuleMap, LogRule};
use crate::params::FragmentTypeParams;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "INTEGTEST_";
/// Config file used by [`IntegtestConfig::load`].
pub const DEFAULT_CONFIG_PATH: &str = "integtest.toml";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegtestConfig {
    /// Application settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Log file rules.
    #[serde(default)]
    pub log_checks: LogChecksConfig,
    /// Data file expectations.
    #[serde(default)]
    pub data_checks: DataChecksConfig,
}

/// Application-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Log check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChecksConfig {
    /// Keep checking after the first failing file.
    #[serde(default = "default_true")]
    pub show_all: bool,
    /// Bad lines to tolerate, per file-name pattern.
    #[serde(default)]
    pub exclusions: Vec<LogRule>,
    /// Lines that must appear, per file-name pattern.
    #[serde(default)]
    pub requirements: Vec<LogRule>,
}

/// Data check configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChecksConfig {
    /// Run the one-header-per-record check.
    #[serde(default = "default_true")]
    pub sanity_check: bool,
    /// Run the file attribute check.
    #[serde(default = "default_true")]
    pub check_attributes: bool,
    /// Expected records per file; the count check is skipped when unset.
    #[serde(default)]
    pub expected_record_count: Option<u64>,
    /// Allowed deviation from `expected_record_count`.
    #[serde(default)]
    pub record_count_tolerance: u64,
    /// Per fragment type expectations.
    #[serde(default)]
    pub fragments: Vec<FragmentTypeParams>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for LogChecksConfig {
    fn default() -> Self {
        Self {
            show_all: true,
            exclusions: Vec::new(),
            requirements: Vec::new(),
        }
    }
}

impl Default for DataChecksConfig {
    fn default() -> Self {
        Self {
            sanity_check: true,
            check_attributes: true,
            expected_record_count: None,
            record_count_tolerance: 0,
            fragments: Vec::new(),
        }
    }
}

impl LogChecksConfig {
    /// Compiled exclusion rules.
    pub fn exclusion_map(&self) -> CheckResult<FileRuleMap> {
        FileRuleMap::compile(&self.exclusions)
    }

    /// Compiled requirement rules.
    pub fn requirement_map(&self) -> CheckResult<FileRuleMap> {
        FileRuleMap::compile(&self.requirements)
    }
}

impl IntegtestConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> CheckResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; the defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> CheckResult<Self> {
        Ok(Self::figment(Toml::file(path.as_ref())).extract()?)
    }

    /// Load from TOML text and the environment.
    pub fn from_toml_str(text: &str) -> CheckResult<Self> {
        Ok(Self::figment(Toml::string(text)).extract()?)
    }

    fn figment(toml: figment::providers::Data<Toml>) -> Figment {
        Figment::new()
            .merge(toml)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> CheckResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(IntegtestError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_FORMATS.contains(&format.as_str()) {
            return Err(IntegtestError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_FORMATS.join(", ")
            )));
        }

        self.log_checks.exclusion_map()?;
        self.log_checks.requirement_map()?;

        for params in &self.data_checks.fragments {
            if params.fragment_type.is_empty() {
                return Err(IntegtestError::Configuration(format!(
                    "Fragment entry '{}' has no fragment_type",
                    params.fragment_type_description
                )));
            }
        }

        Ok(())
    }
}
