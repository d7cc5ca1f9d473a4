//! Fragment-type parameters and the layered bound resolution.
//!
//! A [`FragmentTypeParams`] describes one fragment type to check and the counts,
//! sizes and error bits it is allowed to have. Each quantity can be given at three
//! levels that are applied in a fixed order:
//!
//! 1. flat top-level values (`expected_fragment_count`, `min_size_bytes`, ...)
//! 2. a table keyed by trigger-candidate type, with a `"default"` entry
//! 3. a table keyed by record ordinal ("first", "last", ...), with a `"default"`
//!    entry; only the first ordinal tag of a record is consulted
//!
//! Each level only overrides the fields it actually sets, and later levels win.
//! When nothing is configured the sentinel bounds ([`SENTINEL_MIN`],
//! [`SENTINEL_MAX`]) are returned; since min > max, every observed value fails.
//!
//! # Example
//!
//! ```toml
//! fragment_type_description = "WIB"
//! fragment_type = "WIBEth"
//! subdetector = "HD_TPC"
//! expected_fragment_count = 4
//! min_size_bytes = 7272
//! max_size_bytes = 14472
//!
//! [frag_counts_by_TC_type.kTiming]
//! min_count = 0
//! max_count = 0
//!
//! [frag_counts_by_record_ordinal.last]
//! min_count = 0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CheckResult;

/// Lower sentinel: larger than any plausible count or size.
pub const SENTINEL_MIN: u64 = 9_999_999;
/// Upper sentinel: smaller than [`SENTINEL_MIN`].
pub const SENTINEL_MAX: u64 = 0;
/// Default error mask: every error bit is a failure.
pub const ALL_ERROR_BITS: u32 = 0xFFFF_FFFF;
/// Fallback key in TC-type and ordinal tables.
pub const DEFAULT_KEY: &str = "default";

/// Debug mask bit: log resolved count limits per record.
pub const DEBUG_COUNT_LIMITS: u32 = 0x1;
/// Debug mask bit: log observed count per record.
pub const DEBUG_COUNT_VALUES: u32 = 0x2;
/// Debug mask bit: log resolved size limits per record.
pub const DEBUG_SIZE_LIMITS: u32 = 0x4;
/// Debug mask bit: log every fragment size.
pub const DEBUG_SIZE_VALUES: u32 = 0x8;

/// Inclusive `[min, max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// Smallest accepted value.
    pub min: u64,
    /// Largest accepted value.
    pub max: u64,
}

impl Bounds {
    /// Create a new range.
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Deliberately inverted range signalling missing configuration.
    pub fn sentinel() -> Self {
        Self::new(SENTINEL_MIN, SENTINEL_MAX)
    }

    /// Whether `value` lies within the range.
    pub fn contains(&self, value: u64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Whether the range still holds the sentinel values.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Partial count override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountOverride {
    /// Replaces the minimum when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<u64>,
    /// Replaces the maximum when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u64>,
}

/// Partial size override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeOverride {
    /// Replaces the minimum size when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size_bytes: Option<u64>,
    /// Replaces the maximum size when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
}

/// Partial error-bitmask override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmaskOverride {
    /// Replaces the mask when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_bitmask: Option<u32>,
}

trait ApplyTo<T> {
    fn apply_to(&self, target: &mut T);
}

impl ApplyTo<Bounds> for CountOverride {
    fn apply_to(&self, target: &mut Bounds) {
        if let Some(min) = self.min_count {
            target.min = min;
        }
        if let Some(max) = self.max_count {
            target.max = max;
        }
    }
}

impl ApplyTo<Bounds> for SizeOverride {
    fn apply_to(&self, target: &mut Bounds) {
        if let Some(min) = self.min_size_bytes {
            target.min = min;
        }
        if let Some(max) = self.max_size_bytes {
            target.max = max;
        }
    }
}

impl ApplyTo<u32> for BitmaskOverride {
    fn apply_to(&self, target: &mut u32) {
        if let Some(mask) = self.error_bitmask {
            *target = mask;
        }
    }
}

/// Description of one fragment type and the limits it must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentTypeParams {
    /// Human readable label used in diagnostics, e.g. "WIB" or "Raw TP".
    pub fragment_type_description: String,
    /// Fragment type name as stored in the data file, e.g. "WIBEth".
    pub fragment_type: String,
    /// Subsystem label, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hdf5_source_subsystem: Option<String>,
    /// Restrict lookups to this subdetector, e.g. "HD_TPC".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdetector: Option<String>,

    /// Flat expected count; sets both min and max.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_fragment_count: Option<u64>,
    /// Flat minimum fragment size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size_bytes: Option<u64>,
    /// Flat maximum fragment size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    /// Flat error mask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_bitmask: Option<u32>,

    /// Count overrides per TC type.
    #[serde(
        default,
        rename = "frag_counts_by_TC_type",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub counts_by_tc_type: BTreeMap<String, CountOverride>,
    /// Count overrides per record ordinal.
    #[serde(
        default,
        rename = "frag_counts_by_record_ordinal",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub counts_by_ordinal: BTreeMap<String, CountOverride>,
    /// Size overrides per TC type.
    #[serde(
        default,
        rename = "frag_sizes_by_TC_type",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub sizes_by_tc_type: BTreeMap<String, SizeOverride>,
    /// Size overrides per record ordinal.
    #[serde(
        default,
        rename = "frag_sizes_by_record_ordinal",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub sizes_by_ordinal: BTreeMap<String, SizeOverride>,
    /// Error-mask overrides per TC type.
    #[serde(
        default,
        rename = "frag_bitmasks_by_TC_type",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub bitmasks_by_tc_type: BTreeMap<String, BitmaskOverride>,
    /// Error-mask overrides per record ordinal.
    #[serde(
        default,
        rename = "frag_bitmasks_by_record_ordinal",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub bitmasks_by_ordinal: BTreeMap<String, BitmaskOverride>,

    /// Extra diagnostics, see the `DEBUG_*` constants.
    #[serde(default)]
    pub debug_mask: u32,
}

impl FragmentTypeParams {
    /// Params for a fragment type with no limits configured.
    pub fn new(description: impl Into<String>, fragment_type: impl Into<String>) -> Self {
        Self {
            fragment_type_description: description.into(),
            fragment_type: fragment_type.into(),
            ..Default::default()
        }
    }

    /// Parse params from a JSON object using the historical key names.
    pub fn from_json(text: &str) -> CheckResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether the given debug bit is enabled.
    pub fn debug(&self, bit: u32) -> bool {
        self.debug_mask & bit != 0
    }

    /// Whether no fragments of this type are expected at all.
    pub fn expects_no_fragments(&self) -> bool {
        self.expected_fragment_count == Some(0)
    }

    /// Resolve the allowed fragment count for one record.
    pub fn count_bounds(&self, tc_type: &str, ordinal_tags: &[String]) -> Bounds {
        let mut bounds = Bounds::sentinel();
        if let Some(count) = self.expected_fragment_count {
            bounds = Bounds::new(count, count);
        }
        layer(
            &mut bounds,
            &self.counts_by_tc_type,
            &self.counts_by_ordinal,
            tc_type,
            ordinal_tags,
        );
        bounds
    }

    /// Resolve the allowed fragment size for one record.
    pub fn size_bounds(&self, tc_type: &str, ordinal_tags: &[String]) -> Bounds {
        let mut bounds = Bounds::sentinel();
        if let Some(min) = self.min_size_bytes {
            bounds.min = min;
        }
        if let Some(max) = self.max_size_bytes {
            bounds.max = max;
        }
        layer(
            &mut bounds,
            &self.sizes_by_tc_type,
            &self.sizes_by_ordinal,
            tc_type,
            ordinal_tags,
        );
        bounds
    }

    /// Resolve the error mask for one record.
    pub fn error_bitmask(&self, tc_type: &str, ordinal_tags: &[String]) -> u32 {
        let mut mask = self.error_bitmask.unwrap_or(ALL_ERROR_BITS);
        layer(
            &mut mask,
            &self.bitmasks_by_tc_type,
            &self.bitmasks_by_ordinal,
            tc_type,
            ordinal_tags,
        );
        mask
    }
}

fn lookup<'a, O>(table: &'a BTreeMap<String, O>, key: &str) -> Option<&'a O> {
    table.get(key).or_else(|| table.get(DEFAULT_KEY))
}

fn layer<T, O: ApplyTo<T>>(
    target: &mut T,
    by_tc_type: &BTreeMap<String, O>,
    by_ordinal: &BTreeMap<String, O>,
    tc_type: &str,
    ordinal_tags: &[String],
) {
    if let Some(o) = lookup(by_tc_type, tc_type) {
        o.apply_to(target);
    }
    // Ordinal runs last so it wins over the TC type.
    if let Some(first_tag) = ordinal_tags.first() {
        if let Some(o) = lookup(by_ordinal, first_tag) {
            o.apply_to(target);
        }
    }
}

/// Resolve count bounds; see [`FragmentTypeParams::count_bounds`].
pub fn resolve_count_bounds(
    params: &FragmentTypeParams,
    tc_type: &str,
    ordinal_tags: &[String],
) -> Bounds {
    params.count_bounds(tc_type, ordinal_tags)
}

/// Resolve size bounds; see [`FragmentTypeParams::size_bounds`].
pub fn resolve_size_bounds(
    params: &FragmentTypeParams,
    tc_type: &str,
    ordinal_tags: &[String],
) -> Bounds {
    params.size_bounds(tc_type, ordinal_tags)
}

/// Resolve the error mask; see [`FragmentTypeParams::error_bitmask`].
pub fn resolve_error_bitmask(
    params: &FragmentTypeParams,
    tc_type: &str,
    ordinal_tags: &[String],
) -> u32 {
    params.error_bitmask(tc_type, ordinal_tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn count(min: Option<u64>, max: Option<u64>) -> CountOverride {
        CountOverride {
            min_count: min,
            max_count: max,
        }
    }

    #[test]
    fn unconfigured_params_resolve_to_sentinels() {
        let params = FragmentTypeParams::new("WIB", "WIBEth");
        let counts = params.count_bounds("kTiming", &tags(&["first"]));
        assert!(counts.is_sentinel());
        assert!(!counts.contains(0));
        assert!(!counts.contains(SENTINEL_MIN));
        assert!(params.size_bounds("kTiming", &[]).is_sentinel());
        assert_eq!(params.error_bitmask("kTiming", &[]), ALL_ERROR_BITS);
    }

    #[test]
    fn flat_values_set_the_baseline() {
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params.expected_fragment_count = Some(4);
        params.min_size_bytes = Some(100);
        params.max_size_bytes = Some(200);
        params.error_bitmask = Some(0x3);
        assert_eq!(params.count_bounds("kTiming", &[]), Bounds::new(4, 4));
        assert_eq!(params.size_bounds("kTiming", &[]), Bounds::new(100, 200));
        assert_eq!(params.error_bitmask("kTiming", &[]), 0x3);
    }

    #[test]
    fn ordinal_override_wins_over_tc_default() {
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params.expected_fragment_count = Some(1);
        params
            .counts_by_tc_type
            .insert(DEFAULT_KEY.to_string(), count(Some(2), Some(5)));
        params
            .counts_by_ordinal
            .insert("first".to_string(), count(None, Some(10)));

        let bounds = params.count_bounds("kSomethingElse", &tags(&["first"]));
        assert_eq!(bounds, Bounds::new(2, 10));
    }

    #[test]
    fn exact_tc_type_beats_default() {
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params
            .counts_by_tc_type
            .insert(DEFAULT_KEY.to_string(), count(Some(2), Some(2)));
        params
            .counts_by_tc_type
            .insert("kTiming".to_string(), count(Some(0), Some(0)));
        assert_eq!(params.count_bounds("kTiming", &[]), Bounds::new(0, 0));
        assert_eq!(params.count_bounds("kRandom", &[]), Bounds::new(2, 2));
    }

    #[test]
    fn only_first_ordinal_tag_is_consulted() {
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params.expected_fragment_count = Some(3);
        params
            .counts_by_ordinal
            .insert("last".to_string(), count(Some(0), None));
        // "penultimate" is first here, so the "last" entry is not used.
        let bounds = params.count_bounds("kTiming", &tags(&["penultimate", "last"]));
        assert_eq!(bounds, Bounds::new(3, 3));
        let bounds = params.count_bounds("kTiming", &tags(&["last", "ninth"]));
        assert_eq!(bounds, Bounds::new(0, 3));
    }

    #[test]
    fn empty_ordinal_tags_skip_the_ordinal_table() {
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params
            .counts_by_ordinal
            .insert(DEFAULT_KEY.to_string(), count(Some(1), Some(1)));
        assert!(params.count_bounds("kTiming", &[]).is_sentinel());
        assert_eq!(
            params.count_bounds("kTiming", &tags(&["third"])),
            Bounds::new(1, 1)
        );
    }

    #[test]
    fn size_and_bitmask_tables_layer_the_same_way() {
        let mut params = FragmentTypeParams::new("TP", "Trigger_Primitive");
        params.min_size_bytes = Some(72);
        params.max_size_bytes = Some(1000);
        params.sizes_by_tc_type.insert(
            "kRandom".to_string(),
            SizeOverride {
                min_size_bytes: None,
                max_size_bytes: Some(5000),
            },
        );
        params.sizes_by_ordinal.insert(
            DEFAULT_KEY.to_string(),
            SizeOverride {
                min_size_bytes: Some(80),
                max_size_bytes: None,
            },
        );
        params.bitmasks_by_tc_type.insert(
            DEFAULT_KEY.to_string(),
            BitmaskOverride {
                error_bitmask: Some(0x1),
            },
        );
        params.bitmasks_by_ordinal.insert(
            "last".to_string(),
            BitmaskOverride {
                error_bitmask: Some(0x0),
            },
        );

        assert_eq!(
            params.size_bounds("kRandom", &tags(&["second"])),
            Bounds::new(80, 5000)
        );
        assert_eq!(params.error_bitmask("kRandom", &tags(&["second"])), 0x1);
        assert_eq!(params.error_bitmask("kRandom", &tags(&["last", "fifth"])), 0x0);
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut params = FragmentTypeParams::new("WIB", "WIBEth");
        params.expected_fragment_count = Some(1);
        params
            .counts_by_tc_type
            .insert(DEFAULT_KEY.to_string(), count(Some(2), Some(5)));
        let before = params.clone();
        let first = resolve_count_bounds(&params, "kTiming", &tags(&["first"]));
        let second = resolve_count_bounds(&params, "kTiming", &tags(&["first"]));
        assert_eq!(first, second);
        assert_eq!(params, before);
    }

    #[test]
    fn parses_historical_json_keys() {
        let params = FragmentTypeParams::from_json(
            r#"{
                "fragment_type_description": "TC",
                "fragment_type": "Trigger_Candidate",
                "hdf5_source_subsystem": "Trigger",
                "expected_fragment_count": 1,
                "min_size_bytes": 72,
                "max_size_bytes": 216,
                "frag_counts_by_TC_type": {"kTiming": {"min_count": 1, "max_count": 2}},
                "frag_sizes_by_record_ordinal": {"default": {"max_size_bytes": 300}},
                "debug_mask": 3
            }"#,
        )
        .unwrap();
        assert_eq!(params.count_bounds("kTiming", &[]), Bounds::new(1, 2));
        assert_eq!(
            params.size_bounds("kTiming", &tags(&["first"])),
            Bounds::new(72, 300)
        );
        assert!(params.debug(DEBUG_COUNT_LIMITS));
        assert!(params.debug(DEBUG_COUNT_VALUES));
        assert!(!params.debug(DEBUG_SIZE_LIMITS));
    }

    #[test]
    fn parses_toml_tables() {
        let params: FragmentTypeParams = toml::from_str(
            r#"
            fragment_type_description = "WIB"
            fragment_type = "WIBEth"
            expected_fragment_count = 4

            [frag_counts_by_record_ordinal.last]
            min_count = 0
            "#,
        )
        .unwrap();
        assert_eq!(
            params.count_bounds("kTiming", &tags(&["last", "third"])),
            Bounds::new(0, 4)
        );
    }
}
