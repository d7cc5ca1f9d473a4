//! Positional descriptors for records within a data file.
//!
//! Hand-written test configurations refer to records by position ("apply these
//! bounds to the first and last record") rather than by id. [`ordinal_tags`]
//! turns a record id into those descriptors, and [`ordinal_word`] spells out the
//! plain positional word for any index.
//!
//! The placement of `"last"` and `"penultimate"` relative to the positional word
//! is asymmetric; only the first tag is used by the parameter lookup, so the
//! order is part of the contract and is reproduced exactly.

const UNITS: [&str; 20] = [
    "zero",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [&str; 7] = [
    "",
    "thousand",
    "million",
    "billion",
    "trillion",
    "quadrillion",
    "quintillion",
];

/// Tag for the last record of a file.
pub const LAST: &str = "last";
/// Tag for the second-to-last record of a file.
pub const PENULTIMATE: &str = "penultimate";

/// Compute the ordinal tags of `record_id` within `all_record_ids`.
///
/// Returns an empty vector when the id is not in the list; a missing record is
/// an expected outcome that simply disables ordinal-keyed overrides.
///
/// ```
/// use daq_integtest::ordinal::ordinal_tags;
///
/// assert_eq!(ordinal_tags(&999, &[999]), vec!["first", "last"]);
/// assert_eq!(ordinal_tags(&999, &[888, 999]), vec!["last", "second"]);
/// assert!(ordinal_tags(&123, &[888, 999]).is_empty());
/// ```
pub fn ordinal_tags<T: PartialEq>(record_id: &T, all_record_ids: &[T]) -> Vec<String> {
    let Some(index) = all_record_ids.iter().position(|id| id == record_id) else {
        return Vec::new();
    };
    let len = all_record_ids.len();

    let mut tags = vec![ordinal_word(index as u64 + 1)];

    if index == len - 1 {
        if index != 0 {
            tags.insert(0, LAST.to_string());
        } else {
            tags.push(LAST.to_string());
        }
    }

    if len > 1 && index == len - 2 {
        if index >= 2 {
            tags.insert(0, PENULTIMATE.to_string());
        } else {
            tags.push(PENULTIMATE.to_string());
        }
    }

    tags
}

/// Spell out `n` as an English ordinal word ("first", "twenty-second", ...).
///
/// Zero is spelled "zeroth".
pub fn ordinal_word(n: u64) -> String {
    let cardinal = cardinal_word(n);
    // Only the final word changes form.
    let split = cardinal.rfind([' ', '-']).map_or(0, |pos| pos + 1);
    let (head, last) = cardinal.split_at(split);
    format!("{head}{}", ordinalize(last))
}

fn ordinalize(word: &str) -> String {
    match word {
        "one" => "first".to_string(),
        "two" => "second".to_string(),
        "three" => "third".to_string(),
        "five" => "fifth".to_string(),
        "eight" => "eighth".to_string(),
        "nine" => "ninth".to_string(),
        "twelve" => "twelfth".to_string(),
        w if w.ends_with('y') => format!("{}ieth", &w[..w.len() - 1]),
        w => format!("{w}th"),
    }
}

/// Spell out `n` as an English cardinal ("one hundred and one").
pub fn cardinal_word(n: u64) -> String {
    if n == 0 {
        return UNITS[0].to_string();
    }

    let mut groups = Vec::new();
    let mut rest = n;
    while rest > 0 {
        groups.push((rest % 1000) as usize);
        rest /= 1000;
    }

    let mut parts: Vec<String> = Vec::new();
    for (scale, &group) in groups.iter().enumerate().rev() {
        if group == 0 {
            continue;
        }
        let mut words = below_thousand(group);
        if scale > 0 {
            words = format!("{words} {}", SCALES[scale]);
        } else if group < 100 && !parts.is_empty() {
            words = format!("and {words}");
        }
        parts.push(words);
    }

    // "one thousand and one", but "one thousand, two hundred"
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(if part.starts_with("and ") { " " } else { ", " });
        }
        out.push_str(part);
    }
    out
}

fn below_thousand(n: usize) -> String {
    let hundreds = n / 100;
    let rest = n % 100;
    match (hundreds, rest) {
        (0, r) => below_hundred(r),
        (h, 0) => format!("{} hundred", UNITS[h]),
        (h, r) => format!("{} hundred and {}", UNITS[h], below_hundred(r)),
    }
}

fn below_hundred(n: usize) -> String {
    if n < 20 {
        UNITS[n].to_string()
    } else if n % 10 == 0 {
        TENS[n / 10].to_string()
    } else {
        format!("{}-{}", TENS[n / 10], UNITS[n % 10])
    }
}
