//! Vocabulary and date normalization.
//!
//! Both entry points fail soft: input that cannot be understood is passed
//! through unchanged instead of raising. Both are idempotent.

use crate::types::{ComplianceRecord, PqcCoverage, NO_PQC_DETECTED};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Legacy and alias names mapped to their standardized successors.
/// Keys are lower-case.
const CANONICAL_NAMES: &[(&str, &str)] = &[
    ("ml-kem", "ML-KEM"),
    ("ml-dsa", "ML-DSA"),
    ("slh-dsa", "SLH-DSA"),
    ("lms", "LMS"),
    ("xmss", "XMSS"),
    ("hss", "HSS"),
    ("sphincs+", "SPHINCS+"),
    ("falcon", "Falcon"),
    ("kyber", "ML-KEM"),
    ("crystals-kyber", "ML-KEM"),
    ("dilithium", "ML-DSA"),
    ("crystals-dilithium", "ML-DSA"),
    ("sphincs", "SPHINCS+"),
];

/// Date layouts tried after the ISO and slash forms.
const DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%b %d, %Y",
    "%b. %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d-%m-%Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("iso date pattern compiles"))
}

fn slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("slash date pattern compiles")
    })
}

fn dotted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").expect("dotted date pattern compiles")
    })
}

/// Convert a date string to `YYYY-MM-DD`.
///
/// Accepts ISO dates, US `MM/DD/YYYY` (falling back to `DD/MM/YYYY` when the
/// month would be out of range), European `DD.MM.YYYY`, RFC 3339/2822
/// timestamps and common written forms such as `March 15, 2024`. Anything
/// else is returned unchanged.
pub fn standardize_date(input: &str) -> String {
    let s = input.trim();
    if s.is_empty() {
        return input.to_string();
    }

    if iso_re().is_match(s) {
        return s.to_string();
    }

    parse_loose_date(s)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| input.to_string())
}

/// Parse a date in any layout [`standardize_date`] understands.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if iso_re().is_match(s) {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    }
    parse_loose_date(s)
}

fn parse_loose_date(s: &str) -> Option<NaiveDate> {
    if let Some(caps) = slash_re().captures(s) {
        let a: u32 = caps[1].parse().ok()?;
        let b: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, a, b).or_else(|| NaiveDate::from_ymd_opt(year, b, a));
    }

    if let Some(caps) = dotted_re().captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Canonicalize a comma-separated algorithm list.
///
/// Splits on top-level commas (parameter lists such as `RSA (2048, 3072)`
/// stay intact), trims, drops blanks and the sentinel, maps legacy names to
/// their standardized successors and removes case-insensitive duplicates.
/// An empty result yields [`NO_PQC_DETECTED`].
pub fn normalize_algorithm_list(input: &str) -> String {
    let parts = canonical_parts(input, true);
    if parts.is_empty() {
        NO_PQC_DETECTED.to_string()
    } else {
        parts.join(", ")
    }
}

/// [`normalize_algorithm_list`] lifted over [`PqcCoverage`]; flags pass through.
pub fn normalize_coverage(coverage: &PqcCoverage) -> PqcCoverage {
    match coverage {
        PqcCoverage::Flag(flag) => PqcCoverage::Flag(*flag),
        PqcCoverage::Algorithms(list) => PqcCoverage::Algorithms(normalize_algorithm_list(list)),
    }
}

/// Clean a classical-algorithm summary. Blank input becomes `None`.
pub fn normalize_classical_list(input: Option<&str>) -> Option<String> {
    let parts = canonical_parts(input?, false);
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Re-canonicalize the date and algorithm fields of a record.
pub fn normalize_record(record: &ComplianceRecord) -> ComplianceRecord {
    ComplianceRecord {
        date: standardize_date(&record.date),
        pqc_coverage: normalize_coverage(&record.pqc_coverage),
        classical_algorithms: normalize_classical_list(record.classical_algorithms.as_deref()),
        ..record.clone()
    }
}

fn canonical_parts(input: &str, map_names: bool) -> Vec<String> {
    let mut seen = HashSet::new();
    split_top_level(input)
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != NO_PQC_DETECTED && *p != "-")
        .map(|p| {
            if map_names {
                canonical_name(p)
            } else {
                p.to_string()
            }
        })
        .filter(|p| seen.insert(p.to_lowercase()))
        .collect()
}

fn canonical_name(name: &str) -> String {
    let lower = name.to_lowercase();
    CANONICAL_NAMES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Split on commas that are not inside `(...)` or `[...]`.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}
