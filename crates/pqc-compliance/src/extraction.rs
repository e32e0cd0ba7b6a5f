//! Free-text algorithm extraction.
//!
//! Two pattern families are supported:
//!
//! * **Simple**: an ordered list of regexes, one per PQC family. The output
//!   is the de-duplicated union of every matched substring. PQC mentions are
//!   usually unparameterized ("ML-KEM" on its own), so nothing is aggregated.
//! * **Detailed**: `(name, pattern)` pairs whose first capture group holds a
//!   parameter such as a key length or curve. The output groups the distinct
//!   parameters per family: `RSA (2048, 3072), ECDSA (P-256)`.
//!
//! The built-in pattern sets are compiled once and shared through
//! [`pqc_patterns`] and [`classical_patterns`].

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Marker recorded for a detailed-family match without a captured parameter.
const DETECTED: &str = "Detected";

/// Longest lab name kept from free text.
const MAX_LAB_LEN: usize = 100;

const PQC_PATTERN_SOURCES: &[&str] = &[
    r"(?i)\bML-KEM\b\s*(\[.*?\])?",
    r"(?i)\bML-DSA\b\s*(\[.*?\])?",
    r"(?i)\bSLH-DSA\b\s*(\[.*?\])?",
    r"(?i)\bLMS\b\s*(\[.*?\])?",
    r"(?i)\bXMSS\b\s*(\[.*?\])?",
    r"(?i)\bFalcon\b\s*(\[.*?\])?",
    r"(?i)\bSPHINCS\+\s*(\[.*?\])?",
    r"(?i)\bHSS\b\s*(\[.*?\])?",
];

const CLASSICAL_PATTERN_SOURCES: &[(&str, &str)] = &[
    ("RSA", r"(?i)RSA\D{0,10}(\d{3,4})"),
    ("RSA", r"(?i)RSA-PSS\D{0,10}(\d{3,4})"),
    ("RSA", r"(?i)RSA-PKCS1\D{0,10}(\d{3,4})"),
    ("ECDSA", r"(?i)ECDSA\D{0,20}(P-\d{3}|BrainpoolP\w+|secp\w+)"),
    ("ECDSA", r"(?i)(P-(?:256|384|521))"),
    ("ECDH", r"(?i)ECDH\D{0,10}(P-\d{3}|BrainpoolP\w+|secp\w+)"),
    ("EdDSA", r"(?i)Ed(25519|448)"),
    ("X25519", r"(?i)X(25519|448)"),
    // Generic fallbacks without a parameter.
    ("RSA", r"(?i)\bRSA\b"),
    ("ECDSA", r"(?i)\bECDSA\b"),
    ("ECDH", r"(?i)\bECDH\b"),
];

const KNOWN_LABS: &[&str] = &[
    "atsec information security",
    "Brightsight",
    "SGS Brightsight",
    "TÜV Informationstechnik",
    "TÜViT",
    "Trusted Labs",
    "Applus",
    "SGS",
    "SERMA",
    "Riscure",
    "Acumen Security",
    "Leidos",
    "Gossamer",
    "CygnaCom",
    "secunet",
    "Thales",
    "CEA-LETI",
    "CEA - LETI",
    "Oppida",
    "Amossys",
];

/// Words allowed inside a capitalized organisation name.
const NAME_CONNECTORS: &[&str] = &["&", "-", "+", "and", "und", "de", "du", "of"];

/// A detailed-family pattern: `pattern`'s first group captures the parameter.
#[derive(Debug, Clone)]
pub struct NamedPattern {
    pub name: String,
    pub pattern: Regex,
}

/// A set of patterns handed to [`extract_algorithms`].
#[derive(Debug, Clone)]
pub enum PatternSet {
    Simple(Vec<Regex>),
    Detailed(Vec<NamedPattern>),
}

impl PatternSet {
    /// Compile a simple-family set.
    pub fn simple(sources: &[&str]) -> Result<Self, regex::Error> {
        let patterns = sources
            .iter()
            .map(|s| Regex::new(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PatternSet::Simple(patterns))
    }

    /// Compile a detailed-family set from `(name, pattern)` pairs.
    pub fn detailed(sources: &[(&str, &str)]) -> Result<Self, regex::Error> {
        let patterns = sources
            .iter()
            .map(|(name, src)| {
                Ok(NamedPattern {
                    name: (*name).to_string(),
                    pattern: Regex::new(src)?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(PatternSet::Detailed(patterns))
    }
}

/// Built-in PQC pattern set (simple family).
pub fn pqc_patterns() -> &'static PatternSet {
    static SET: OnceLock<PatternSet> = OnceLock::new();
    SET.get_or_init(|| PatternSet::simple(PQC_PATTERN_SOURCES).expect("PQC patterns compile"))
}

/// Built-in classical pattern set (detailed family).
pub fn classical_patterns() -> &'static PatternSet {
    static SET: OnceLock<PatternSet> = OnceLock::new();
    SET.get_or_init(|| {
        PatternSet::detailed(CLASSICAL_PATTERN_SOURCES).expect("classical patterns compile")
    })
}

/// Produce a canonical, human-readable summary of the algorithms in `text`.
///
/// Returns an empty string when nothing matches; callers map that to the
/// sentinel with [`crate::PqcCoverage::from_extraction`].
pub fn extract_algorithms(text: &str, patterns: &PatternSet) -> String {
    match patterns {
        PatternSet::Simple(regexes) => extract_simple(text, regexes),
        PatternSet::Detailed(named) => extract_detailed(text, named),
    }
}

fn extract_simple(text: &str, regexes: &[Regex]) -> String {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for re in regexes {
        for m in re.find_iter(text) {
            let value = m.as_str().trim();
            if !value.is_empty() && seen.insert(value.to_string()) {
                found.push(value.to_string());
            }
        }
    }
    found.join(", ")
}

fn extract_detailed(text: &str, named: &[NamedPattern]) -> String {
    // Families keep the order in which they were first seen.
    let mut findings: Vec<(String, Vec<String>)> = Vec::new();

    for p in named {
        for caps in p.pattern.captures_iter(text) {
            let value = caps
                .get(1)
                .map(|g| g.as_str().trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DETECTED.to_string());

            let idx = match findings.iter().position(|(name, _)| name == &p.name) {
                Some(idx) => idx,
                None => {
                    findings.push((p.name.clone(), Vec::new()));
                    findings.len() - 1
                }
            };
            let values = &mut findings[idx].1;
            if !values.contains(&value) {
                values.push(value);
            }
        }
    }

    findings
        .into_iter()
        .map(|(name, values)| {
            let mut specific: Vec<String> = values.into_iter().filter(|v| v != DETECTED).collect();
            if specific.is_empty() {
                name
            } else {
                specific.sort_by(|a, b| parameter_key(a).cmp(&parameter_key(b)));
                format!("{name} ({})", specific.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Numeric parameters sort ascending before everything else, the rest lexically.
fn parameter_key(value: &str) -> (u8, u64, &str) {
    match value.parse::<u64>() {
        Ok(n) if value.bytes().all(|b| b.is_ascii_digit()) => (0, n, ""),
        _ => (1, 0, value),
    }
}

/// Find the evaluation facility (lab/ITSEF) named in a document.
///
/// Tries explicit facility labels first (English and French), then
/// "conducted by"-style phrases, then a whitelist of well-known labs.
pub fn extract_lab_from_text(text: &str) -> Option<String> {
    static PRIMARY: OnceLock<Regex> = OnceLock::new();
    static SECONDARY: OnceLock<Regex> = OnceLock::new();

    let primary = PRIMARY.get_or_init(|| {
        Regex::new(
            r"(?i)(?:ITSEF|Evaluation\s+Facility|Evaluation\s+Laboratory|Testing\s+Laboratory|Evaluation\s+Body|Commercial\s+Facility|Evaluated\s+by|Centre\s+d\W?\s*évaluation|Laboratoire\s+d\W?\s*évaluation)[\s:]+",
        )
        .expect("lab label pattern compiles")
    });
    let secondary = SECONDARY.get_or_init(|| {
        Regex::new(
            r"(?i)(?:Testing\s+was\s+completed\s+by|conducted\s+by|performed\s+by|évalué\s+par|réalisé\s+par)[\s:]+",
        )
        .expect("lab phrase pattern compiles")
    });

    for re in [primary, secondary] {
        for m in re.find_iter(text) {
            // The label may sit on its own line; the name ends with its line.
            let line = text[m.end()..].trim_start().lines().next().unwrap_or("");
            if let Some(name) = capitalized_name(line) {
                return Some(name);
            }
        }
    }

    KNOWN_LABS
        .iter()
        .find(|lab| text.contains(*lab))
        .map(|lab| (*lab).to_string())
}

/// Take the run of capitalized words (plus connectors) at the start of a line.
fn capitalized_name(text: &str) -> Option<String> {
    let mut words = Vec::new();
    for word in text.split_whitespace() {
        let starts_upper = word
            .chars()
            .next()
            .map(|c| c.is_uppercase() || c.is_ascii_digit())
            .unwrap_or(false);
        let connector = !words.is_empty() && NAME_CONNECTORS.contains(&word);
        if !(starts_upper || connector) {
            break;
        }
        words.push(word);
        if word.ends_with([',', ';']) || words.len() >= 8 {
            break;
        }
    }

    while words.last().is_some_and(|w| NAME_CONNECTORS.contains(w)) {
        words.pop();
    }
    if words.is_empty() {
        return None;
    }

    let mut name = words.join(" ");
    name = name.trim_end_matches([',', ';', ':']).trim().to_string();
    if name.chars().count() > MAX_LAB_LEN {
        name = name.chars().take(MAX_LAB_LEN).collect();
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pqc_simple_union() {
        let text = "Supports ML-KEM [512, 768] and ML-DSA. Also ML-KEM [512, 768] again, plus LMS.";
        let out = extract_algorithms(text, pqc_patterns());
        assert_eq!(out, "ML-KEM [512, 768], ML-DSA, LMS");
    }

    #[test]
    fn test_pqc_no_match_inside_words() {
        let text = "Films and algorithms are not hash-based signatures.";
        assert_eq!(extract_algorithms(text, pqc_patterns()), "");
    }

    #[test]
    fn test_classical_rsa_sorted_numerically() {
        let text = "Keys: RSA 3072 for signing, RSA 2048 for transport.";
        let out = extract_algorithms(text, classical_patterns());
        assert_eq!(out, "RSA (2048, 3072)");
    }

    #[test]
    fn test_classical_generic_collapses_to_name() {
        let text = "The module implements ECDH key agreement.";
        assert_eq!(extract_algorithms(text, classical_patterns()), "ECDH");
    }

    #[test]
    fn test_classical_curves_and_families() {
        let text = "ECDSA P-384 and ECDSA P-256, Ed25519 signatures, RSA-2048.";
        let out = extract_algorithms(text, classical_patterns());
        assert_eq!(out, "RSA (2048), ECDSA (P-256, P-384), EdDSA (25519)");
    }

    #[test]
    fn test_detailed_custom_set() {
        let set = PatternSet::detailed(&[("AES", r"AES-(\d{3})"), ("AES", r"\bAES\b")]).unwrap();
        assert_eq!(extract_algorithms("AES-256 AES-128 AES", &set), "AES (128, 256)");
        assert_eq!(extract_algorithms("only AES here", &set), "AES");
    }

    #[test]
    fn test_parameter_key_orders_numbers_first() {
        let mut values = vec!["secp256k1", "521", "P-256", "384"];
        values.sort_by(|a, b| parameter_key(a).cmp(&parameter_key(b)));
        assert_eq!(values, vec!["384", "521", "P-256", "secp256k1"]);
    }

    #[test]
    fn test_lab_from_itsef_label() {
        let text = "ITSEF: Brightsight B.V. conducted the evaluation";
        assert_eq!(extract_lab_from_text(text).as_deref(), Some("Brightsight B.V."));
    }

    #[test]
    fn test_lab_from_facility_label() {
        let text = "Evaluation Facility: Acumen Security performed testing";
        assert_eq!(extract_lab_from_text(text).as_deref(), Some("Acumen Security"));
    }

    #[test]
    fn test_lab_french_label() {
        let text = "Centre d'évaluation : SERMA Safety & Security\nCommanditaire";
        assert_eq!(
            extract_lab_from_text(text).as_deref(),
            Some("SERMA Safety & Security")
        );
    }

    #[test]
    fn test_lab_known_list_fallback() {
        let text = "This product was evaluated by atsec information security.";
        assert_eq!(
            extract_lab_from_text(text).as_deref(),
            Some("atsec information security")
        );
    }

    #[test]
    fn test_lab_none() {
        assert_eq!(extract_lab_from_text("No lab info here"), None);
    }
}
