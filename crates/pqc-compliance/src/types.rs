//! Core data types for the unified compliance corpus.
//!
//! Field names and the sentinel strings below are part of the wire contract
//! with the dashboard that reads `compliance-data.json`. Renaming any of them
//! requires a matching change on the consumer side.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel stored in `pqcCoverage` when no PQC algorithm was found.
pub const NO_PQC_DETECTED: &str = "No PQC Mechanisms Detected";

/// Sentinel stored in `vendor` when the vendor could not be extracted.
pub const UNKNOWN_VENDOR: &str = "Unknown Vendor";

/// Lifecycle state written by every scraper.
pub const STATUS_ACTIVE: &str = "Active";

/// Heuristic marker for records whose product name suggests PQC support.
pub const POTENTIALLY_PQC: &str = "Potentially PQC";

/// Heuristic marker used when only the module name mentions PQC.
pub const POTENTIALLY_PQC_NAME_MATCH: &str = "Potentially PQC (Name Match)";

/// Origin of a record.
///
/// Unknown tags read back from an older corpus are kept verbatim in
/// [`Source::Other`] so a round trip never loses data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    /// NIST CMVP (FIPS 140-3 module validations).
    Nist,
    /// NIST CAVP/ACVP algorithm validations.
    Acvp,
    /// Common Criteria portal bulk feed.
    CommonCriteria,
    /// French national scheme.
    Anssi,
    /// German national scheme.
    Bsi,
    /// EU cybersecurity certification scheme.
    Enisa,
    Other(String),
}

impl Source {
    /// Every source the runtime knows how to scrape, in pipeline order.
    pub const KNOWN: [Source; 6] = [
        Source::Nist,
        Source::Acvp,
        Source::CommonCriteria,
        Source::Anssi,
        Source::Bsi,
        Source::Enisa,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Source::Nist => "NIST",
            Source::Acvp => "ACVP",
            Source::CommonCriteria => "Common Criteria",
            Source::Anssi => "ANSSI",
            Source::Bsi => "BSI",
            Source::Enisa => "ENISA",
            Source::Other(s) => s,
        }
    }

    /// Short tag used as a log prefix and cache key.
    pub fn tag(&self) -> String {
        match self {
            Source::CommonCriteria => "CC".to_string(),
            other => other.as_str().to_ascii_uppercase().replace(' ', "_"),
        }
    }

    /// Whether the tag is empty (only possible for records read from disk).
    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl Default for Source {
    fn default() -> Self {
        Source::Other(String::new())
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        match value.as_str() {
            "NIST" => Source::Nist,
            "ACVP" => Source::Acvp,
            "Common Criteria" => Source::CommonCriteria,
            "ANSSI" => Source::Anssi,
            "BSI" => Source::Bsi,
            "ENISA" => Source::Enisa,
            _ => Source::Other(value),
        }
    }
}

impl From<Source> for String {
    fn from(value: Source) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certification scheme identifier (the `type` field).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CertificationType {
    Fips1403,
    Acvp,
    CommonCriteria,
    Eucc,
    Other(String),
}

impl CertificationType {
    pub fn as_str(&self) -> &str {
        match self {
            CertificationType::Fips1403 => "FIPS 140-3",
            CertificationType::Acvp => "ACVP",
            CertificationType::CommonCriteria => "Common Criteria",
            CertificationType::Eucc => "EUCC",
            CertificationType::Other(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl Default for CertificationType {
    fn default() -> Self {
        CertificationType::Other(String::new())
    }
}

impl From<String> for CertificationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "FIPS 140-3" => CertificationType::Fips1403,
            "ACVP" => CertificationType::Acvp,
            "Common Criteria" => CertificationType::CommonCriteria,
            "EUCC" => CertificationType::Eucc,
            _ => CertificationType::Other(value),
        }
    }
}

impl From<CertificationType> for String {
    fn from(value: CertificationType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for CertificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PQC coverage of a product: either a plain flag or a canonical list.
///
/// Never holds an empty string once it has gone through
/// [`PqcCoverage::from_extraction`] or normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PqcCoverage {
    Flag(bool),
    Algorithms(String),
}

impl PqcCoverage {
    /// The "none detected" sentinel.
    pub fn none() -> Self {
        PqcCoverage::Algorithms(NO_PQC_DETECTED.to_string())
    }

    /// Wrap an extraction result, mapping an empty summary to the sentinel.
    pub fn from_extraction(summary: String) -> Self {
        if summary.trim().is_empty() {
            Self::none()
        } else {
            PqcCoverage::Algorithms(summary)
        }
    }

    /// Whether any PQC mechanism (or a heuristic hint of one) is recorded.
    pub fn is_detected(&self) -> bool {
        match self {
            PqcCoverage::Flag(flag) => *flag,
            PqcCoverage::Algorithms(s) => !s.is_empty() && s != NO_PQC_DETECTED,
        }
    }

    /// Whether the value is one of the name-based heuristic markers.
    pub fn is_heuristic(&self) -> bool {
        matches!(self, PqcCoverage::Algorithms(s) if s.starts_with(POTENTIALLY_PQC))
    }
}

impl Default for PqcCoverage {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for PqcCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PqcCoverage::Flag(flag) => write!(f, "{flag}"),
            PqcCoverage::Algorithms(s) => f.write_str(s),
        }
    }
}

/// A supplementary document that is neither a report nor a security target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub name: String,
    pub url: String,
}

/// One certified product as published in the unified corpus.
///
/// Constructed once per scraper pass and not mutated after it is appended to
/// a scraper's output. Every field defaults on deserialization so that a
/// damaged corpus still loads and the validator can report what is missing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: Source,
    /// Certification or validation date, `YYYY-MM-DD` after normalization.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub link: String,
    #[serde(rename = "type", default)]
    pub record_type: CertificationType,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub pqc_coverage: PqcCoverage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classical_algorithms: Option<String>,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub product_category: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_report_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_target_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_documents: Option<Vec<DocumentRef>>,
}

/// Turn an empty vector into `None` so optional list fields stay absent.
pub fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Turn a blank string into `None`.
pub fn non_blank(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.trim().is_empty() {
        None
    } else {
        Some(value.trim().to_string())
    }
}
