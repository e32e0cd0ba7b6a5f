//! Per-record and dataset-level quality checks.
//!
//! Errors make a record invalid; warnings flag it as suspect but usable.
//! Neither removes the record from the corpus; the caller decides.

use crate::types::{ComplianceRecord, UNKNOWN_VENDOR};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Tunable sanity bounds for the validator.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// "Today" for the future-date check.
    pub reference_date: NaiveDate,
    /// Days past `reference_date` still accepted without a warning.
    pub future_tolerance_days: i64,
    /// Product names shorter than this raise a warning.
    pub min_product_name_len: usize,
    /// How many invalid records are kept in [`DatasetSummary::details`].
    pub max_reported_invalid: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            reference_date: Utc::now().date_naive(),
            future_tolerance_days: 0,
            min_product_name_len: 3,
            max_reported_invalid: 10,
        }
    }
}

/// Outcome of validating one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Errors and warnings of one invalid record, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordIssues {
    pub id: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Aggregate validation counts for a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub valid: usize,
    pub invalid: usize,
    /// Records with at least one warning (valid or not).
    pub warnings: usize,
    /// The first `max_reported_invalid` invalid records.
    pub details: Vec<RecordIssues>,
}

impl DatasetSummary {
    pub fn total(&self) -> usize {
        self.valid + self.invalid
    }
}

/// Check a single record.
pub fn validate_record(record: &ComplianceRecord, config: &ValidationConfig) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if record.id.trim().is_empty() {
        errors.push("Missing ID".to_string());
    }
    if record.date.trim().is_empty() {
        errors.push("Missing date".to_string());
    }
    if record.source.is_empty() {
        errors.push("Missing source".to_string());
    }
    if record.record_type.is_empty() {
        errors.push("Missing type".to_string());
    }

    if !record.date.trim().is_empty() {
        check_date(&record.date, config, &mut errors, &mut warnings);
    }

    let name = record.product_name.trim();
    if name.is_empty() {
        warnings.push("Missing product name".to_string());
    } else if name.chars().count() < config.min_product_name_len {
        warnings.push(format!("Short product name: {name}"));
    }

    let vendor = record.vendor.trim();
    if vendor.is_empty() || vendor == UNKNOWN_VENDOR {
        warnings.push("Missing or unknown vendor".to_string());
    }

    if !record.link.is_empty() && !record.link.starts_with("http") {
        warnings.push(format!("Invalid link format: {}", record.link));
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_date(
    date: &str,
    config: &ValidationConfig,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let well_formed = date.len() == 10
        && date.char_indices().all(|(i, c)| match i {
            4 | 7 => c == '-',
            _ => c.is_ascii_digit(),
        });
    if !well_formed {
        errors.push(format!("Invalid date format: {date}"));
        return;
    }

    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Err(_) => errors.push(format!("Invalid date: {date}")),
        Ok(d) => {
            let limit = config.reference_date + Duration::days(config.future_tolerance_days);
            if d > limit {
                warnings.push(format!("Future date: {date}"));
            }
        }
    }
}

/// Validate every record and summarise.
pub fn validate_dataset(records: &[ComplianceRecord], config: &ValidationConfig) -> DatasetSummary {
    let mut summary = DatasetSummary::default();

    for record in records {
        let result = validate_record(record, config);
        if !result.warnings.is_empty() {
            summary.warnings += 1;
        }
        if result.valid {
            summary.valid += 1;
        } else {
            summary.invalid += 1;
            if summary.details.len() < config.max_reported_invalid {
                summary.details.push(RecordIssues {
                    id: record.id.clone(),
                    errors: result.errors,
                    warnings: result.warnings,
                });
            }
        }
    }

    summary
}

/// Report a summary through `tracing`.
pub fn log_summary(summary: &DatasetSummary) {
    tracing::info!(
        valid = summary.valid,
        invalid = summary.invalid,
        warned = summary.warnings,
        "[Validation] {} valid, {} invalid, {} with warnings",
        summary.valid,
        summary.invalid,
        summary.warnings
    );
    for d in &summary.details {
        tracing::warn!("[Validation] {}: {}", d.id, d.errors.join(", "));
    }
    if summary.invalid > summary.details.len() {
        tracing::warn!(
            "[Validation] ... and {} more invalid records",
            summary.invalid - summary.details.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CertificationType, Source};

    fn config() -> ValidationConfig {
        ValidationConfig {
            reference_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            ..Default::default()
        }
    }

    fn good_record() -> ComplianceRecord {
        ComplianceRecord {
            id: "cert-1".into(),
            source: Source::Nist,
            date: "2025-01-15".into(),
            link: "https://csrc.nist.gov/cert/1".into(),
            record_type: CertificationType::Fips1403,
            product_name: "Crypto Module".into(),
            vendor: "Acme Corp".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_good_record_is_clean() {
        let result = validate_record(&good_record(), &config());
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_date_is_error() {
        let record = ComplianceRecord {
            date: String::new(),
            ..good_record()
        };
        let result = validate_record(&record, &config());
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e == "Missing date"));
    }

    #[test]
    fn test_unknown_vendor_is_only_warning() {
        let record = ComplianceRecord {
            vendor: UNKNOWN_VENDOR.into(),
            ..good_record()
        };
        let result = validate_record(&record, &config());
        assert!(result.valid);
        assert_eq!(result.warnings, vec!["Missing or unknown vendor".to_string()]);
    }

    #[test]
    fn test_bad_dates() {
        let bad_format = ComplianceRecord {
            date: "03/15/2024".into(),
            ..good_record()
        };
        assert!(!validate_record(&bad_format, &config()).valid);

        let impossible = ComplianceRecord {
            date: "2024-02-30".into(),
            ..good_record()
        };
        let result = validate_record(&impossible, &config());
        assert_eq!(result.errors, vec!["Invalid date: 2024-02-30".to_string()]);

        let future = ComplianceRecord {
            date: "2025-07-01".into(),
            ..good_record()
        };
        let result = validate_record(&future, &config());
        assert!(result.valid);
        assert_eq!(result.warnings, vec!["Future date: 2025-07-01".to_string()]);
    }

    #[test]
    fn test_short_name_and_relative_link_warn() {
        let record = ComplianceRecord {
            product_name: "X1".into(),
            link: "/cert/1".into(),
            ..good_record()
        };
        let result = validate_record(&record, &config());
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_missing_source_and_type() {
        let record = ComplianceRecord {
            source: Source::default(),
            record_type: CertificationType::default(),
            ..good_record()
        };
        let result = validate_record(&record, &config());
        assert_eq!(result.errors, vec!["Missing source", "Missing type"]);
    }

    #[test]
    fn test_dataset_summary_caps_details() {
        let mut records = vec![good_record()];
        for i in 0..12 {
            records.push(ComplianceRecord {
                id: format!("bad-{i}"),
                date: String::new(),
                vendor: UNKNOWN_VENDOR.into(),
                ..good_record()
            });
        }
        let summary = validate_dataset(&records, &config());
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.invalid, 12);
        assert_eq!(summary.warnings, 12);
        assert_eq!(summary.details.len(), 10);
        assert_eq!(summary.details[0].id, "bad-0");
        assert_eq!(summary.total(), 13);
    }
}
