//! Cross-run record-count regression checks.
//!
//! A scraper whose source silently changed format tends to return an empty
//! or partial list without raising. Comparing per-source counts against the
//! previous snapshot is the safety net for that. Both snapshots are explicit
//! arguments; nothing here reads hidden "previous run" state.

use crate::types::{ComplianceRecord, Source};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Health classification of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Result of checking one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub source: Source,
    pub status: HealthStatus,
    pub record_count: usize,
    pub previous_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Thresholds for [`check_record_counts`].
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// A source is critical when `new / previous` falls below this ratio.
    pub regression_ratio: f64,
    /// Baseline record counts per source from historical runs.
    pub expected_minimums: HashMap<Source, usize>,
    /// Baseline for sources without an explicit entry.
    pub default_minimum: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        let expected_minimums = HashMap::from([
            (Source::Nist, 100),
            (Source::Acvp, 50),
            (Source::CommonCriteria, 200),
            (Source::Anssi, 20),
            (Source::Bsi, 20),
            (Source::Enisa, 5),
        ]);
        Self {
            regression_ratio: 0.5,
            expected_minimums,
            default_minimum: 10,
        }
    }
}

impl HealthThresholds {
    pub fn minimum_for(&self, source: &Source) -> usize {
        self.expected_minimums
            .get(source)
            .copied()
            .unwrap_or(self.default_minimum)
    }
}

/// Count records per source, ordered by source name.
pub fn count_by_source(records: &[ComplianceRecord]) -> BTreeMap<Source, usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts.entry(r.source.clone()).or_insert(0) += 1;
    }
    counts
}

/// Compare the new snapshot against the previous one, per source.
///
/// Every source present in `current` gets a result; sources that had
/// records in `previous` but none now are reported as critical.
pub fn check_record_counts(
    current: &[ComplianceRecord],
    previous: &[ComplianceRecord],
    thresholds: &HealthThresholds,
) -> Vec<HealthCheckResult> {
    check_counts(&count_by_source(current), &count_by_source(previous), thresholds)
}

/// Same as [`check_record_counts`] but on pre-computed counts.
pub fn check_counts(
    current: &BTreeMap<Source, usize>,
    previous: &BTreeMap<Source, usize>,
    thresholds: &HealthThresholds,
) -> Vec<HealthCheckResult> {
    let mut results = Vec::new();

    for (source, &count) in current {
        let prev = previous.get(source).copied().unwrap_or(0);
        let expected = thresholds.minimum_for(source);

        let (status, message) = if count == 0 && prev > 0 {
            (
                HealthStatus::Critical,
                Some("Source returned 0 records (was present before)".to_string()),
            )
        } else if prev > 0 && (count as f64) / (prev as f64) < thresholds.regression_ratio {
            (
                HealthStatus::Critical,
                Some(format!("Record count dropped 50%+: {prev} → {count}")),
            )
        } else if count < expected {
            (
                HealthStatus::Warning,
                Some(format!("Below expected minimum ({expected}): got {count}")),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        results.push(HealthCheckResult {
            source: source.clone(),
            status,
            record_count: count,
            previous_count: prev,
            message,
        });
    }

    for (source, &prev) in previous {
        if prev > 0 && !current.contains_key(source) {
            results.push(HealthCheckResult {
                source: source.clone(),
                status: HealthStatus::Critical,
                record_count: 0,
                previous_count: prev,
                message: Some("Source returned 0 records (was present before)".to_string()),
            });
        }
    }

    results
}

/// Whether any source is critical. A critical result should block publishing.
pub fn has_critical(results: &[HealthCheckResult]) -> bool {
    results.iter().any(|r| r.status == HealthStatus::Critical)
}

/// Report results through `tracing`; returns [`has_critical`].
pub fn log_health_checks(results: &[HealthCheckResult]) -> bool {
    for r in results {
        let note = r.message.as_deref().unwrap_or("");
        match r.status {
            HealthStatus::Healthy => {
                tracing::info!("[Health] {}: {} records", r.source, r.record_count)
            }
            HealthStatus::Warning => {
                tracing::warn!("[Health] {}: {} records: {note}", r.source, r.record_count)
            }
            HealthStatus::Critical => {
                tracing::error!("[Health] {}: {} records: {note}", r.source, r.record_count)
            }
        }
    }
    has_critical(results)
}
