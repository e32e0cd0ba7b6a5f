//! PQC compliance corpus: record model, algorithm extraction, normalization, validation and health checks.

pub mod dataset;
pub mod error;
pub mod extraction;
pub mod health;
pub mod normalize;
pub mod types;
pub mod validation;

pub use dataset::{load_dataset, load_dataset_or_empty, save_dataset};
pub use error::{ComplianceError, ComplianceResult};
pub use extraction::{
    classical_patterns, extract_algorithms, extract_lab_from_text, pqc_patterns, PatternSet,
};
pub use health::{check_record_counts, has_critical, HealthCheckResult, HealthStatus, HealthThresholds};
pub use normalize::{normalize_algorithm_list, normalize_record, standardize_date};
pub use types::*;
pub use validation::{validate_dataset, validate_record, DatasetSummary, ValidationConfig, ValidationResult};
