/// Errors that can occur while reading or writing the corpus.
#[derive(thiserror::Error, Debug)]
pub enum ComplianceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),
}

/// Convenience result type.
pub type ComplianceResult<T> = Result<T, ComplianceError>;
