//! CLI subcommand implementations for the `pqc-scrape` binary.

pub mod health_cmd;
pub mod normalize_cmd;
pub mod output;
pub mod scrape_cmd;
pub mod validate_cmd;

use crate::config::PipelineConfig;
use std::path::PathBuf;

/// The corpus a command works on: an explicit path, else `PQC_OUTPUT`, else the default.
pub fn corpus_path(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PipelineConfig::from_env().output)
}
