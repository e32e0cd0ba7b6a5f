//! Reading and writing the unified corpus file.
//!
//! The corpus is a single JSON array of [`ComplianceRecord`] objects,
//! pretty-printed with two-space indentation.

use crate::error::{ComplianceError, ComplianceResult};
use crate::types::ComplianceRecord;
use std::io::Write;
use std::path::Path;

/// Read a corpus file.
pub fn load_dataset(path: &Path) -> ComplianceResult<Vec<ComplianceRecord>> {
    let raw = std::fs::read_to_string(path)?;
    parse_dataset(&raw)
}

/// Read a corpus file, treating a missing file as an empty corpus.
pub fn load_dataset_or_empty(path: &Path) -> ComplianceResult<Vec<ComplianceRecord>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => parse_dataset(&raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Parse a corpus from a JSON string.
pub fn parse_dataset(raw: &str) -> ComplianceResult<Vec<ComplianceRecord>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.is_array() {
        return Err(ComplianceError::InvalidDataset(
            "expected a JSON array of records".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

/// Write a corpus file atomically.
///
/// The data goes to a sibling temp file first and is renamed over the target,
/// so a crash mid-write never leaves a truncated corpus behind.
pub fn save_dataset(path: &Path, records: &[ComplianceRecord]) -> ComplianceResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let json = serde_json::to_string_pretty(records)?;
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
