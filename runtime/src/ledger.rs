//! JSONL run ledger: one line per scraper run.
//!
//! - Append-only, one JSON object per line
//! - Rotated when the file exceeds `MAX_LEDGER_SIZE` (10MB)
//! - Rotated files named `.1`, `.2`, etc. (max 5 rotations)

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ledger size before rotation (10 MB).
const MAX_LEDGER_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated ledger files to keep.
const MAX_ROTATIONS: u32 = 5;

/// One scraper run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: String,
    pub source: String,
    pub record_count: usize,
    pub duration_ms: u64,
    /// `ok`, `unchanged` or `failed`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LedgerEntry {
    pub fn now(source: &str, record_count: usize, duration_ms: u64, outcome: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            source: source.to_string(),
            record_count,
            duration_ms,
            outcome: outcome.to_string(),
            error: None,
        }
    }
}

/// Append-only JSONL ledger with size-based rotation.
pub struct RunLedger {
    file: File,
    path: PathBuf,
    current_size: u64,
    max_size: u64,
}

impl RunLedger {
    /// Open or create the ledger file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open run ledger: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size: MAX_LEDGER_SIZE,
        })
    }

    /// Override the rotation threshold.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry.
    pub fn append(&mut self, entry: &LedgerEntry) -> Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(entry)?;
        writeln!(self.file, "{json}")
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Rotate: ledger → ledger.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }
        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            if from.exists() {
                let _ = std::fs::rename(&from, rotation_path(&self.path, i + 1));
            }
        }
        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen run ledger after rotation")?;
        self.current_size = 0;
        Ok(())
    }
}

/// Read every entry of a ledger file, skipping unparseable lines.
pub fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read run ledger: {}", path.display()))?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

/// `scrape-ledger.jsonl.1`, `scrape-ledger.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("scrape-ledger.jsonl")
    );
    base.with_file_name(name)
}
