//! Pipeline configuration: defaults overridden by `PQC_*` environment variables.

use crate::acquisition::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OUTPUT: &str = "public/data/compliance-data.json";
const DEFAULT_RECENCY_YEARS: u32 = 2;
const DEFAULT_BATCH_DELAY_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_STALE_AFTER_HOURS: u64 = 7 * 24;
const DEFAULT_FIPS_MAX_PAGES: u32 = 10;

/// Settings shared by every scraper and the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path of the published corpus.
    pub output: PathBuf,
    /// Directory for the national-scheme document cache.
    pub cache_dir: PathBuf,
    /// Rolling recency window, in years.
    pub recency_years: u32,
    /// Overrides every scraper's own deep-fetch batch size when set.
    pub batch_size: Option<usize>,
    pub batch_delay: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// A corpus younger than this is not re-scraped without `--force`.
    pub stale_after: Duration,
    pub fips_max_pages: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            cache_dir: default_cache_dir(),
            recency_years: DEFAULT_RECENCY_YEARS,
            batch_size: None,
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy {
                attempts: DEFAULT_RETRY_ATTEMPTS,
                ..RetryPolicy::default()
            },
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_HOURS * 3600),
            fips_max_pages: DEFAULT_FIPS_MAX_PAGES,
        }
    }
}

impl PipelineConfig {
    /// Defaults with `PQC_*` overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            output: read_env_string("PQC_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output),
            cache_dir: read_env_string("PQC_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            recency_years: read_env_u32("PQC_RECENCY_YEARS", DEFAULT_RECENCY_YEARS).max(1),
            batch_size: read_env_string("PQC_BATCH_SIZE")
                .and_then(|v| v.parse::<usize>().ok())
                .map(|n| n.max(1)),
            batch_delay: Duration::from_millis(read_env_u64(
                "PQC_BATCH_DELAY_MS",
                DEFAULT_BATCH_DELAY_MS,
            )),
            request_timeout: Duration::from_secs(
                read_env_u64("PQC_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS).max(1),
            ),
            retry: RetryPolicy {
                attempts: read_env_u32("PQC_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS).max(1),
                ..defaults.retry
            },
            stale_after: hours(read_env_u64("PQC_STALE_AFTER_HOURS", DEFAULT_STALE_AFTER_HOURS)),
            fips_max_pages: read_env_u32("PQC_FIPS_MAX_PAGES", DEFAULT_FIPS_MAX_PAGES).max(1),
        }
    }

    /// Run ledger, kept next to the corpus.
    pub fn ledger_path(&self) -> PathBuf {
        self.output.with_file_name("scrape-ledger.jsonl")
    }
}

/// `~/.pqc-compliance/cache`.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pqc-compliance")
        .join("cache")
}

/// Whole hours, saturating instead of overflowing.
fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(3600))
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_u32(name: &str, default_value: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default_value)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
