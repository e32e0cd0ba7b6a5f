//! Per-source scrapers.
//!
//! Every scraper follows the same shape: fetch a listing, parse candidate
//! rows, apply the recency window, deep-fetch details in fixed-size batches,
//! and emit one record per candidate. Enrichment failures degrade a record to
//! its heuristic defaults; they never drop it.

pub mod acvp;
pub mod anssi;
pub mod common_criteria;
pub mod enisa;
pub mod fips;
pub mod national;

use crate::acquisition::{BatchPolicy, FetchError, Fetcher, RetryPolicy};
use crate::config::PipelineConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use pqc_compliance::extraction::{
    classical_patterns, extract_algorithms, extract_lab_from_text, pqc_patterns,
};
use pqc_compliance::normalize::parse_date;
use pqc_compliance::types::{non_blank, ComplianceRecord, PqcCoverage, Source};
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

pub use acvp::AcvpScraper;
pub use anssi::AnssiScraper;
pub use common_criteria::CommonCriteriaScraper;
pub use enisa::EnisaScraper;
pub use fips::FipsScraper;
pub use national::NationalSchemeScraper;

/// What a scraper produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Harvest {
    Records(Vec<ComplianceRecord>),
    /// The source document is byte-identical to the last run; nothing was parsed.
    Unchanged,
}

impl Harvest {
    pub fn records(&self) -> &[ComplianceRecord] {
        match self {
            Harvest::Records(r) => r,
            Harvest::Unchanged => &[],
        }
    }

    pub fn into_records(self) -> Vec<ComplianceRecord> {
        match self {
            Harvest::Records(r) => r,
            Harvest::Unchanged => Vec::new(),
        }
    }
}

/// Shared inputs for one scraper pass.
#[derive(Clone)]
pub struct ScrapeContext {
    pub fetcher: Arc<dyn Fetcher>,
    /// "Today" for date defaults.
    pub today: NaiveDate,
    /// Records dated before this are outside the recency window.
    pub cutoff: NaiveDate,
    pub batch_size: Option<usize>,
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
}

impl ScrapeContext {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &PipelineConfig) -> Self {
        let today = Utc::now().date_naive();
        Self {
            fetcher,
            today,
            cutoff: recency_cutoff(today, config.recency_years),
            batch_size: config.batch_size,
            batch_delay: config.batch_delay,
            retry: config.retry,
        }
    }

    /// Pin "today" (and the cutoff derived from it).
    pub fn with_today(mut self, today: NaiveDate, recency_years: u32) -> Self {
        self.today = today;
        self.cutoff = recency_cutoff(today, recency_years);
        self
    }

    /// Batch policy with the scraper's natural size unless overridden.
    pub fn batch(&self, default_size: usize) -> BatchPolicy {
        BatchPolicy {
            size: self.batch_size.unwrap_or(default_size),
            delay: self.batch_delay,
        }
    }

    pub fn is_recent(&self, date: NaiveDate) -> bool {
        date >= self.cutoff
    }

    pub fn today_iso(&self) -> String {
        self.today.format("%Y-%m-%d").to_string()
    }
}

/// A certification source.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Source tag stamped on every record this scraper emits.
    fn source(&self) -> Source;
    /// Run one full pass.
    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Harvest>;
}

/// Outcome of [`run_scraper`].
#[derive(Debug)]
pub struct ScraperRun {
    pub source: Source,
    pub harvest: Harvest,
    pub duration: Duration,
    /// Set when the scraper failed and its harvest was replaced by an empty one.
    pub error: Option<String>,
}

impl ScraperRun {
    pub fn outcome(&self) -> &'static str {
        match (&self.error, &self.harvest) {
            (Some(_), _) => "failed",
            (None, Harvest::Unchanged) => "unchanged",
            (None, Harvest::Records(_)) => "ok",
        }
    }
}

/// Run a scraper with failure isolation.
///
/// Any error is logged and turned into an empty harvest so one source outage
/// cannot abort the pipeline. Duplicate ids that slipped past the scraper's
/// own dedup are dropped here (first occurrence wins).
pub async fn run_scraper(scraper: &dyn Scraper, ctx: &ScrapeContext) -> ScraperRun {
    let source = scraper.source();
    let tag = source.tag();
    let started = Instant::now();

    let (harvest, error) = match scraper.scrape(ctx).await {
        Ok(Harvest::Records(records)) => {
            let before = records.len();
            let records = dedupe_by_id(records);
            if records.len() < before {
                tracing::warn!("[{tag}] dropped {} duplicate ids", before - records.len());
            }
            tracing::info!("[{tag}] {} records", records.len());
            (Harvest::Records(records), None)
        }
        Ok(Harvest::Unchanged) => {
            tracing::info!("[{tag}] source unchanged since last run");
            (Harvest::Unchanged, None)
        }
        Err(e) => {
            tracing::warn!("[{tag}] scrape failed: {e:#}");
            (Harvest::Records(Vec::new()), Some(format!("{e:#}")))
        }
    };

    ScraperRun {
        source,
        harvest,
        duration: started.elapsed(),
        error,
    }
}

/// Keep the first record for each id.
pub fn dedupe_by_id(records: Vec<ComplianceRecord>) -> Vec<ComplianceRecord> {
    let mut seen = SeenIds::default();
    records
        .into_iter()
        .filter(|r| seen.first_time(&r.id))
        .collect()
}

/// Natural-id set used for within-run deduplication.
#[derive(Debug, Default)]
pub struct SeenIds(HashSet<String>);

impl SeenIds {
    /// Record `id`; `false` if it was already seen.
    pub fn first_time(&mut self, id: &str) -> bool {
        self.0.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fields filled in by a deep fetch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetailFindings {
    pub pqc: PqcCoverage,
    pub classical: Option<String>,
    pub lab: Option<String>,
}

impl DetailFindings {
    /// Run the extraction engine over a detail page or document.
    pub fn from_text(text: &str) -> Self {
        Self {
            pqc: PqcCoverage::from_extraction(extract_algorithms(text, pqc_patterns())),
            classical: non_blank(extract_algorithms(text, classical_patterns())),
            lab: extract_lab_from_text(text),
        }
    }

    /// Findings with only a (possibly heuristic) coverage value.
    pub fn heuristic(pqc: PqcCoverage) -> Self {
        Self {
            pqc,
            ..Self::default()
        }
    }
}

/// Use the deep-fetch result, or fall back to `fallback` when it failed.
pub fn degrade(
    result: std::result::Result<DetailFindings, FetchError>,
    fallback: DetailFindings,
    tag: &str,
    id: &str,
) -> DetailFindings {
    match result {
        Ok(findings) => findings,
        Err(e) => {
            tracing::debug!("[{tag}] detail fetch failed for {id}: {e}");
            fallback
        }
    }
}

/// `today` minus `years` whole years.
pub fn recency_cutoff(today: NaiveDate, years: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(12 * years))
        .unwrap_or(NaiveDate::MIN)
}

/// First `MM/DD/YYYY` or `YYYY-MM-DD` date in a string.
pub fn first_date(text: &str) -> Option<NaiveDate> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{2}-\d{2}").expect("valid regex")
    });
    re.find(text).and_then(|m| parse_date(m.as_str()))
}

/// Lowercase id slug: every run of non-alphanumerics becomes one `-`.
pub fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Resolve a possibly relative href against the page it came from.
pub fn resolve_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    url::Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Squeeze runs of whitespace into single spaces.
pub fn collapse_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Parse a CSS selector, as an error instead of a panic.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {css:?}: {e}"))
}

/// Trimmed, whitespace-collapsed text of an element.
pub(crate) fn element_text(el: &scraper::ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("ANSSI-CC-2025/30"), "anssi-cc-2025-30");
        assert_eq!(slug("  Secure  Element (v2) "), "secure-element-v2");
    }

    #[test]
    fn test_recency_cutoff() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(
            recency_cutoff(today, 2),
            NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()
        );
        let leap = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            recency_cutoff(leap, 1),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
    }

    #[test]
    fn test_first_date_takes_first_match() {
        assert_eq!(
            first_date("Validated 03/15/2024; updated 2025-01-01"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(first_date("n/a"), None);
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://csrc.nist.gov/projects/x/search", "/projects/x/certificate/4711"),
            "https://csrc.nist.gov/projects/x/certificate/4711"
        );
        assert_eq!(
            resolve_url("https://a.example/dir/", "details?id=1"),
            "https://a.example/dir/details?id=1"
        );
        assert_eq!(resolve_url("https://a.example/", "https://b.example/x"), "https://b.example/x");
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let records = vec![
            ComplianceRecord {
                id: "a".into(),
                product_name: "first".into(),
                ..Default::default()
            },
            ComplianceRecord {
                id: "a".into(),
                product_name: "second".into(),
                ..Default::default()
            },
            ComplianceRecord {
                id: "b".into(),
                ..Default::default()
            },
        ];
        let out = dedupe_by_id(records);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].product_name, "first");
    }

    #[test]
    fn test_degrade_uses_fallback_on_error() {
        let fallback = DetailFindings::heuristic(PqcCoverage::none());
        let out = degrade(
            Err(FetchError::Status {
                url: "u".into(),
                status: 500,
            }),
            fallback.clone(),
            "T",
            "1",
        );
        assert_eq!(out, fallback);
    }

    #[test]
    fn test_findings_from_text() {
        let f = DetailFindings::from_text("Implements ML-KEM-768 and RSA 2048 keys.");
        assert!(f.pqc.is_detected());
        assert_eq!(f.classical.as_deref(), Some("RSA (2048)"));
        let empty = DetailFindings::from_text("nothing here");
        assert_eq!(empty.pqc, PqcCoverage::none());
        assert_eq!(empty.classical, None);
    }
}
