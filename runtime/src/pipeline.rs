//! Orchestrator: one scrape-merge-check-publish pass over the corpus.
//!
//! Scrapers run sequentially. A source that was re-scraped replaces its
//! previous records; a source whose document was unchanged keeps them; a
//! source that was not selected is left alone. The merged corpus is
//! normalized, deduplicated, validated and health-checked against the
//! previous one, and only published when no source regressed critically
//! (or the caller explicitly allows it).

use crate::acquisition::{Fetcher, HttpClient};
use crate::cache::DocumentCache;
use crate::config::PipelineConfig;
use crate::ledger::{LedgerEntry, RunLedger};
use crate::sources::acvp::AcvpConfig;
use crate::sources::anssi::AnssiConfig;
use crate::sources::common_criteria::CommonCriteriaConfig;
use crate::sources::enisa::EnisaConfig;
use crate::sources::fips::FipsConfig;
use crate::sources::national::NationalSchemeConfig;
use crate::sources::{
    run_scraper, AcvpScraper, AnssiScraper, CommonCriteriaScraper, EnisaScraper, FipsScraper,
    Harvest, NationalSchemeScraper, ScrapeContext, Scraper, ScraperRun,
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use pqc_compliance::health::{check_record_counts, log_health_checks, HealthThresholds};
use pqc_compliance::normalize::normalize_record;
use pqc_compliance::validation::{log_summary, validate_dataset, ValidationConfig};
use pqc_compliance::{
    load_dataset_or_empty, save_dataset, ComplianceRecord, DatasetSummary, HealthCheckResult,
    Source,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Per-run switches, usually from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Scrape even when the corpus is fresh.
    pub force: bool,
    /// Publish even when the health check is critical.
    pub allow_regression: bool,
    /// Sources to scrape; empty means all.
    pub sources: Vec<Source>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The corpus was younger than the staleness threshold.
    Fresh,
    Published,
    /// A critical health result kept the new corpus from being written.
    Blocked,
}

/// One scraper's part of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source: Source,
    pub outcome: &'static str,
    pub record_count: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub status: RunStatus,
    pub output: PathBuf,
    pub previous_count: usize,
    pub record_count: usize,
    pub sources: Vec<SourceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<DatasetSummary>,
    pub health: Vec<HealthCheckResult>,
    /// Age of the corpus when the run was skipped as fresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<f64>,
}

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn Fetcher>,
    scrapers: Vec<Box<dyn Scraper>>,
    validation: ValidationConfig,
    thresholds: HealthThresholds,
    today: Option<NaiveDate>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn Fetcher>,
        scrapers: Vec<Box<dyn Scraper>>,
    ) -> Self {
        Self {
            config,
            fetcher,
            scrapers,
            validation: ValidationConfig::default(),
            thresholds: HealthThresholds::default(),
            today: None,
        }
    }

    /// Every known source, fetched over HTTP.
    pub fn with_default_scrapers(config: PipelineConfig) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpClient::new(config.request_timeout));
        let scrapers = default_scrapers(&config)?;
        Ok(Self::new(config, fetcher, scrapers))
    }

    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Pin "today" for the recency window.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn context(&self) -> ScrapeContext {
        let ctx = ScrapeContext::new(self.fetcher.clone(), &self.config);
        match self.today {
            Some(today) => ctx.with_today(today, self.config.recency_years),
            None => ctx,
        }
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        let output = self.config.output.clone();
        let previous = load_dataset_or_empty(&output)
            .with_context(|| format!("loading existing corpus {}", output.display()))?;
        tracing::info!("[Pipeline] Loaded {} existing records", previous.len());

        if !previous.is_empty() && !options.force {
            if let Some(age) = corpus_age(&output) {
                if age < self.config.stale_after {
                    let hours = age.as_secs_f64() / 3600.0;
                    tracing::info!(
                        "[Pipeline] Data is fresh ({hours:.1} hours old). Skipping scrape; use --force to override."
                    );
                    return Ok(RunReport {
                        status: RunStatus::Fresh,
                        output,
                        previous_count: previous.len(),
                        record_count: previous.len(),
                        sources: Vec::new(),
                        validation: None,
                        health: Vec::new(),
                        age_hours: Some(hours),
                    });
                }
            }
        }

        let selected: Vec<&dyn Scraper> = self
            .scrapers
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| options.sources.is_empty() || options.sources.contains(&s.source()))
            .collect();
        tracing::info!(
            "[Pipeline] Mode: {} (force: {})",
            if options.sources.is_empty() { "ALL" } else { "ISOLATED" },
            options.force
        );

        let mut ledger = match RunLedger::open(&self.config.ledger_path()) {
            Ok(ledger) => Some(ledger),
            Err(e) => {
                tracing::warn!("[Pipeline] run ledger unavailable: {e:#}");
                None
            }
        };

        let ctx = self.context();
        let mut runs = Vec::with_capacity(selected.len());
        for scraper in selected {
            tracing::info!("[Pipeline] Running {} scraper...", scraper.source());
            let run = run_scraper(scraper, &ctx).await;
            if let Some(ledger) = ledger.as_mut() {
                let mut entry = LedgerEntry::now(
                    run.source.as_str(),
                    run.harvest.records().len(),
                    run.duration.as_millis() as u64,
                    run.outcome(),
                );
                entry.error = run.error.clone();
                if let Err(e) = ledger.append(&entry) {
                    tracing::warn!("[Pipeline] failed to append run ledger: {e:#}");
                }
            }
            runs.push(run);
        }

        let merged = merge_runs(&previous, &runs);
        tracing::info!(
            "[Pipeline] Merged corpus: {} records ({} before)",
            merged.len(),
            previous.len()
        );

        let validation = validate_dataset(&merged, &self.validation);
        log_summary(&validation);

        let health = check_record_counts(&merged, &previous, &self.thresholds);
        let critical = log_health_checks(&health);

        let status = if critical && !options.allow_regression {
            tracing::error!(
                "[Pipeline] Critical health check; not publishing. Use --allow-regression to override."
            );
            RunStatus::Blocked
        } else {
            if critical {
                tracing::warn!("[Pipeline] Publishing despite critical health check");
            }
            save_dataset(&output, &merged)
                .with_context(|| format!("writing corpus {}", output.display()))?;
            tracing::info!("[Pipeline] Saved {} records to {}", merged.len(), output.display());
            RunStatus::Published
        };

        let sources = runs.iter().map(|run| source_report(run, &previous)).collect();
        Ok(RunReport {
            status,
            output,
            previous_count: previous.len(),
            record_count: merged.len(),
            sources,
            validation: Some(validation),
            health,
            age_hours: None,
        })
    }
}

fn source_report(run: &ScraperRun, previous: &[ComplianceRecord]) -> SourceReport {
    let record_count = match run.harvest {
        Harvest::Unchanged => previous.iter().filter(|r| r.source == run.source).count(),
        Harvest::Records(ref records) => records.len(),
    };
    SourceReport {
        source: run.source.clone(),
        outcome: run.outcome(),
        record_count,
        duration_ms: run.duration.as_millis() as u64,
        error: run.error.clone(),
    }
}

/// Scrapers for every known source, configured from `config`.
pub fn default_scrapers(config: &PipelineConfig) -> Result<Vec<Box<dyn Scraper>>> {
    let cache = DocumentCache::new(&config.cache_dir)?;
    Ok(vec![
        Box::new(FipsScraper::new(FipsConfig {
            max_pages: config.fips_max_pages,
            ..Default::default()
        })),
        Box::new(AcvpScraper::new(AcvpConfig::default())),
        Box::new(CommonCriteriaScraper::new(CommonCriteriaConfig::default())),
        Box::new(AnssiScraper::new(AnssiConfig::default())),
        Box::new(NationalSchemeScraper::new(NationalSchemeConfig::default(), cache)?),
        Box::new(EnisaScraper::new(EnisaConfig::default())),
    ])
}

/// Merge scraper output into the previous corpus.
///
/// Previous records of every source that produced a fresh harvest (including
/// an empty one from a failed scraper) are replaced; unchanged and unselected
/// sources keep theirs. The result is normalized and deduplicated by id: an id
/// keeps the position of its first occurrence and the value of its last.
pub fn merge_runs(previous: &[ComplianceRecord], runs: &[ScraperRun]) -> Vec<ComplianceRecord> {
    let replaced: HashSet<&Source> = runs
        .iter()
        .filter(|run| matches!(run.harvest, Harvest::Records(_)))
        .map(|run| &run.source)
        .collect();

    let kept = previous.iter().filter(|r| !replaced.contains(&r.source));
    let fresh = runs.iter().flat_map(|run| run.harvest.records());
    let normalized: Vec<_> = kept.chain(fresh).map(normalize_record).collect();
    dedupe_last_wins(normalized)
}

/// Keep one record per id: first position, last value.
pub fn dedupe_last_wins(records: Vec<ComplianceRecord>) -> Vec<ComplianceRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ComplianceRecord> = Vec::with_capacity(records.len());
    for record in records {
        match index.get(&record.id) {
            Some(&i) => out[i] = record,
            None => {
                index.insert(record.id.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Time since the file was last modified.
fn corpus_age(path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::{today, StubFetcher};
    use async_trait::async_trait;
    use pqc_compliance::types::{CertificationType, PqcCoverage};
    use pqc_compliance::HealthStatus;

    fn record(id: &str, source: Source) -> ComplianceRecord {
        ComplianceRecord {
            id: id.to_string(),
            source,
            date: "2025-01-15".to_string(),
            link: "https://example.test/cert".to_string(),
            record_type: CertificationType::CommonCriteria,
            status: "Active".to_string(),
            product_name: format!("Product {id}"),
            product_category: "Module".to_string(),
            vendor: "Acme".to_string(),
            ..Default::default()
        }
    }

    fn run(source: Source, harvest: Harvest) -> ScraperRun {
        ScraperRun {
            source,
            harvest,
            duration: Duration::from_millis(5),
            error: None,
        }
    }

    /// Scraper returning a fixed harvest, or failing.
    struct Fixed {
        source: Source,
        harvest: Option<Harvest>,
    }

    #[async_trait]
    impl Scraper for Fixed {
        fn source(&self) -> Source {
            self.source.clone()
        }

        async fn scrape(&self, _: &ScrapeContext) -> Result<Harvest> {
            self.harvest
                .clone()
                .ok_or_else(|| anyhow::anyhow!("source offline"))
        }
    }

    fn pipeline(dir: &Path, scrapers: Vec<Box<dyn Scraper>>) -> Pipeline {
        let config = PipelineConfig {
            output: dir.join("data").join("compliance-data.json"),
            cache_dir: dir.join("cache"),
            batch_delay: Duration::ZERO,
            ..Default::default()
        };
        Pipeline::new(config, Arc::new(StubFetcher::new()), scrapers)
            .with_today(today())
            .with_validation(ValidationConfig {
                reference_date: today(),
                ..Default::default()
            })
    }

    #[test]
    fn test_dedupe_last_wins_keeps_first_position() {
        let mut a2 = record("a", Source::Nist);
        a2.product_name = "Second".to_string();
        let out = dedupe_last_wins(vec![record("a", Source::Nist), record("b", Source::Nist), a2]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[0].product_name, "Second");
        assert_eq!(out[1].id, "b");
    }

    #[test]
    fn test_merge_replaces_only_rescraped_sources() {
        let previous = vec![
            record("n1", Source::Nist),
            record("a1", Source::Anssi),
            record("b1", Source::Bsi),
        ];
        let mut fresh = record("n2", Source::Nist);
        fresh.date = "03/01/2025".to_string();
        fresh.pqc_coverage = PqcCoverage::Algorithms("Kyber".to_string());
        let runs = vec![
            run(Source::Nist, Harvest::Records(vec![fresh])),
            run(Source::Bsi, Harvest::Unchanged),
        ];

        let merged = merge_runs(&previous, &runs);
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b1", "n2"]);
        assert_eq!(merged[2].date, "2025-03-01");
        assert_eq!(merged[2].pqc_coverage, PqcCoverage::Algorithms("ML-KEM".into()));
    }

    #[tokio::test]
    async fn test_run_publishes_and_writes_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(
            dir.path(),
            vec![Box::new(Fixed {
                source: Source::Nist,
                harvest: Some(Harvest::Records(vec![record("n1", Source::Nist)])),
            })],
        );

        let report = p.run(&RunOptions::default()).await.unwrap();
        assert_eq!(report.status, RunStatus::Published);
        assert_eq!(report.record_count, 1);
        assert_eq!(load_dataset_or_empty(&p.config().output).unwrap().len(), 1);

        let entries = crate::ledger::read_entries(&p.config().ledger_path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "NIST");
        assert_eq!(entries[0].outcome, "ok");
    }

    #[tokio::test]
    async fn test_fresh_corpus_is_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(
            dir.path(),
            vec![Box::new(Fixed {
                source: Source::Nist,
                harvest: Some(Harvest::Records(vec![record("n2", Source::Nist)])),
            })],
        );
        save_dataset(&p.config().output, &[record("n1", Source::Nist)]).unwrap();

        let skipped = p.run(&RunOptions::default()).await.unwrap();
        assert_eq!(skipped.status, RunStatus::Fresh);
        assert!(skipped.sources.is_empty());

        let forced = p
            .run(&RunOptions {
                force: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(forced.status, RunStatus::Published);
        let saved = load_dataset_or_empty(&p.config().output).unwrap();
        assert_eq!(saved[0].id, "n2");
    }

    #[tokio::test]
    async fn test_failed_source_blocks_publish() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(
            dir.path(),
            vec![Box::new(Fixed {
                source: Source::Anssi,
                harvest: None,
            })],
        );
        let previous = vec![record("a1", Source::Anssi), record("a2", Source::Anssi)];
        save_dataset(&p.config().output, &previous).unwrap();

        let options = RunOptions {
            force: true,
            ..Default::default()
        };
        let report = p.run(&options).await.unwrap();
        assert_eq!(report.status, RunStatus::Blocked);
        assert_eq!(report.sources[0].outcome, "failed");
        assert!(report
            .health
            .iter()
            .any(|h| h.source == Source::Anssi && h.status == HealthStatus::Critical));
        // The previous corpus is untouched.
        assert_eq!(load_dataset_or_empty(&p.config().output).unwrap().len(), 2);

        let report = p
            .run(&RunOptions {
                allow_regression: true,
                ..options
            })
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Published);
        assert!(load_dataset_or_empty(&p.config().output).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_source_selection() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(
            dir.path(),
            vec![
                Box::new(Fixed {
                    source: Source::Nist,
                    harvest: Some(Harvest::Records(vec![record("n1", Source::Nist)])),
                }),
                Box::new(Fixed {
                    source: Source::Acvp,
                    harvest: None,
                }),
            ],
        );
        let report = p
            .run(&RunOptions {
                sources: vec![Source::Nist],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].source, Source::Nist);
    }
}
