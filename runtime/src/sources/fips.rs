//! NIST CMVP scraper: FIPS 140-3 validated modules.
//!
//! Walks the paginated search result table, then deep-fetches every
//! certificate page in batches to extract PQC and classical algorithms.

use super::{
    collapse_ws, degrade, element_text, first_date, resolve_url, selector, slug, DetailFindings,
    Harvest, ScrapeContext, Scraper, SeenIds,
};
use crate::acquisition::{fetch_page_text, run_in_batches};
use anyhow::{Context, Result};
use async_trait::async_trait;
use pqc_compliance::types::{
    CertificationType, ComplianceRecord, PqcCoverage, Source, POTENTIALLY_PQC_NAME_MATCH,
    STATUS_ACTIVE, UNKNOWN_VENDOR,
};
use scraper::Html;

const TAG: &str = "NIST";

/// Endpoints and limits for the CMVP scraper.
#[derive(Debug, Clone)]
pub struct FipsConfig {
    /// First page of the search results.
    pub search_url: String,
    /// Page cap; the walk also stops when no "next" link is found.
    pub max_pages: u32,
    pub batch_size: usize,
    pub certification_level: String,
}

impl Default for FipsConfig {
    fn default() -> Self {
        Self {
            search_url: "https://csrc.nist.gov/projects/cryptographic-module-validation-program/validated-modules/search/all?searchMode=Advanced&Standard=FIPS+140-3&ValidationStatus=Active&SecurityLevel=3".to_string(),
            max_pages: 10,
            batch_size: 10,
            certification_level: "FIPS 140-3 L3".to_string(),
        }
    }
}

/// CMVP module scraper.
pub struct FipsScraper {
    config: FipsConfig,
}

impl FipsScraper {
    pub fn new(config: FipsConfig) -> Self {
        Self { config }
    }
}

/// One row of the search result table.
#[derive(Debug, Clone, PartialEq)]
struct ModuleRow {
    cert_id: String,
    link: String,
    vendor: String,
    module_name: String,
    raw_date: String,
}

#[async_trait]
impl Scraper for FipsScraper {
    fn source(&self) -> Source {
        Source::Nist
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Harvest> {
        let mut rows = Vec::new();
        let mut visited = SeenIds::default();
        let mut next = Some(self.config.search_url.clone());
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages >= self.config.max_pages || !visited.first_time(&url) {
                break;
            }
            pages += 1;
            let html = ctx
                .fetcher
                .fetch_text(&url)
                .await
                .with_context(|| format!("fetching CMVP search page {pages}"))?;
            let (page_rows, next_url) = parse_search_page(&html, &url)?;
            tracing::debug!("[{TAG}] page {pages}: {} rows", page_rows.len());
            rows.extend(page_rows);
            next = next_url;
        }

        tracing::info!(
            "[{TAG}] Found {} FIPS 140-3 candidates on {pages} page(s). Processing details...",
            rows.len()
        );

        let mut seen = SeenIds::default();
        let mut candidates = Vec::new();
        for row in rows {
            let date = first_date(&row.raw_date).unwrap_or(ctx.today);
            if !ctx.is_recent(date) || !seen.first_time(&row.cert_id) {
                continue;
            }
            candidates.push((row, date));
        }

        let records = run_in_batches(candidates, ctx.batch(self.config.batch_size), |(row, date)| {
            async move {
                let heuristic = name_heuristic(&row.module_name);
                let findings = if row.link.is_empty() {
                    DetailFindings::heuristic(heuristic)
                } else {
                    let fetched = fetch_page_text(ctx.fetcher.as_ref(), &row.link)
                        .await
                        .map(|text| DetailFindings::from_text(&text));
                    let mut findings = degrade(
                        fetched,
                        DetailFindings::heuristic(heuristic.clone()),
                        TAG,
                        &row.cert_id,
                    );
                    if !findings.pqc.is_detected() {
                        findings.pqc = heuristic;
                    }
                    findings
                };

                ComplianceRecord {
                    id: row.cert_id,
                    source: Source::Nist,
                    date: date.format("%Y-%m-%d").to_string(),
                    link: row.link,
                    record_type: CertificationType::Fips1403,
                    status: STATUS_ACTIVE.to_string(),
                    pqc_coverage: findings.pqc,
                    classical_algorithms: findings.classical,
                    product_name: row.module_name,
                    product_category: "Cryptographic Module".to_string(),
                    vendor: row.vendor,
                    lab: findings.lab,
                    certification_level: Some(self.config.certification_level.clone()),
                    ..Default::default()
                }
            }
        })
        .await;

        Ok(Harvest::Records(records))
    }
}

/// Coverage implied by the module name alone.
fn name_heuristic(module_name: &str) -> PqcCoverage {
    let lower = module_name.to_lowercase();
    if lower.contains("quantum") || lower.contains("pqc") {
        PqcCoverage::Algorithms(POTENTIALLY_PQC_NAME_MATCH.to_string())
    } else {
        PqcCoverage::none()
    }
}

/// Rows of one result page plus the absolute URL of the next page, if any.
fn parse_search_page(html: &str, page_url: &str) -> Result<(Vec<ModuleRow>, Option<String>)> {
    let doc = Html::parse_document(html);
    let row_sel = selector("#searchResultsTable tr")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a")?;

    let mut rows = Vec::new();
    for tr in doc.select(&row_sel) {
        let cells: Vec<_> = tr.select(&cell_sel).collect();
        if cells.len() < 5 {
            continue;
        }

        let cert_link = cells[0].select(&link_sel).next();
        let vendor = element_text(&cells[1]);
        let module_name = element_text(&cells[2]);
        let cert_id = cert_link
            .map(|a| element_text(&a))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("nist-{}", slug(&format!("{vendor} {module_name}"))));
        let link = cert_link
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_url(page_url, href))
            .unwrap_or_default();

        rows.push(ModuleRow {
            cert_id,
            link,
            vendor: if vendor.is_empty() {
                UNKNOWN_VENDOR.to_string()
            } else {
                vendor
            },
            module_name: if module_name.is_empty() {
                "Unknown Module".to_string()
            } else {
                module_name
            },
            raw_date: element_text(&cells[4]),
        });
    }

    let next = doc
        .select(&link_sel)
        .find(|a| {
            a.value().attr("rel") == Some("next")
                || collapse_ws(&a.text().collect::<String>())
                    .to_lowercase()
                    .starts_with("next")
        })
        .and_then(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty() && !href.starts_with('#'))
        .map(|href| resolve_url(page_url, href));

    Ok((rows, next))
}
