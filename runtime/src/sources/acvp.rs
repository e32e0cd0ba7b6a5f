//! NIST CAVP/ACVP scraper: PQC algorithm validations.
//!
//! The search endpoint rejects queries with too many algorithm filters, so
//! each algorithm group is queried on its own and the results are merged
//! with cross-group deduplication by certificate id.

use super::{
    degrade, element_text, resolve_url, selector, DetailFindings, Harvest, ScrapeContext,
    Scraper, SeenIds,
};
use crate::acquisition::{fetch_page_text, fetch_text_with_retry, run_in_batches};
use anyhow::{bail, Result};
use async_trait::async_trait;
use pqc_compliance::normalize::parse_date;
use pqc_compliance::types::{
    CertificationType, ComplianceRecord, PqcCoverage, Source, POTENTIALLY_PQC, STATUS_ACTIVE,
    UNKNOWN_VENDOR,
};
use scraper::Html;

const TAG: &str = "ACVP";

/// Name fragments that hint at a PQC implementation before any detail fetch.
const PQC_NAME_HINTS: &[&str] = &["lms", "xmss", "kyber", "dilithium", "sphincs", "falcon"];

/// One algorithm filter group: queried together, in a single request.
#[derive(Debug, Clone)]
pub struct AlgorithmGroup {
    pub name: String,
    pub ids: Vec<u32>,
}

impl AlgorithmGroup {
    pub fn new(name: &str, ids: &[u32]) -> Self {
        Self {
            name: name.to_string(),
            ids: ids.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcvpConfig {
    pub search_url: String,
    pub groups: Vec<AlgorithmGroup>,
    pub batch_size: usize,
}

impl Default for AcvpConfig {
    fn default() -> Self {
        Self {
            search_url: "https://csrc.nist.gov/projects/cryptographic-algorithm-validation-program/validation-search".to_string(),
            groups: vec![
                AlgorithmGroup::new("ML-KEM", &[179, 180]),
                AlgorithmGroup::new("ML-DSA", &[176, 177, 178]),
                AlgorithmGroup::new("LMS", &[173, 174, 175]),
            ],
            batch_size: 10,
        }
    }
}

impl AcvpConfig {
    /// Search URL for one group.
    pub fn group_url(&self, group: &AlgorithmGroup) -> String {
        let algos = group
            .ids
            .iter()
            .map(|id| format!("algorithm={id}"))
            .collect::<Vec<_>>()
            .join("&");
        format!(
            "{}?searchMode=implementation&productType=-1&{algos}&ipp=10000",
            self.search_url
        )
    }
}

pub struct AcvpScraper {
    config: AcvpConfig,
}

impl AcvpScraper {
    pub fn new(config: AcvpConfig) -> Self {
        Self { config }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ValidationRow {
    cert_id: String,
    vendor: String,
    implementation: String,
    link: String,
    raw_date: String,
}

#[async_trait]
impl Scraper for AcvpScraper {
    fn source(&self) -> Source {
        Source::Acvp
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Harvest> {
        let mut seen = SeenIds::default();
        let mut candidates = Vec::new();
        let mut failed_groups = 0;

        for group in &self.config.groups {
            tracing::info!("[{TAG}] Fetching {} validations...", group.name);
            let url = self.config.group_url(group);
            let html = match fetch_text_with_retry(ctx.fetcher.as_ref(), &url, ctx.retry).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!("[{TAG}] {} query failed: {e}", group.name);
                    failed_groups += 1;
                    continue;
                }
            };

            let rows = parse_results(&html, &url)?;
            tracing::info!("[{TAG}] {}: Found {} rows", group.name, rows.len());

            for row in rows {
                if !seen.first_time(&row.cert_id) {
                    continue;
                }
                let date = parse_date(&row.raw_date).unwrap_or(ctx.today);
                if ctx.is_recent(date) {
                    candidates.push((row, date));
                }
            }
        }

        if failed_groups > 0 && failed_groups == self.config.groups.len() {
            bail!("all {failed_groups} algorithm group queries failed");
        }

        let records = run_in_batches(candidates, ctx.batch(self.config.batch_size), |(row, date)| {
            async move {
                let heuristic = name_heuristic(&row.implementation);
                let findings = if row.link.is_empty() {
                    DetailFindings::heuristic(heuristic)
                } else {
                    // A readable detail page overrides the name hint either way.
                    let fetched = fetch_page_text(ctx.fetcher.as_ref(), &row.link)
                        .await
                        .map(|text| DetailFindings::from_text(&text));
                    degrade(fetched, DetailFindings::heuristic(heuristic), TAG, &row.cert_id)
                };

                ComplianceRecord {
                    id: row.cert_id,
                    source: Source::Acvp,
                    date: date.format("%Y-%m-%d").to_string(),
                    link: row.link,
                    record_type: CertificationType::Acvp,
                    status: STATUS_ACTIVE.to_string(),
                    pqc_coverage: findings.pqc,
                    classical_algorithms: findings.classical,
                    product_name: row.implementation,
                    product_category: "Algorithm Implementation".to_string(),
                    vendor: row.vendor,
                    ..Default::default()
                }
            }
        })
        .await;

        tracing::info!("[{TAG}] Total unique records collected: {}", records.len());
        Ok(Harvest::Records(records))
    }
}

fn name_heuristic(implementation: &str) -> PqcCoverage {
    let lower = implementation.to_lowercase();
    if PQC_NAME_HINTS.iter().any(|hint| lower.contains(hint)) {
        PqcCoverage::Algorithms(POTENTIALLY_PQC.to_string())
    } else {
        PqcCoverage::none()
    }
}

fn parse_results(html: &str, page_url: &str) -> Result<Vec<ValidationRow>> {
    let doc = Html::parse_document(html);
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a")?;

    let mut rows = Vec::new();
    for tr in doc.select(&row_sel) {
        let cells: Vec<_> = tr.select(&cell_sel).collect();
        if cells.len() < 4 {
            continue;
        }
        let cert_id = element_text(&cells[2]);
        if cert_id.is_empty() {
            continue;
        }

        let impl_link = cells[1].select(&link_sel).next();
        let implementation = impl_link
            .map(|a| element_text(&a))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| element_text(&cells[1]));
        let link = impl_link
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_url(page_url, href))
            .unwrap_or_default();
        let vendor = element_text(&cells[0]);

        rows.push(ValidationRow {
            cert_id,
            vendor: if vendor.is_empty() {
                UNKNOWN_VENDOR.to_string()
            } else {
                vendor
            },
            implementation: if implementation.is_empty() {
                "Unknown".to_string()
            } else {
                implementation
            },
            link,
            raw_date: element_text(&cells[3]),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::{context, StubFetcher};
    use std::sync::Arc;

    const BASE: &str = "https://csrc.test/cavp/validation-search";

    fn config() -> AcvpConfig {
        AcvpConfig {
            search_url: BASE.to_string(),
            groups: vec![
                AlgorithmGroup::new("ML-KEM", &[179, 180]),
                AlgorithmGroup::new("LMS", &[173]),
            ],
            batch_size: 2,
        }
    }

    fn table(rows: &[(&str, &str, &str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(vendor, name, id, date)| {
                format!(
                    "<tr><td>{vendor}</td><td><a href=\"details?validation={id}\">{name}</a></td>\
                     <td>{id}</td><td>{date}</td></tr>"
                )
            })
            .collect();
        format!("<html><body><table><tr><th>Vendor</th></tr>{body}</table></body></html>")
    }

    #[test]
    fn test_group_url() {
        let cfg = config();
        assert_eq!(
            cfg.group_url(&cfg.groups[0]),
            format!("{BASE}?searchMode=implementation&productType=-1&algorithm=179&algorithm=180&ipp=10000")
        );
    }

    #[tokio::test]
    async fn test_cross_group_dedup_and_heuristics() {
        let cfg = config();
        let kem_url = cfg.group_url(&cfg.groups[0]);
        let lms_url = cfg.group_url(&cfg.groups[1]);
        let fetcher = Arc::new(
            StubFetcher::new()
                .page(
                    &kem_url,
                    table(&[
                        ("Acme", "Acme Crypto Lib", "A1001", "03/01/2025"),
                        ("Hashco", "Hashco LMS Signer", "A1002", "02/01/2025"),
                    ]),
                )
                .page(
                    &lms_url,
                    table(&[
                        ("Hashco", "Hashco LMS Signer", "A1002", "02/01/2025"),
                        ("Treeco", "Treeco XMSS Core", "A1003", "01/15/2025"),
                        ("Oldco", "Oldco Kyber", "A0001", "01/15/2020"),
                    ]),
                )
                .page(
                    "https://csrc.test/cavp/details?validation=A1001",
                    "<body>ML-KEM-768 ECDSA P-256</body>",
                )
                .page("https://csrc.test/cavp/details?validation=A1002", "<body>SHA2-256</body>")
                .fail("https://csrc.test/cavp/details?validation=A1003", 502),
        );

        let harvest = AcvpScraper::new(cfg).scrape(&context(fetcher)).await.unwrap();
        let records = harvest.records();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A1001", "A1002", "A1003"]);

        assert_eq!(records[0].pqc_coverage, PqcCoverage::Algorithms("ML-KEM".into()));
        assert_eq!(records[0].classical_algorithms.as_deref(), Some("ECDSA (P-256)"));
        // Detail page read, nothing found: the name hint is dropped.
        assert_eq!(records[1].pqc_coverage, PqcCoverage::none());
        // Detail page unreachable: the name hint stays.
        assert_eq!(
            records[2].pqc_coverage,
            PqcCoverage::Algorithms(POTENTIALLY_PQC.into())
        );
        assert!(records.iter().all(|r| r.source == Source::Acvp));
    }

    #[tokio::test]
    async fn test_all_groups_failing_is_error() {
        let fetcher = Arc::new(StubFetcher::new());
        assert!(AcvpScraper::new(config()).scrape(&context(fetcher)).await.is_err());
    }

    #[tokio::test]
    async fn test_one_group_failing_keeps_others() {
        let cfg = config();
        let kem_url = cfg.group_url(&cfg.groups[0]);
        let fetcher = Arc::new(StubFetcher::new().page(
            &kem_url,
            table(&[("Acme", "Acme Crypto Lib", "A1001", "2025-03-01")]),
        ));
        let harvest = AcvpScraper::new(cfg).scrape(&context(fetcher)).await.unwrap();
        assert_eq!(harvest.records().len(), 1);
    }
}
