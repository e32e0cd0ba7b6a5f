//! Common Criteria portal scraper.
//!
//! The portal publishes one bulk CSV of certified products. Only rows inside
//! the recency window get deep PDF fetches: the security target for PQC and
//! classical algorithms, the certification report for the evaluation lab.

use super::{slug, DetailFindings, Harvest, ScrapeContext, Scraper, SeenIds};
use crate::acquisition::{fetch_document_text, run_in_batches};
use anyhow::{Context, Result};
use async_trait::async_trait;
use pqc_compliance::extraction::{classical_patterns, extract_algorithms, extract_lab_from_text};
use pqc_compliance::normalize::parse_date;
use pqc_compliance::types::{
    non_blank, non_empty, CertificationType, ComplianceRecord, DocumentRef, Source,
    STATUS_ACTIVE, UNKNOWN_VENDOR,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

const TAG: &str = "CC";

#[derive(Debug, Clone)]
pub struct CommonCriteriaConfig {
    pub csv_url: String,
    /// Link used when a product has no document URL at all.
    pub listing_url: String,
    pub batch_size: usize,
}

impl Default for CommonCriteriaConfig {
    fn default() -> Self {
        Self {
            csv_url: "https://www.commoncriteriaportal.org/products/certified_products.csv"
                .to_string(),
            listing_url: "https://www.commoncriteriaportal.org/products/".to_string(),
            batch_size: 5,
        }
    }
}

pub struct CommonCriteriaScraper {
    config: CommonCriteriaConfig,
}

impl CommonCriteriaScraper {
    pub fn new(config: CommonCriteriaConfig) -> Self {
        Self { config }
    }
}

/// One CSV row; unknown columns are ignored, missing ones default to empty.
#[derive(Debug, Clone, Default, Deserialize)]
struct CsvRow {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Certification Date", default)]
    certification_date: String,
    #[serde(rename = "Category", default)]
    category: String,
    #[serde(rename = "Assurance Level", default)]
    assurance_level: String,
    #[serde(rename = "Scheme", default)]
    scheme: String,
    #[serde(rename = "Manufacturer", default)]
    manufacturer: String,
    #[serde(rename = "Lab", alias = "ITSEF", alias = "Evaluation Facility", default)]
    lab: String,
    #[serde(rename = "Certification Report URL", default)]
    report_urls: String,
    #[serde(rename = "Security Target URL", default)]
    target_urls: String,
}

/// Document URLs found in one CSV cell, by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLinks {
    pub reports: Vec<String>,
    pub targets: Vec<String>,
    pub other: Vec<DocumentRef>,
}

#[async_trait]
impl Scraper for CommonCriteriaScraper {
    fn source(&self) -> Source {
        Source::CommonCriteria
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Harvest> {
        let csv_text = ctx
            .fetcher
            .fetch_text(&self.config.csv_url)
            .await
            .context("fetching certified products CSV")?;
        let rows = parse_csv(&csv_text)?;
        tracing::info!(
            "[{TAG}] CSV: Found {} records. Filtering and fetching PDFs...",
            rows.len()
        );

        let mut seen = SeenIds::default();
        let mut candidates = Vec::new();
        for row in rows {
            let Some(date) = parse_date(&row.certification_date) else {
                continue;
            };
            if !ctx.is_recent(date) {
                continue;
            }
            let reports = parse_document_urls(&row.report_urls);
            let targets = parse_document_urls(&row.target_urls);
            let date = date.format("%Y-%m-%d").to_string();
            let id = record_id(&row.name, &date, &reports);
            if seen.first_time(&id) {
                candidates.push((row, date, id, reports, targets));
            }
        }
        tracing::info!(
            "[{TAG}] Processing {} recent records (>= {}). This may take a while...",
            candidates.len(),
            ctx.cutoff
        );

        let records = run_in_batches(
            candidates,
            ctx.batch(self.config.batch_size),
            |(row, date, id, reports, targets)| async move {
                let findings = enrich(ctx, &id, &reports, &targets).await;

                let link = targets
                    .targets
                    .first()
                    .or(reports.reports.first())
                    .cloned()
                    .or_else(|| reports.other.first().map(|d| d.url.clone()))
                    .or_else(|| targets.other.first().map(|d| d.url.clone()))
                    .unwrap_or_else(|| self.config.listing_url.clone());

                let manufacturer = non_blank(row.manufacturer.as_str())
                    .unwrap_or_else(|| UNKNOWN_VENDOR.to_string());
                let vendor = match non_blank(row.scheme.as_str()) {
                    Some(scheme) => format!("{manufacturer} (Scheme: {scheme})"),
                    None => manufacturer,
                };

                let mut certification_report_urls = reports.reports;
                certification_report_urls.extend(targets.reports);
                let mut security_target_urls = targets.targets;
                security_target_urls.extend(reports.targets);
                let mut additional = reports.other;
                additional.extend(targets.other);

                ComplianceRecord {
                    id,
                    source: Source::CommonCriteria,
                    date,
                    link,
                    record_type: CertificationType::CommonCriteria,
                    status: STATUS_ACTIVE.to_string(),
                    pqc_coverage: findings.pqc,
                    classical_algorithms: findings.classical,
                    product_name: non_blank(row.name.as_str())
                        .unwrap_or_else(|| "Unknown Product".to_string()),
                    product_category: non_blank(row.category.as_str())
                        .unwrap_or_else(|| "Certified Product".to_string()),
                    vendor,
                    lab: non_blank(row.lab.as_str()).or(findings.lab),
                    certification_level: non_blank(row.assurance_level.as_str()),
                    certification_report_urls: non_empty(certification_report_urls),
                    security_target_urls: non_empty(security_target_urls),
                    additional_documents: non_empty(additional),
                }
            },
        )
        .await;

        Ok(Harvest::Records(records))
    }
}

/// Security target first for PQC and classical; report for the lab and as
/// the classical fallback. A failed download just leaves its fields empty.
async fn enrich(
    ctx: &ScrapeContext,
    id: &str,
    reports: &DocumentLinks,
    targets: &DocumentLinks,
) -> DetailFindings {
    let target_url = targets.targets.first().or(reports.targets.first());
    let report_url = reports.reports.first().or(targets.reports.first());

    let target_text = match target_url {
        Some(url) => document(ctx, url, id).await,
        None => None,
    };
    let report_text = match report_url {
        Some(url) => document(ctx, url, id).await,
        None => None,
    };

    let mut findings = match target_text.as_deref().or(report_text.as_deref()) {
        Some(text) => DetailFindings::from_text(text),
        None => DetailFindings::default(),
    };
    findings.lab = None;
    if let Some(report) = report_text.as_deref() {
        if findings.classical.is_none() {
            findings.classical = non_blank(extract_algorithms(report, classical_patterns()));
        }
        findings.lab = extract_lab_from_text(report);
    }
    findings
}

async fn document(ctx: &ScrapeContext, url: &str, id: &str) -> Option<String> {
    match fetch_document_text(ctx.fetcher.as_ref(), url).await {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!("[{TAG}] document fetch failed for {id}: {e}");
            None
        }
    }
}

fn parse_csv(text: &str) -> Result<Vec<CsvRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    reader.headers().context("reading CSV header")?;

    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => tracing::debug!("[{TAG}] skipping CSV row {}: {e}", line + 2),
        }
    }
    Ok(rows)
}

/// Stable id: the certification report's file stem when there is one,
/// otherwise product name plus date.
fn record_id(name: &str, date: &str, reports: &DocumentLinks) -> String {
    if let Some(stem) = reports.reports.first().map(|url| file_stem(url)) {
        let stem = slug(&stem);
        if !stem.is_empty() {
            return format!("cc-{stem}");
        }
    }
    format!("cc-{}-{date}", slug(name))
}

fn file_stem(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or(url);
    let name = name.split('?').next().unwrap_or(name);
    match name.rfind('.') {
        Some(dot) => name[..dot].to_string(),
        None => name.to_string(),
    }
}

/// Split a cell of concatenated PDF URLs and sort them by kind.
pub fn parse_document_urls(cell: &str) -> DocumentLinks {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)https?://[\s\S]+?\.pdf").expect("valid regex"));

    let mut links = DocumentLinks::default();
    for m in re.find_iter(cell) {
        let raw = m.as_str().trim();
        let filename = raw.rsplit('/').next().unwrap_or(raw).to_string();
        let url = clean_url(raw);
        match classify_filename(&filename) {
            DocumentKind::Report => links.reports.push(url),
            DocumentKind::SecurityTarget => links.targets.push(url),
            DocumentKind::Other => links.other.push(DocumentRef {
                name: filename,
                url,
            }),
        }
    }
    links
}

/// Strip default ports and force HTTPS.
fn clean_url(url: &str) -> String {
    let url = url.replacen(":443/", "/", 1).replacen(":80/", "/", 1);
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => url,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Report,
    SecurityTarget,
    Other,
}

fn classify_filename(filename: &str) -> DocumentKind {
    static CR_WORD: OnceLock<Regex> = OnceLock::new();
    let cr_word = CR_WORD.get_or_init(|| Regex::new(r"\Wcr\W").expect("valid regex"));

    let lower = filename.to_lowercase();
    let report_hints = ["certification", "report", "cert", "rapport", "-cr", "cr[", " cr", "_cr"];
    if report_hints.iter().any(|h| lower.contains(h)) || cr_word.is_match(&lower) {
        return DocumentKind::Report;
    }
    let target_hints = ["st", "security", "target", "cible"];
    if target_hints.iter().any(|h| lower.contains(h)) {
        return DocumentKind::SecurityTarget;
    }
    DocumentKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concatenated_urls() {
        let cell = "http://www.commoncriteriaportal.org:443/files/epfiles/Acme CR v1.pdf \
                    https://www.commoncriteriaportal.org/files/epfiles/acme-st.pdf\
                    https://www.commoncriteriaportal.org/files/epfiles/annex.pdf";
        let links = parse_document_urls(cell);
        assert_eq!(
            links.reports,
            vec!["https://www.commoncriteriaportal.org/files/epfiles/Acme CR v1.pdf"]
        );
        assert_eq!(
            links.targets,
            vec!["https://www.commoncriteriaportal.org/files/epfiles/acme-st.pdf"]
        );
        assert_eq!(links.other.len(), 1);
        assert_eq!(links.other[0].name, "annex.pdf");
    }

    #[test]
    fn test_empty_cell() {
        assert_eq!(parse_document_urls(""), DocumentLinks::default());
        assert_eq!(parse_document_urls("see website"), DocumentLinks::default());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_filename("1234a_pdf_rapport.pdf"), DocumentKind::Report);
        assert_eq!(classify_filename("ANSSI-CC-2024_12fr.pdf"), DocumentKind::Other);
        assert_eq!(classify_filename("cible-securite.pdf"), DocumentKind::SecurityTarget);
    }

    #[test]
    fn test_record_id() {
        let reports = parse_document_urls("https://cc.test/files/BSI-DSZ-CC-1234-2025-CR.pdf");
        assert_eq!(record_id("X", "2025-01-01", &reports), "cc-bsi-dsz-cc-1234-2025-cr");
        assert_eq!(
            record_id("Secure OS v2", "2025-01-01", &DocumentLinks::default()),
            "cc-secure-os-v2-2025-01-01"
        );
    }

    #[test]
    fn test_csv_ignores_unknown_columns() {
        let csv = "Name,Extra,Certification Date,ITSEF\n\"Widget, Pro\",x,2025-01-02,Lab One\n";
        let rows = parse_csv(csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Widget, Pro");
        assert_eq!(rows[0].lab, "Lab One");
        assert_eq!(rows[0].scheme, "");
    }
}
