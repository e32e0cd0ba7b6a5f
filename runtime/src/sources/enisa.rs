//! ENISA scraper: EU cybersecurity certification (EUCC) certificates.
//!
//! Certificate pages are a flat run of `Label value` pairs. A field's value
//! runs from its label to the next known label.

use super::{
    collapse_ws, element_text, resolve_url, selector, slug, truncate_chars, DetailFindings,
    Harvest, ScrapeContext, Scraper, SeenIds,
};
use crate::acquisition::{fetch_document_text, html_body_text, run_in_batches};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use pqc_compliance::normalize::parse_date;
use pqc_compliance::types::{
    non_blank, non_empty, CertificationType, ComplianceRecord, DocumentRef, Source, STATUS_ACTIVE,
    UNKNOWN_VENDOR,
};
use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;

const TAG: &str = "ENISA";

/// Longest field value taken from a certificate page.
const MAX_FIELD_LEN: usize = 300;

/// Labels that open a field on a certificate page.
const FIELD_LABELS: &[&str] = &[
    "Certificate ID",
    "Name of Product",
    "Type of Product",
    "Version of Product",
    "Name of the Holder",
    "Address of the Holder",
    "Contact Information",
    "Website Holder",
    "Name of the certification body",
    "NANDO ID",
    "Address of the certification body",
    "Contact information of the certification body",
    "Name of the ITSEF",
    "Responsible NCCA",
    "Scheme",
    "Reference to the certification",
    "Assurance level",
    "CC Version",
    "CEM Version",
    "AVA_VAN Level",
    "Package",
    "Protection Profile",
    "Year of issuance",
    "Month of Issuance",
    "ID of the Certificate",
    "Modification",
    "Certificate issue date",
    "period of validity",
];

#[derive(Debug, Clone)]
pub struct EnisaConfig {
    pub base_url: String,
    pub list_url: String,
    pub batch_size: usize,
}

impl Default for EnisaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://certification.enisa.europa.eu".to_string(),
            list_url: "https://certification.enisa.europa.eu/certificates_en".to_string(),
            batch_size: 5,
        }
    }
}

pub struct EnisaScraper {
    config: EnisaConfig,
}

impl EnisaScraper {
    pub fn new(config: EnisaConfig) -> Self {
        Self { config }
    }
}

/// Categorized PDF links of a certificate page.
#[derive(Debug, Clone, Default, PartialEq)]
struct Documents {
    reports: Vec<String>,
    targets: Vec<String>,
    other: Vec<DocumentRef>,
    /// The document fed to algorithm extraction.
    primary: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct CertificatePage {
    heading: Option<String>,
    date: Option<NaiveDate>,
    text: String,
    documents: Documents,
}

#[async_trait]
impl Scraper for EnisaScraper {
    fn source(&self) -> Source {
        Source::Enisa
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Harvest> {
        tracing::info!("[{TAG}] Fetching EUCC certificate list from: {}", self.config.list_url);
        let html = ctx
            .fetcher
            .fetch_text(&self.config.list_url)
            .await
            .context("fetching EUCC certificate list")?;

        let detail_urls = parse_list(&html, &self.config.base_url)?;
        if detail_urls.is_empty() {
            tracing::warn!("[{TAG}] No certificate items found; portal layout may have changed");
            return Ok(Harvest::Records(Vec::new()));
        }

        let mut seen = SeenIds::default();
        let mut kept = Vec::new();
        for url in detail_urls {
            let page_html = match ctx.fetcher.fetch_text(&url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!("[{TAG}] skipping {url}: {e}");
                    continue;
                }
            };
            let page = parse_certificate_page(&page_html, &self.config.base_url);
            let date = page.date.unwrap_or(ctx.today);
            if !ctx.is_recent(date) {
                tracing::info!("[{TAG}] Encountered old record ({date}). Stopping scraper.");
                break;
            }
            let record = build_record(&url, &page, date);
            if seen.first_time(&record.id) {
                kept.push((record, page.documents.primary));
            }
        }

        let records = run_in_batches(
            kept,
            ctx.batch(self.config.batch_size),
            |(mut record, primary)| async move {
                if let Some(url) = primary {
                    match fetch_document_text(ctx.fetcher.as_ref(), &url).await {
                        Ok(text) => {
                            let findings = DetailFindings::from_text(&text);
                            record.pqc_coverage = findings.pqc;
                            record.classical_algorithms = findings.classical;
                        }
                        Err(e) => tracing::debug!("[{TAG}] PDF error for {}: {e}", record.id),
                    }
                }
                record
            },
        )
        .await;

        tracing::info!("[{TAG}] Scraped {} EUCC certificates", records.len());
        Ok(Harvest::Records(records))
    }
}

fn build_record(url: &str, page: &CertificatePage, date: NaiveDate) -> ComplianceRecord {
    let text = &page.text;
    let field = |label: &str| labeled_field(text, label);
    let date = date.format("%Y-%m-%d").to_string();

    let product_name = field("Name of Product")
        .or_else(|| page.heading.clone())
        .unwrap_or_else(|| "Unknown Product".to_string());

    let vendor = field("Name of the Holder")
        .or_else(|| field("Holder"))
        .unwrap_or_else(|| UNKNOWN_VENDOR.to_string());
    let lab = field("Name of the ITSEF which performed the evaluation")
        .or_else(|| field("Name of the ITSEF"))
        .or_else(|| field("ITSEF"))
        .or_else(|| field("Evaluation Facility"));

    let level = field("Assurance level")
        .or_else(|| field("EAL"))
        .or_else(|| field("Level"));
    let ava_van = field("AVA_VAN Level");
    let certification_level = field("Package").or(match (level, ava_van) {
        (Some(level), Some(ava)) => Some(format!("{level} (AVA_VAN.{ava})")),
        (Some(level), None) => Some(level),
        (None, Some(ava)) => Some(format!("AVA_VAN.{ava}")),
        (None, None) => None,
    });

    let reference = field("Certificate ID").or_else(|| field("ID of the Certificate"));
    let id = match reference.as_deref().map(slug).filter(|s| !s.is_empty()) {
        Some(reference) => format!("enisa-eucc-{reference}"),
        None => format!(
            "enisa-eucc-{}-{date}",
            truncate_chars(&slug(&product_name), 30).trim_end_matches('-')
        ),
    };

    ComplianceRecord {
        id,
        source: Source::Enisa,
        date,
        link: url.to_string(),
        record_type: CertificationType::Eucc,
        status: STATUS_ACTIVE.to_string(),
        product_name: truncate_chars(&product_name, 150),
        product_category: field("Type of Product")
            .unwrap_or_else(|| "EUCC Certified Product".to_string()),
        vendor,
        lab,
        certification_level,
        certification_report_urls: non_empty(page.documents.reports.clone()),
        security_target_urls: non_empty(page.documents.targets.clone()),
        additional_documents: non_empty(page.documents.other.clone()),
        ..Default::default()
    }
}

fn parse_list(html: &str, base_url: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let item_sel = selector(".certificate-item, .product-item, article")?;
    let link_sel = selector("a")?;

    Ok(doc
        .select(&item_sel)
        .filter_map(|item| item.select(&link_sel).next()?.value().attr("href"))
        .map(|href| resolve_url(base_url, href))
        .collect())
}

fn parse_certificate_page(html: &str, base_url: &str) -> CertificatePage {
    let doc = Html::parse_document(html);

    let mut heading = None;
    if let Ok(sel) = selector("h1") {
        heading = doc
            .select(&sel)
            .next()
            .map(|h| element_text(&h))
            .filter(|h| !h.is_empty());
    }

    let mut date = None;
    for css in ["time", ".certification-date, .date"] {
        let Ok(sel) = selector(css) else { continue };
        if let Some(el) = doc.select(&sel).next() {
            date = parse_date(&element_text(&el))
                .or_else(|| el.value().attr("datetime").and_then(parse_date));
            break;
        }
    }

    let mut links = Vec::new();
    if let Ok(sel) = selector(r#"a[href*=".pdf"]"#) {
        for a in doc.select(&sel) {
            if let Some(href) = a.value().attr("href") {
                links.push((resolve_url(base_url, href), element_text(&a)));
            }
        }
    }

    CertificatePage {
        heading,
        date,
        text: html_body_text(html),
        documents: classify_documents(&links),
    }
}

fn classify_documents(links: &[(String, String)]) -> Documents {
    let mut docs = Documents::default();
    for (url, text) in links {
        let href = url_path(url);
        let label = text.to_lowercase();
        if href.contains("cert")
            || href.contains("report")
            || label.contains("certificate")
            || label.contains("certification report")
        {
            docs.reports.push(url.clone());
        } else if mentions_target(&href, &label) {
            docs.targets.push(url.clone());
        } else {
            docs.other.push(DocumentRef {
                name: if text.is_empty() {
                    "Document".to_string()
                } else {
                    text.clone()
                },
                url: url.clone(),
            });
        }
    }

    docs.primary = links
        .iter()
        .find(|(url, text)| mentions_target(&url_path(url), &text.to_lowercase()))
        .or_else(|| links.first())
        .map(|(url, _)| url.clone());
    docs
}

/// Lowercased path of a link; the host name is not a hint.
fn url_path(link: &str) -> String {
    url::Url::parse(link)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| link.to_lowercase())
}

fn mentions_target(href: &str, label: &str) -> bool {
    let file = href.rsplit('/').next().unwrap_or_default();
    href.contains("security")
        || href.contains("target")
        || file.split(|c: char| !c.is_ascii_alphanumeric()).any(|t| t == "st")
        || label.contains("security target")
}

/// Value of a `Label value` field: the text after `label` up to the next
/// known label. Later occurrences are tried when a value is empty or longer
/// than [`MAX_FIELD_LEN`].
fn labeled_field(text: &str, label: &str) -> Option<String> {
    static STOPS: OnceLock<Regex> = OnceLock::new();
    let stops = STOPS.get_or_init(|| {
        let alternation = FIELD_LABELS
            .iter()
            .map(|l| regex::escape(l))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!("(?i){alternation}")).expect("valid regex")
    });
    // ASCII folding keeps byte offsets valid in `text`.
    let folded = text.to_ascii_lowercase();
    let needle = label.to_ascii_lowercase();
    if needle.is_empty() {
        return None;
    }

    for (start, _) in folded.match_indices(&needle) {
        let rest = &text[start + needle.len()..];
        let end = stops
            .find_iter(rest)
            .find(|stop| !stop.as_str().eq_ignore_ascii_case(label))
            .map(|stop| stop.start())
            .unwrap_or(rest.len());
        let raw = &rest[..end];
        if raw.trim().chars().count() > MAX_FIELD_LEN {
            continue;
        }
        let value = collapse_ws(raw);
        if let Some(value) = non_blank(value.trim_start_matches(|c: char| c == ':' || c.is_whitespace())) {
            return Some(value);
        }
    }
    None
}
