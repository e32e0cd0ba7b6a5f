//! ANSSI scraper: French national Common Criteria certificates.
//!
//! The listing is sorted by certification date, newest first, so the walk
//! stops at the first record older than the recency window. Detail pages are
//! read one by one (the stop condition needs each date); security-target PDFs
//! are then fetched per page in batches.

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
    non_blank, CertificationType, ComplianceRecord, Source, STATUS_ACTIVE, UNKNOWN_VENDOR,
};
use regex::Regex;
use scraper::Html;
use std::collections::HashMap;
use std::sync::OnceLock;

const TAG: &str = "ANSSI";

#[derive(Debug, Clone)]
pub struct AnssiConfig {
    pub base_url: String,
    /// Filtered, date-sorted product list; `&page=N` is appended.
    pub list_url: String,
    pub max_pages: u32,
    pub batch_size: usize,
}

impl Default for AnssiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cyber.gouv.fr".to_string(),
            list_url: "https://cyber.gouv.fr/produits-certifies?sort_bef_combine=field_date_de_certification_value_DESC&type_1%5Bproduit_certifie_cc%5D=produit_certifie_cc&field_categorie_target_id%5B533%5D=533&field_categorie_target_id%5B532%5D=532&field_categorie_target_id%5B541%5D=541&field_categorie_target_id%5B545%5D=545&field_niveau_target_id%5B562%5D=562&field_niveau_target_id%5B564%5D=564&field_niveau_target_id%5B565%5D=565&field_niveau_target_id%5B566%5D=566&field_niveau_target_id%5B567%5D=567".to_string(),
            max_pages: 20,
            batch_size: 5,
        }
    }
}

pub struct AnssiScraper {
    config: AnssiConfig,
}

impl AnssiScraper {
    pub fn new(config: AnssiConfig) -> Self {
        Self { config }
    }
}

/// A list entry.
#[derive(Debug, Clone, PartialEq)]
struct ListItem {
    title: String,
    url: String,
}

/// Everything read from a detail page, before the PDF fetch.
#[derive(Debug, Clone, PartialEq)]
struct CertificateDetail {
    date: Option<NaiveDate>,
    heading: Option<String>,
    vendor: Option<String>,
    reference: Option<String>,
    level: Option<String>,
    augmentation: Option<String>,
    lab: Option<String>,
    category: Option<String>,
    document_url: Option<String>,
}

#[async_trait]
impl Scraper for AnssiScraper {
    fn source(&self) -> Source {
        Source::Anssi
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Harvest> {
        let mut records = Vec::new();
        let mut seen = SeenIds::default();

        for page in 0..self.config.max_pages {
            let page_url = format!("{}&page={page}", self.config.list_url);
            tracing::info!("[{TAG}] Fetching list page {page}...");

            let html = match ctx.fetcher.fetch_text(&page_url).await {
                Ok(html) => html,
                Err(e) if page == 0 => {
                    return Err(e).context("fetching first ANSSI list page");
                }
                Err(e) => {
                    tracing::warn!("[{TAG}] Error on page {page}: {e}");
                    continue;
                }
            };
            let items = parse_list(&html, &self.config.base_url)?;
            if items.is_empty() {
                tracing::info!("[{TAG}] No more items found. Stopping.");
                break;
            }

            let mut kept = Vec::new();
            let mut reached_old = false;
            for item in items {
                let detail_html = match ctx.fetcher.fetch_text(&item.url).await {
                    Ok(html) => html,
                    Err(e) => {
                        tracing::warn!("[{TAG}] skipping {}: {e}", item.url);
                        continue;
                    }
                };
                let detail = parse_detail(&detail_html, &self.config.base_url);
                let date = detail.date.unwrap_or(ctx.today);
                if !ctx.is_recent(date) {
                    tracing::info!("[{TAG}] Encountered old record ({date}). Stopping scraper.");
                    reached_old = true;
                    break;
                }
                let record = build_record(&item, &detail, date);
                if seen.first_time(&record.id) {
                    kept.push((record, detail.document_url));
                }
            }

            let enriched = run_in_batches(
                kept,
                ctx.batch(self.config.batch_size),
                |(mut record, document_url)| async move {
                    if let Some(url) = document_url {
                        match fetch_document_text(ctx.fetcher.as_ref(), &url).await {
                            Ok(text) => {
                                let findings = DetailFindings::from_text(&text);
                                record.pqc_coverage = findings.pqc;
                                record.classical_algorithms = findings.classical;
                                if record.lab.is_none() {
                                    record.lab = findings.lab;
                                }
                            }
                            Err(e) => {
                                tracing::debug!("[{TAG}] PDF error for {}: {e}", record.id)
                            }
                        }
                    }
                    record
                },
            )
            .await;
            records.extend(enriched);

            if reached_old {
                break;
            }
            if !ctx.batch_delay.is_zero() {
                tokio::time::sleep(ctx.batch_delay).await;
            }
        }

        Ok(Harvest::Records(records))
    }
}

fn build_record(item: &ListItem, detail: &CertificateDetail, date: NaiveDate) -> ComplianceRecord {
    let date = date.format("%Y-%m-%d").to_string();
    let product_name = detail
        .heading
        .clone()
        .or_else(|| name_from_url(&item.url))
        .unwrap_or_else(|| item.title.clone());

    let id = match detail.reference.as_deref().map(slug).filter(|s| !s.is_empty()) {
        Some(reference) => reference,
        None => format!(
            "anssi-{}-{date}",
            truncate_chars(&slug(&product_name), 30).trim_end_matches('-')
        ),
    };

    let certification_level = detail.level.as_ref().map(|level| match &detail.augmentation {
        Some(aug) => format!("{level} {aug}"),
        None => level.clone(),
    });

    ComplianceRecord {
        id,
        source: Source::Anssi,
        date,
        link: item.url.clone(),
        record_type: CertificationType::CommonCriteria,
        status: STATUS_ACTIVE.to_string(),
        product_name: truncate_chars(&product_name, 150),
        product_category: detail
            .category
            .clone()
            .unwrap_or_else(|| "Certified Product".to_string()),
        vendor: detail
            .vendor
            .clone()
            .unwrap_or_else(|| UNKNOWN_VENDOR.to_string()),
        lab: detail.lab.clone(),
        certification_level,
        ..Default::default()
    }
}

/// `/produits-certifies/multiapp-52` → `multiapp 52`.
fn name_from_url(url: &str) -> Option<String> {
    let last = url.trim_end_matches('/').rsplit('/').next()?;
    let last = last.split('?').next()?;
    non_blank(last.replace('-', " "))
}

fn parse_list(html: &str, base_url: &str) -> Result<Vec<ListItem>> {
    let doc = Html::parse_document(html);
    let item_sel = selector(".view-content .views-row")?;
    let link_sel = selector("a")?;

    let items = doc
        .select(&item_sel)
        .filter_map(|row| {
            let link = row.select(&link_sel).next()?;
            let href = link.value().attr("href")?;
            let title = element_text(&link);
            Some(ListItem {
                title: if title.is_empty() {
                    "Unknown Product".to_string()
                } else {
                    truncate_chars(&title, 150)
                },
                url: resolve_url(base_url, href),
            })
        })
        .collect();
    Ok(items)
}

fn parse_detail(html: &str, base_url: &str) -> CertificateDetail {
    let doc = Html::parse_document(html);
    let text = html_body_text(html);

    let mut raw_date = None;
    if let Ok(sel) =
        selector("time, .field--name-field-date-de-certification .field__item")
    {
        if let Some(el) = doc.select(&sel).next() {
            raw_date = Some((element_text(&el), el.value().attr("datetime").map(str::to_string)));
        }
    }
    let date = raw_date.and_then(|(text, attr)| {
        parse_french_date(&text).or_else(|| attr.as_deref().and_then(parse_date))
    });

    let mut heading = None;
    if let Ok(sel) = selector("h1") {
        heading = doc
            .select(&sel)
            .next()
            .map(|h| element_text(&h))
            .filter(|h| !h.is_empty());
    }

    let mut pdf_links = Vec::new();
    if let Ok(sel) = selector(r#"a[href$=".pdf"]"#) {
        for a in doc.select(&sel) {
            if let Some(href) = a.value().attr("href") {
                pdf_links.push((resolve_url(base_url, href), element_text(&a).to_lowercase()));
            }
        }
    }

    CertificateDetail {
        date,
        heading,
        vendor: label_value(&text, "Développeur(s)")
            .or_else(|| label_value(&text, "Commanditaire(s)")),
        reference: label_value(&text, "Référence du certificat"),
        level: label_value(&text, "Niveau"),
        augmentation: label_value(&text, "Augmentations"),
        lab: label_value(&text, "Centre d'évaluation"),
        category: label_value(&text, "Catégorie"),
        document_url: pick_document(&pdf_links),
    }
}

/// Security target first, then the certification report, then any PDF.
fn pick_document(links: &[(String, String)]) -> Option<String> {
    let is_target = |(href, text): &&(String, String)| {
        let href = href.to_lowercase();
        let file = href.rsplit('/').next().unwrap_or_default();
        href.contains("cible")
            || href.contains("security_target")
            || file.split(|c: char| !c.is_ascii_alphanumeric()).any(|t| t == "st")
            || text.contains("cible")
            || text.contains("security target")
    };
    let is_report =
        |(href, text): &&(String, String)| text.contains("rapport") || href.contains("ANSSI");

    links
        .iter()
        .find(is_target)
        .or_else(|| links.iter().find(is_report))
        .or_else(|| links.first())
        .map(|(href, _)| href.clone())
}

/// Field labels on a certificate detail page.
const DETAIL_LABELS: &[&str] = &[
    "Développeur(s)",
    "Commanditaire(s)",
    "Référence du certificat",
    "Niveau",
    "Augmentations",
    "Centre d'évaluation",
    "Catégorie",
];

/// Value after `Label :` up to the end of the line. Only [`DETAIL_LABELS`]
/// are recognized.
fn label_value(text: &str, label: &str) -> Option<String> {
    static PATTERNS: OnceLock<HashMap<&'static str, Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        DETAIL_LABELS
            .iter()
            .map(|l| {
                let re = Regex::new(&format!(r"(?i){}\s*:\s*([^\n\r]+)", regex::escape(l)))
                    .expect("valid regex");
                (*l, re)
            })
            .collect()
    });
    patterns
        .get(label)?
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| non_blank(collapse_ws(m.as_str())))
}

/// `DD/MM/YYYY`.
fn parse_french_date(text: &str) -> Option<NaiveDate> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("valid regex"));
    let caps = re.captures(text)?;
    NaiveDate::from_ymd_opt(
        caps[3].parse().ok()?,
        caps[2].parse().ok()?,
        caps[1].parse().ok()?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::{context, StubFetcher};
    use pqc_compliance::types::PqcCoverage;
    use std::sync::Arc;

    const BASE: &str = "https://anssi.test";
    const LIST: &str = "https://anssi.test/produits?sort=desc";

    fn config() -> AnssiConfig {
        AnssiConfig {
            base_url: BASE.to_string(),
            list_url: LIST.to_string(),
            max_pages: 5,
            batch_size: 5,
        }
    }

    fn list_page(slugs: &[&str]) -> String {
        let rows: String = slugs
            .iter()
            .map(|s| format!("<div class=\"views-row\"><a href=\"/produits-certifies/{s}\">{s}</a></div>"))
            .collect();
        format!("<html><body><div class=\"view-content\">{rows}</div></body></html>")
    }

    fn detail_page(date: &str, reference: &str) -> String {
        format!(
            "<html><body><h1>MultiApp 5.2</h1>\
             <div class=\"field--name-field-date-de-certification\"><div class=\"field__item\">{date}</div></div>\
             <p>Développeur(s) : Thales DIS</p>\
             <p>Référence du certificat : {reference}</p>\
             <p>Niveau : EAL5</p><p>Augmentations : ALC_DVS.2, AVA_VAN.5</p>\
             <p>Centre d'évaluation : CEA - LETI</p>\
             <p>Catégorie : Cartes à puce</p>\
             <a href=\"/files/{reference}-rapport.pdf\">Rapport de certification</a>\
             <a href=\"/files/cible-{reference}.pdf\">Cible de sécurité</a>\
             </body></html>"
        )
    }

    #[test]
    fn test_parse_detail_labels() {
        let detail = parse_detail(&detail_page("03/02/2025", "ANSSI-CC-2025/05"), BASE);
        assert_eq!(detail.date, NaiveDate::from_ymd_opt(2025, 2, 3));
        assert_eq!(detail.vendor.as_deref(), Some("Thales DIS"));
        assert_eq!(detail.reference.as_deref(), Some("ANSSI-CC-2025/05"));
        assert_eq!(detail.lab.as_deref(), Some("CEA - LETI"));
        assert_eq!(detail.category.as_deref(), Some("Cartes à puce"));
        assert_eq!(
            detail.document_url.as_deref(),
            Some("https://anssi.test/files/cible-ANSSI-CC-2025/05.pdf")
        );
    }

    #[test]
    fn test_label_value_matches_literal_labels() {
        let text = "Développeur(s) : Thales DIS\nNIVEAU : EAL5+\nCatégorie :   \n";
        assert_eq!(label_value(text, "Développeur(s)").as_deref(), Some("Thales DIS"));
        assert_eq!(label_value(text, "Niveau").as_deref(), Some("EAL5+"));
        assert_eq!(label_value(text, "Catégorie"), None);
        assert_eq!(label_value(text, "Version"), None);
    }

    #[test]
    fn test_french_date_is_day_first() {
        assert_eq!(parse_french_date("01/03/2024"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_french_date("31/02/2024"), None);
    }

    #[tokio::test]
    async fn test_stops_at_first_old_record() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .page(&format!("{LIST}&page=0"), list_page(&["multiapp-52", "old-card", "never-read"]))
                .page(
                    "https://anssi.test/produits-certifies/multiapp-52",
                    detail_page("03/02/2025", "ANSSI-CC-2025/05"),
                )
                .page(
                    "https://anssi.test/produits-certifies/old-card",
                    detail_page("10/01/2020", "ANSSI-CC-2020/01"),
                )
                .page(
                    "https://anssi.test/files/cible-ANSSI-CC-2025/05.pdf",
                    "Security target: ML-DSA-87 and ECDSA P-384",
                ),
        );
        let harvest = AnssiScraper::new(config())
            .scrape(&context(fetcher.clone()))
            .await
            .unwrap();
        let records = harvest.records();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, "anssi-cc-2025-05");
        assert_eq!(r.date, "2025-02-03");
        assert_eq!(r.vendor, "Thales DIS");
        assert_eq!(r.certification_level.as_deref(), Some("EAL5 ALC_DVS.2, AVA_VAN.5"));
        assert_eq!(r.pqc_coverage, PqcCoverage::Algorithms("ML-DSA".into()));
        assert_eq!(r.classical_algorithms.as_deref(), Some("ECDSA (P-384)"));

        let hits = fetcher.hits();
        assert!(!hits.iter().any(|h| h.ends_with("never-read")));
        assert!(!hits.iter().any(|h| h.ends_with("page=1")));
    }

    #[tokio::test]
    async fn test_first_page_failure_is_error() {
        let fetcher = Arc::new(StubFetcher::new());
        assert!(AnssiScraper::new(config()).scrape(&context(fetcher)).await.is_err());
    }
}
