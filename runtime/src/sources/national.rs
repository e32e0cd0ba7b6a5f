//! National-scheme scraper: BSI certified-products catalog.
//!
//! The scheme publishes one large PDF instead of a listing. The current PDF
//! link is discovered on a catalog page, downloaded and hashed; an unchanged
//! hash short-circuits the run. A changed document is flattened to one line
//! and carved into records around each certificate reference.
//!
//! Carving is a set of small extractors ([`find_vendor`], [`find_assurance`],
//! [`find_date`]) run over the window that follows a reference, composed by
//! [`carve_records`].

use super::{
    collapse_ws, element_text, resolve_url, selector, truncate_chars, DetailFindings, Harvest,
    ScrapeContext, Scraper, SeenIds,
};
use crate::acquisition::{document_text, flatten};
use crate::cache::{content_hash, DocumentCache};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use pqc_compliance::extraction::extract_lab_from_text;
use pqc_compliance::normalize::parse_date;
use pqc_compliance::types::{
    CertificationType, ComplianceRecord, Source, STATUS_ACTIVE, UNKNOWN_VENDOR,
};
use regex::Regex;
use scraper::Html;
use std::ops::Range;
use std::sync::OnceLock;

const TAG: &str = "BSI";

/// Legal-form suffixes that may follow a whitelisted vendor name.
const LEGAL_FORMS: &str =
    r"(?:AG|GmbH|SE|SAS|Inc|Ltd|Corporation|Corp)\b\.?|S\.A\.S\.|S\.A\.|B\.V\.|N\.V\.|Co\.";

/// Finds the current catalog document on the catalog page.
pub trait DocumentDiscovery: Send + Sync {
    /// Absolute URL of the document, if the page links one.
    fn discover_document_url(&self, catalog_html: &str, base_url: &str) -> Option<String>;
}

/// Picks the first PDF link whose text or target looks like a product catalog.
#[derive(Debug, Clone)]
pub struct CatalogLinkDiscovery {
    pub keywords: Vec<String>,
}

impl Default for CatalogLinkDiscovery {
    fn default() -> Self {
        Self {
            keywords: ["katalog", "catalog", "zertifizierte produkte", "certified products"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl DocumentDiscovery for CatalogLinkDiscovery {
    fn discover_document_url(&self, catalog_html: &str, base_url: &str) -> Option<String> {
        let doc = Html::parse_document(catalog_html);
        let sel = selector("a[href]").ok()?;
        doc.select(&sel).find_map(|a| {
            let href = a.value().attr("href")?;
            let href_lower = href.to_lowercase();
            if !(href_lower.contains(".pdf") || href_lower.contains("publicationfile")) {
                return None;
            }
            let text = element_text(&a).to_lowercase();
            self.keywords
                .iter()
                .any(|k| text.contains(k.as_str()) || href_lower.contains(k.as_str()))
                .then(|| resolve_url(base_url, href))
        })
    }
}

#[derive(Debug, Clone)]
pub struct NationalSchemeConfig {
    pub catalog_url: String,
    /// Certificate reference pattern; every match anchors one record.
    pub reference_pattern: String,
    /// Longest window carved after a reference.
    pub window_chars: usize,
    /// Vendor names recognised in a window.
    pub vendors: Vec<String>,
}

impl Default for NationalSchemeConfig {
    fn default() -> Self {
        Self {
            catalog_url: "https://www.bsi.bund.de/DE/Themen/Unternehmen-und-Organisationen/Standards-und-Zertifizierung/Zertifizierung-und-Anerkennung/Zertifizierung-von-Produkten/Zertifizierung-nach-CC/Zertifizierte-Produkte-nach-CC/zertifizierte-produkte-nach-cc_node.html".to_string(),
            reference_pattern: r"BSI-DSZ-CC-\d{4}(?:-V\d+)?-\d{4}".to_string(),
            window_chars: 600,
            vendors: [
                "Infineon Technologies",
                "NXP Semiconductors",
                "Samsung Electronics",
                "STMicroelectronics",
                "Giesecke+Devrient",
                "Giesecke & Devrient",
                "IDEMIA",
                "Thales",
                "Bundesdruckerei",
                "Veridos",
                "Utimaco",
                "secunet",
                "genua",
                "Rohde & Schwarz",
                "achelos",
                "Atos",
                "Deutsche Telekom",
                "T-Systems",
                "D-Trust",
                "cryptovision",
                "Siemens",
                "Huawei",
                "Cisco",
                "Microsoft",
                "Red Hat",
                "SUSE",
                "Fujitsu",
                "Dermalog",
            ]
            .iter()
            .map(|v| v.to_string())
            .collect(),
        }
    }
}

/// Compiled carving patterns.
#[derive(Debug, Clone)]
pub struct Carver {
    reference: Regex,
    vendors: Vec<Regex>,
    window_chars: usize,
}

impl Carver {
    pub fn new(config: &NationalSchemeConfig) -> Result<Self> {
        let reference = Regex::new(&config.reference_pattern)
            .with_context(|| format!("invalid reference pattern {:?}", config.reference_pattern))?;
        let vendors = config
            .vendors
            .iter()
            .map(|v| {
                Regex::new(&format!(
                    r"\b(?i:{})(?:\s+(?:[A-Z][\w&+.-]*\s+){{0,2}}(?:{LEGAL_FORMS}))?",
                    regex::escape(v)
                ))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("invalid vendor name")?;
        Ok(Self {
            reference,
            vendors,
            window_chars: config.window_chars,
        })
    }
}

/// A field found inside a window: its byte range and text.
#[derive(Debug, Clone, PartialEq)]
pub struct Carved {
    pub range: Range<usize>,
    pub text: String,
}

/// Earliest whitelisted vendor in `window`, with its legal form.
pub fn find_vendor(window: &str, vendors: &[Regex]) -> Option<Carved> {
    vendors
        .iter()
        .filter_map(|re| re.find(window))
        .min_by_key(|m| (m.start(), std::cmp::Reverse(m.end())))
        .map(|m| Carved {
            range: m.range(),
            text: m.as_str().to_string(),
        })
}

/// First assurance marker (`EAL4+`, `EAL5+ (ALC_DVS.2, AVA_VAN.5)`). It closes
/// the category segment that follows the vendor.
pub fn find_assurance(window: &str) -> Option<Carved> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\bEAL\s?[1-7]\+?(?:\s*\([A-Z0-9_.,\s]+\))?").expect("valid regex")
    });
    re.find(window).map(|m| Carved {
        range: m.range(),
        text: collapse_ws(m.as_str()),
    })
}

/// First `DD.MM.YYYY` or ISO date in `window`.
pub fn find_date(window: &str) -> Option<(Range<usize>, NaiveDate)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\b\d{1,2}\.\d{1,2}\.\d{4}\b|\b\d{4}-\d{2}-\d{2}\b").expect("valid regex")
    });
    re.find_iter(window)
        .find_map(|m| parse_date(m.as_str()).map(|d| (m.range(), d)))
}

/// `BSI-DSZ-CC-1234-2024` → 2024-01-01.
fn reference_year_date(reference: &str) -> Option<NaiveDate> {
    let year = reference.rsplit('-').next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Largest char boundary at or below `index`.
fn floor_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// One record per distinct reference in a flattened document.
///
/// The window for a reference runs to the next reference or `window_chars`,
/// whichever is first. Date-less entries fall back to January 1st of the
/// reference year.
pub fn carve_records(text: &str, carver: &Carver, link: &str) -> Vec<ComplianceRecord> {
    let anchors: Vec<_> = carver.reference.find_iter(text).collect();
    let mut seen = SeenIds::default();
    let mut records = Vec::new();

    for (i, anchor) in anchors.iter().enumerate() {
        let reference = anchor.as_str();
        if !seen.first_time(reference) {
            continue;
        }
        let next = anchors.get(i + 1).map(|m| m.start()).unwrap_or(text.len());
        let end = floor_boundary(text, next.min(anchor.end() + carver.window_chars));
        let window = text[anchor.end()..end].trim();

        let vendor = find_vendor(window, &carver.vendors);
        let assurance = find_assurance(window);
        let date = find_date(window);

        let name_end = [
            vendor.as_ref().map(|v| v.range.start),
            assurance.as_ref().map(|a| a.range.start),
            date.as_ref().map(|(r, _)| r.start),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(window.len());
        let product_name = collapse_ws(&window[..name_end]);

        let category = match (&vendor, &assurance) {
            (Some(v), Some(a)) if v.range.end < a.range.start => {
                Some(collapse_ws(&window[v.range.end..a.range.start]))
            }
            _ => None,
        }
        .filter(|c| !c.is_empty());

        let Some(date) = date.map(|(_, d)| d).or_else(|| reference_year_date(reference)) else {
            continue;
        };
        let findings = DetailFindings::from_text(window);
        // A vendor named in the lab whitelist is not the evaluation lab.
        let lab = match &vendor {
            Some(v) => {
                let outside = format!("{} {}", &window[..v.range.start], &window[v.range.end..]);
                extract_lab_from_text(&outside)
            }
            None => findings.lab,
        };

        records.push(ComplianceRecord {
            id: reference.to_string(),
            source: Source::Bsi,
            date: date.format("%Y-%m-%d").to_string(),
            link: link.to_string(),
            record_type: CertificationType::CommonCriteria,
            status: STATUS_ACTIVE.to_string(),
            pqc_coverage: findings.pqc,
            classical_algorithms: findings.classical,
            product_name: if product_name.is_empty() {
                "Unknown Product".to_string()
            } else {
                truncate_chars(&product_name, 150)
            },
            product_category: category.unwrap_or_else(|| "Certified Product".to_string()),
            vendor: vendor
                .map(|v| v.text)
                .unwrap_or_else(|| UNKNOWN_VENDOR.to_string()),
            lab,
            certification_level: assurance.map(|a| a.text),
            ..Default::default()
        });
    }
    records
}

pub struct NationalSchemeScraper {
    config: NationalSchemeConfig,
    carver: Carver,
    cache: DocumentCache,
    discovery: Box<dyn DocumentDiscovery>,
}

impl NationalSchemeScraper {
    pub fn new(config: NationalSchemeConfig, cache: DocumentCache) -> Result<Self> {
        Ok(Self {
            carver: Carver::new(&config)?,
            config,
            cache,
            discovery: Box::new(CatalogLinkDiscovery::default()),
        })
    }

    pub fn with_discovery(mut self, discovery: impl DocumentDiscovery + 'static) -> Self {
        self.discovery = Box::new(discovery);
        self
    }

    /// Discover and download the current document.
    async fn download(&self, ctx: &ScrapeContext) -> Result<(String, Vec<u8>)> {
        let catalog = ctx
            .fetcher
            .fetch_text(&self.config.catalog_url)
            .await
            .context("fetching catalog page")?;
        let url = self
            .discovery
            .discover_document_url(&catalog, &self.config.catalog_url)
            .ok_or_else(|| anyhow!("no catalog document linked from {}", self.config.catalog_url))?;
        tracing::info!("[{TAG}] Discovered document: {url}");
        let bytes = ctx
            .fetcher
            .fetch_bytes(&url)
            .await
            .with_context(|| format!("downloading {url}"))?;
        Ok((url, bytes))
    }
}

#[async_trait]
impl Scraper for NationalSchemeScraper {
    fn source(&self) -> Source {
        Source::Bsi
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Harvest> {
        let key = Source::Bsi.tag();

        let (link, bytes, fresh) = match self.download(ctx).await {
            Ok((url, bytes)) => (url, bytes, true),
            Err(e) => {
                let cached = self.cache.load_document(&key).ok_or_else(|| {
                    e.context("download failed and no cached document is available")
                })?;
                tracing::warn!("[{TAG}] download failed, using cached document");
                (self.config.catalog_url.clone(), cached, false)
            }
        };

        let hash = content_hash(&bytes);
        if fresh && self.cache.stored_hash(&key).as_deref() == Some(hash.as_str()) {
            tracing::info!("[{TAG}] Document unchanged ({}), skipping parse", &hash[..12]);
            return Ok(Harvest::Unchanged);
        }

        let text = flatten(&document_text(bytes.clone()).await.context("extracting document text")?);
        let records: Vec<_> = carve_records(&text, &self.carver, &link)
            .into_iter()
            .filter(|r| {
                NaiveDate::parse_from_str(&r.date, "%Y-%m-%d")
                    .map(|d| ctx.is_recent(d))
                    .unwrap_or(true)
            })
            .collect();
        tracing::info!("[{TAG}] Carved {} recent certificates", records.len());

        if fresh {
            if let Err(e) = self.cache.store(&key, &bytes, &hash) {
                tracing::warn!("[{TAG}] failed to update document cache: {e:#}");
            }
        }
        Ok(Harvest::Records(records))
    }
}
