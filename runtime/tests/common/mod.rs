//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use compliance_runtime::acquisition::{FetchError, Fetcher};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory fetcher. Unknown URLs answer 404.
#[derive(Default)]
pub struct MapFetcher {
    pages: HashMap<String, Vec<u8>>,
    failures: HashMap<String, u16>,
    hits: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    pub fn fail(mut self, url: &str, status: u16) -> Self {
        self.failures.insert(url.to_string(), status);
        self
    }

    pub fn hit_count(&self, url: &str) -> usize {
        self.hits
            .lock()
            .map(|h| h.iter().filter(|u| *u == url).count())
            .unwrap_or(0)
    }

    fn lookup(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Ok(mut hits) = self.hits.lock() {
            hits.push(url.to_string());
        }
        if let Some(status) = self.failures.get(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            });
        }
        self.pages.get(url).cloned().ok_or(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.lookup(url)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.lookup(url)
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

pub const CSV_URL: &str = "https://cc.test/products/certified_products.csv";
pub const LISTING_URL: &str = "https://cc.test/products/";
pub const REPORT_URL: &str = "https://cc.test/files/epfiles/1234_CR.pdf";
pub const TARGET_URL: &str = "https://cc.test/files/epfiles/1234_ST.pdf";
pub const BROKEN_REPORT_URL: &str = "https://cc.test/files/epfiles/5678_CR.pdf";
pub const BROKEN_TARGET_URL: &str = "https://cc.test/files/epfiles/5678_ST.pdf";

/// Bulk CSV with one stale row and two recent ones.
pub fn products_csv() -> String {
    format!(
        "Category,Name,Manufacturer,Scheme,Assurance Level,Certification Date,Certification Report URL,Security Target URL\n\
         Smart Cards,Old Card OS,Legacy Inc,FR,EAL4+,2019-04-01,https://cc.test/files/epfiles/0001_CR.pdf,\n\
         Network Devices,Quantum Gateway,Acme Corp,DE,EAL4+ ALC_FLR.2,2025-03-01,{REPORT_URL},{TARGET_URL}\n\
         Key Management,Vault Appliance,Beta Systems,NL,EAL2,2025-01-20,{BROKEN_REPORT_URL},{BROKEN_TARGET_URL}\n"
    )
}

pub const TARGET_TEXT: &str = "Security Target. The TOE implements ML-KEM [768] for key \
    establishment and ML-DSA for signatures, next to RSA (3072) and ECDSA (P-256).";

pub const REPORT_TEXT: &str = "Certification Report. Evaluation facility: SRC Security \
    Research & Consulting GmbH. The product uses AES (256).";

/// Fetcher serving the CSV above; the second product's documents are missing.
pub fn cc_fetcher() -> MapFetcher {
    MapFetcher::new()
        .page(CSV_URL, products_csv())
        .page(REPORT_URL, REPORT_TEXT)
        .page(TARGET_URL, TARGET_TEXT)
        .fail(BROKEN_REPORT_URL, 404)
        .fail(BROKEN_TARGET_URL, 500)
}
