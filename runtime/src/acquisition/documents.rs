//! Turning fetched documents (HTML pages, PDFs) into plain text.

use super::http_client::{FetchError, Fetcher};
use scraper::{Html, Selector};
use std::sync::OnceLock;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Extract text from a downloaded document.
///
/// PDFs are run through `pdf-extract` on the blocking pool; anything else is
/// taken as (lossy) UTF-8 text.
pub async fn document_text(bytes: Vec<u8>) -> Result<String, FetchError> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| FetchError::Document(format!("pdf worker failed: {e}")))?
        .map_err(|e| FetchError::Document(format!("pdf extraction failed: {e}")))
}

/// Download a document and extract its text.
pub async fn fetch_document_text(fetcher: &dyn Fetcher, url: &str) -> Result<String, FetchError> {
    let bytes = fetcher.fetch_bytes(url).await?;
    document_text(bytes).await
}

/// Fetch an HTML page and return its body text.
pub async fn fetch_page_text(fetcher: &dyn Fetcher, url: &str) -> Result<String, FetchError> {
    let html = fetcher.fetch_text(url).await?;
    Ok(html_body_text(&html))
}

/// Text content of the `<body>` of an HTML document, one text node per line.
///
/// Line structure is kept so label/value extraction (`Label : value`) can
/// stop at the end of a line.
pub fn html_body_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let root = match doc.select(body_selector()).next() {
        Some(body) => body,
        None => doc.root_element(),
    };
    let mut out = String::new();
    for chunk in root.text() {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(chunk);
    }
    out
}

/// Collapse a document into a single line: newlines become spaces and runs of
/// whitespace are squeezed.
pub fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn body_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("body").expect("valid selector"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_body_text_skips_head() {
        let html = "<html><head><title>T</title></head><body><h1>Module</h1>\
                    <p>Supports <b>ML-KEM</b></p></body></html>";
        let text = html_body_text(html);
        assert_eq!(text, "Module\nSupports\nML-KEM");
    }

    #[test]
    fn test_flatten() {
        assert_eq!(flatten("a\n b\r\n\tc  d"), "a b c d");
        assert_eq!(flatten(""), "");
    }

    #[tokio::test]
    async fn test_plain_text_document_passthrough() {
        let text = document_text(b"Security Target\nML-DSA-65".to_vec()).await.unwrap();
        assert_eq!(text, "Security Target\nML-DSA-65");
    }

    #[tokio::test]
    async fn test_broken_pdf_is_document_error() {
        let err = document_text(b"%PDF-1.7 truncated".to_vec()).await.unwrap_err();
        assert!(matches!(err, FetchError::Document(_)));
    }
}
