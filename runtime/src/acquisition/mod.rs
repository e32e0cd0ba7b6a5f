//! Fetch layer: HTTP client, document text extraction and batch execution.

pub mod batch;
pub mod documents;
pub mod http_client;

pub use batch::{run_in_batches, BatchPolicy};
pub use documents::{document_text, fetch_document_text, fetch_page_text, flatten, html_body_text};
pub use http_client::{fetch_text_with_retry, FetchError, Fetcher, HttpClient, RetryPolicy};
