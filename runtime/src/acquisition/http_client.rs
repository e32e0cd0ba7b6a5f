//! Async HTTP fetch layer wrapping reqwest.
//!
//! Plain GETs with a browser-like identity. Any non-2xx status is an error.
//! There is no retry here; sources known to be flaky go through
//! [`fetch_text_with_retry`] explicitly.

use async_trait::async_trait;
use std::time::Duration;

/// Errors raised by the fetch layer.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("document error: {0}")]
    Document(String),
}

impl FetchError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Transport { .. } => true,
            FetchError::Document(_) => false,
        }
    }
}

/// Anything that can fetch a URL. Scrapers only talk to this trait, so tests
/// can substitute an in-memory implementation.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a URL and return the body as text.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
    /// Fetch a URL and return the raw body.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Bounded retry with exponential backoff: `base_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Retry variant of [`Fetcher::fetch_text`].
///
/// Only transient failures (transport errors, 5xx, 429) are retried.
pub async fn fetch_text_with_retry(
    fetcher: &dyn Fetcher,
    url: &str,
    policy: RetryPolicy,
) -> Result<String, FetchError> {
    let mut retries = 0u32;
    loop {
        match fetcher.fetch_text(url).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_transient() && retries + 1 < policy.attempts.max(1) => {
                retries += 1;
                let delay = policy.delay_for(retries);
                tracing::debug!("retry {retries} for {url} in {delay:?}: {e}");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP client for the scrapers.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for servers that reject HTTP/2.
    h1_client: reqwest::Client,
}

impl HttpClient {
    /// Create a new HTTP client with a standard Chrome user-agent.
    pub fn new(timeout: Duration) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        let h1_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .http1_only()
            .build()
            .unwrap_or_default();

        Self { client, h1_client }
    }

    /// GET a URL, falling back to HTTP/1.1 on protocol errors.
    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                let err_str = format!("{e}");
                if err_str.contains("http2")
                    || err_str.contains("protocol")
                    || err_str.contains("connection closed")
                {
                    self.h1_client
                        .get(url)
                        .send()
                        .await
                        .map_err(|source| transport(url, source))?
                } else {
                    return Err(transport(url, e));
                }
            }
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

fn transport(url: &str, source: reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        source,
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|source| transport(url, source))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|source| transport(url, source))?;
        Ok(bytes.to_vec())
    }
}
