//! Shared HTTP plumbing for providers
//!
//! One reqwest client for every provider, a token bucket per provider and
//! exponential backoff for transient failures (transport errors, 429, 5xx).

use super::extract::extract_text_blocking;
use super::ProviderOutcome;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use once_cell::sync::Lazy;
use refgraph_common::config::{HttpConfig, ProviderConfig};
use refgraph_common::ProviderKind;
use regex_lite::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

static PDF_META_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*name=["']citation_pdf_url["'][^>]*content=["']([^"']+)["']"#)
        .expect("valid regex")
});
static PDF_META_REVERSED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*content=["']([^"']+)["'][^>]*name=["']citation_pdf_url["']"#)
        .expect("valid regex")
});
static HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href=["']([^"'#]+)["']"#).expect("valid regex"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("response exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl FetchError {
    /// Worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// The resource does not exist; a miss rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status(404 | 410))
    }
}

impl From<FetchError> for ProviderOutcome {
    fn from(e: FetchError) -> Self {
        if e.is_not_found() {
            ProviderOutcome::Miss
        } else {
            ProviderOutcome::Error(e.to_string())
        }
    }
}

/// Raw response body with its content type
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub final_url: String,
}

/// Build the client shared by all providers
pub fn build_client(http: &HttpConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(http.user_agent.clone())
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .build()
}

/// Rate-limited, retrying fetcher bound to one provider
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    max_retries: u32,
    max_bytes: usize,
    provider: ProviderKind,
}

impl HttpFetcher {
    pub fn new(client: Client, config: &ProviderConfig, http: &HttpConfig) -> Self {
        let limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));
        Self {
            client,
            limiter,
            max_retries: config.max_retries,
            max_bytes: http.max_download_bytes,
            provider: config.kind,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// GET with rate limiting and retries
    pub async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Downloaded, FetchError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(Duration::from_secs(4))
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build();
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let this = self;

        retry(policy, || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(limiter) = &this.limiter {
                limiter.until_ready().await;
            }
            match this.fetch_once(url, query).await {
                Ok(downloaded) => Ok(downloaded),
                Err(e) if e.is_transient() && attempt < this.max_retries => {
                    debug!(provider = %this.provider, url, attempt, error = %e, "Retrying request");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    async fn fetch_once(&self, url: &str, query: &[(&str, String)]) -> Result<Downloaded, FetchError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(FetchError::TooLarge { limit: self.max_bytes });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if bytes.len() > self.max_bytes {
            return Err(FetchError::TooLarge { limit: self.max_bytes });
        }

        Ok(Downloaded {
            bytes: bytes.to_vec(),
            content_type,
            final_url,
        })
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let downloaded = self.fetch(url, query).await?;
        Ok(String::from_utf8_lossy(&downloaded.bytes).into_owned())
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let downloaded = self.fetch(url, query).await?;
        serde_json::from_slice(&downloaded.bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Download a document and extract its text; `Ok(None)` when it has no usable text
    pub async fn download_document(&self, url: &str) -> Result<Option<String>, FetchError> {
        let downloaded = self.fetch(url, &[]).await?;
        match extract_text_blocking(downloaded.bytes, downloaded.content_type).await {
            Ok(text) => Ok(text),
            Err(e) => {
                debug!(provider = %self.provider, url, error = %e, "Unusable document");
                Ok(None)
            }
        }
    }

    /// Try candidate links in order, returning the first one with text.
    /// Errors only when every attempted link failed with a real error.
    pub async fn first_document(
        &self,
        links: &[String],
        limit: usize,
    ) -> Result<Option<(String, String)>, FetchError> {
        let mut last_error = None;
        let mut clean_miss = false;
        for link in links.iter().take(limit) {
            match self.download_document(link).await {
                Ok(Some(text)) => return Ok(Some((text, link.clone()))),
                Ok(None) => clean_miss = true,
                Err(e) if e.is_not_found() => clean_miss = true,
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) if !clean_miss => Err(e),
            _ => Ok(None),
        }
    }
}

/// PDF links on an HTML page: `citation_pdf_url` meta first, then `.pdf` hrefs
pub fn find_pdf_links(html: &str, base: &str) -> Vec<String> {
    let base = Url::parse(base).ok();
    let mut links: Vec<String> = Vec::new();

    let meta = PDF_META_RE
        .captures_iter(html)
        .chain(PDF_META_REVERSED_RE.captures_iter(html))
        .map(|c| c[1].to_string());
    let hrefs = HREF_RE
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .filter(|href| {
            let lower = href.to_ascii_lowercase();
            lower.contains(".pdf") || lower.contains("/pdf/")
        });

    for raw in meta.chain(hrefs) {
        let raw = raw.replace("&amp;", "&");
        let absolute = match &base {
            Some(base) => base.join(&raw).map(|u| u.to_string()).unwrap_or(raw),
            None => raw,
        };
        if absolute.starts_with("http") && !links.contains(&absolute) {
            links.push(absolute);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Transport("reset".into()).is_transient());
        assert!(FetchError::Status(503).is_transient());
        assert!(FetchError::Status(429).is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(FetchError::Status(404).is_not_found());
        assert!(!FetchError::Decode("bad".into()).is_transient());
    }

    #[test]
    fn test_find_pdf_links() {
        let html = r#"
            <meta name="citation_pdf_url" content="https://example.org/paper.pdf">
            <a href="/files/appendix.PDF">Appendix</a>
            <a href="https://example.org/paper.pdf">dup</a>
            <a href="/about">About</a>
            <a href="https://cdn.example.org/pdf/1234?download=1&amp;x=2">PDF</a>
        "#;
        let links = find_pdf_links(html, "https://example.org/landing/page");
        assert_eq!(
            links,
            vec![
                "https://example.org/paper.pdf".to_string(),
                "https://example.org/files/appendix.PDF".to_string(),
                "https://cdn.example.org/pdf/1234?download=1&x=2".to_string(),
            ]
        );
    }

    #[test]
    fn test_rate_limiter_optional() {
        let mut config = ProviderConfig::new(ProviderKind::Arxiv);
        config.requests_per_second = 0;
        let fetcher = HttpFetcher::new(Client::new(), &config, &HttpConfig::default());
        assert!(fetcher.limiter.is_none());
        assert_eq!(fetcher.provider(), ProviderKind::Arxiv);
    }
}
