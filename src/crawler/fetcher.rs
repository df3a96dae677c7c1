//! Page fetching
//!
//! The crawl core only sees the [`Fetcher`] capability: give it a URL and a
//! timeout, get back markup and the final URL after redirects, or a
//! [`FetchError`] tagged with why it failed. Two strategies implement it:
//! [`HttpFetcher`] (reqwest) here and `BrowserFetcher` (headless Chromium)
//! in the `browser` module.

use crate::config::FetchConfig;
use crate::ErrorClass;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed per fetch
const MAX_REDIRECTS: usize = 10;

/// Markup retrieved for one URL
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub markup: String,
    /// URL after redirects
    pub final_url: Url,
    /// HTTP status, when the strategy exposes one
    pub status: Option<u16>,
}

/// Why a fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorReason {
    Timeout,
    Network,
    InvalidUrl,
    Blocked,
}

impl FetchErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::InvalidUrl => "invalid_url",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for FetchErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed fetch
#[derive(Debug, Clone, Error)]
#[error("{reason} fetching {url}: {message}")]
pub struct FetchError {
    pub url: String,
    pub reason: FetchErrorReason,
    pub message: String,
}

impl FetchError {
    pub fn new(url: impl Into<String>, reason: FetchErrorReason, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason,
            message: message.into(),
        }
    }

    /// Timeouts and network errors are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self.reason, FetchErrorReason::Timeout | FetchErrorReason::Network)
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_transient() {
            ErrorClass::TransientExternal
        } else {
            ErrorClass::PermanentSkip
        }
    }
}

/// Capability to turn a URL into markup
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetch configuration (user agent, timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use intent_crawler::config::FetchConfig;
/// use intent_crawler::crawler::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages with a plain HTTP GET
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// # Status Mapping
    ///
    /// | Condition | Reason |
    /// |-----------|--------|
    /// | Request timeout | Timeout |
    /// | Connection error, HTTP 5xx, broken body | Network |
    /// | HTTP 401, 403, 429, 451 | Blocked |
    /// | HTTP 404, 410, other 4xx, too many redirects | InvalidUrl |
    /// | Non-HTML Content-Type | InvalidUrl |
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_request_error(url, &e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if let Some(reason) = classify_status(status) {
            return Err(FetchError::new(
                url.as_str(),
                reason,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        if let Some(ct) = content_type.as_deref() {
            if !is_html_content_type(ct) {
                return Err(FetchError::new(
                    url.as_str(),
                    FetchErrorReason::InvalidUrl,
                    format!("expected HTML, got {}", ct),
                ));
            }
        }

        let markup = response
            .text()
            .await
            .map_err(|e| classify_request_error(url, &e))?;

        Ok(FetchedPage {
            markup,
            final_url,
            status: Some(status.as_u16()),
        })
    }
}

/// Returns the failure reason for a non-success status, or None for 2xx/3xx
fn classify_status(status: StatusCode) -> Option<FetchErrorReason> {
    match status.as_u16() {
        401 | 403 | 429 | 451 => Some(FetchErrorReason::Blocked),
        400..=499 => Some(FetchErrorReason::InvalidUrl),
        500..=599 => Some(FetchErrorReason::Network),
        _ => None,
    }
}

fn classify_request_error(url: &Url, e: &reqwest::Error) -> FetchError {
    let reason = if e.is_timeout() {
        FetchErrorReason::Timeout
    } else if e.is_redirect() || e.is_builder() {
        FetchErrorReason::InvalidUrl
    } else {
        FetchErrorReason::Network
    };
    FetchError::new(url.as_str(), reason, e.to_string())
}

fn is_html_content_type(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}
