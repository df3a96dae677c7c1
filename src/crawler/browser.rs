//! Headless Chromium fetch strategy

use crate::crawler::fetcher::{FetchErrorReason, FetchError, FetchedPage, Fetcher};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::time::Duration;
use url::Url;

/// Renders pages in a shared headless Chromium and returns the live DOM
pub struct BrowserFetcher {
    browser: Browser,
}

impl BrowserFetcher {
    /// Launches a headless Chromium instance
    pub async fn launch(user_agent: &str) -> Result<Self, FetchError> {
        let config = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", user_agent))
            .build()
            .map_err(|e| launch_error(format!("failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| launch_error(format!("failed to launch Chromium: {}", e)))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::debug!("browser handler event error");
                }
            }
        });

        tracing::info!("headless browser launched");
        Ok(Self { browser })
    }
}

fn launch_error(message: String) -> FetchError {
    FetchError::new("about:blank", FetchErrorReason::Network, message)
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::new(url.as_str(), FetchErrorReason::Network, e.to_string()))?;

        let result = async {
            match tokio::time::timeout(timeout, page.goto(url.as_str())).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    return Err(FetchError::new(
                        url.as_str(),
                        FetchErrorReason::Network,
                        format!("navigation failed: {}", e),
                    ))
                }
                Err(_) => {
                    return Err(FetchError::new(
                        url.as_str(),
                        FetchErrorReason::Timeout,
                        format!("navigation timed out after {:?}", timeout),
                    ))
                }
            }

            let markup: String = page
                .evaluate("document.documentElement.outerHTML")
                .await
                .map_err(|e| FetchError::new(url.as_str(), FetchErrorReason::Network, e.to_string()))?
                .into_value()
                .map_err(|e| {
                    FetchError::new(url.as_str(), FetchErrorReason::Network, format!("{:?}", e))
                })?;

            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .and_then(|u| Url::parse(&u).ok())
                .unwrap_or_else(|| url.clone());

            Ok(FetchedPage {
                markup,
                final_url,
                status: None,
            })
        }
        .await;

        if let Err(e) = page.close().await {
            tracing::debug!(url = %url, "failed to close browser page: {}", e);
        }
        result
    }
}
