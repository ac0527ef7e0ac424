//! Feed retrieval over HTTP(S).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::calendar::CalendarSource;
use crate::error::{CoreError, CoreResult};

/// Retrieves the raw feed text for a calendar source.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &CalendarSource) -> CoreResult<String>;
}

/// Rewrite `webcal://` subscription links to `https://`.
pub fn normalize_feed_url(url: &str) -> String {
    let trimmed = url.trim();
    match trimmed.get(..9) {
        Some(scheme) if scheme.eq_ignore_ascii_case("webcal://") => {
            format!("https://{}", &trimmed[9..])
        }
        _ => trimmed.to_string(),
    }
}

fn source_url(source: &CalendarSource) -> CoreResult<String> {
    source
        .feed_url()
        .map(|url| normalize_feed_url(&url))
        .ok_or_else(|| CoreError::Fetch(format!("Source '{}' has no feed URL", source)))
}

/// Fetches feeds with a shared reqwest client.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("famcal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::Fetch(format!("Could not build HTTP client: {}", e)))?;
        Ok(HttpFeedFetcher { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &CalendarSource) -> CoreResult<String> {
        let url = source_url(source)?;
        debug!(%url, "Fetching feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::Fetch(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Fetch(format!("GET {} returned HTTP {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CoreError::Fetch(format!("Failed to read body from {}: {}", url, e)))?;

        if body.trim().is_empty() {
            return Err(CoreError::FeedParse(format!("Feed at {} is empty", url)));
        }

        debug!(%url, bytes = body.len(), "Fetched feed");
        Ok(body)
    }
}

/// Serves canned feed bodies by URL. Unknown URLs behave like an HTTP 404.
#[derive(Default)]
pub struct StaticFeedFetcher {
    feeds: RwLock<HashMap<String, String>>,
}

impl StaticFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the body served for a feed URL.
    pub async fn set(&self, url: &str, body: impl Into<String>) {
        self.feeds
            .write()
            .await
            .insert(normalize_feed_url(url), body.into());
    }

    pub async fn remove(&self, url: &str) {
        self.feeds.write().await.remove(&normalize_feed_url(url));
    }
}

#[async_trait]
impl FeedFetcher for StaticFeedFetcher {
    async fn fetch(&self, source: &CalendarSource) -> CoreResult<String> {
        let url = source_url(source)?;
        self.feeds
            .read()
            .await
            .get(&url)
            .cloned()
            .ok_or_else(|| CoreError::Fetch(format!("GET {} returned HTTP 404 Not Found", url)))
    }
}
