use crate::config::Settings;
use crate::error::{Error, Result};
use crate::feed::parser::FeedParser;
use crate::feed::ParsedFeed;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// HTTP feed retrieval with timeout and retry on temporary failures.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    timeout_duration: Duration,
    retry_attempts: usize,
    user_agent: String,
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            timeout_duration: Duration::from_secs(30),
            retry_attempts: 3,
            user_agent: format!("FeedSift/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new()
            .with_timeout(Duration::from_secs(settings.timeout))
            .with_retries(settings.retry_attempts)
            .with_user_agent(settings.user_agent.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    pub fn with_retries(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Fetch and parse a feed, retrying temporary failures (network errors,
    /// timeouts, server errors) up to the configured attempt count.
    pub async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed> {
        let parser = FeedParser::new();
        parser.validate_feed_url(url)?;

        let mut last_error = None;
        for attempt in 1..=self.retry_attempts {
            match self.fetch_once(url, &parser).await {
                Ok(feed) => return Ok(feed),
                Err(e) if e.is_temporary() && attempt < self.retry_attempts => {
                    warn!(
                        "Fetch attempt {}/{} for {} failed: {}",
                        attempt, self.retry_attempts, url, e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::HttpError(format!("Failed to fetch {}", url))))
    }

    async fn fetch_once(&self, url: &str, parser: &FeedParser) -> Result<ParsedFeed> {
        debug!("Fetching feed from: {}", url);

        let response = timeout(self.timeout_duration, self.send_request(url))
            .await
            .map_err(|_| Error::Timeout(format!("Request to {} timed out", url)))??;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(Error::HttpError(format!(
                "HTTP {} for {}: {}",
                status.as_u16(),
                url,
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| Error::HttpError(format!("Failed to read response body: {}", e)))?;

        debug!("Downloaded {} bytes from {}", content.len(), url);

        parser.parse_feed(std::io::Cursor::new(content))
    }

    async fn send_request(&self, url: &str) -> Result<Response> {
        self.client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header(
                "Accept",
                "application/rss+xml, application/atom+xml, application/xml, text/xml, */*",
            )
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("Request failed: {}", e)))
    }
}
