//! Blocking HTTP client implementing [`Fetch`].
//!
//! Pacing between chapter requests is the orchestrator's job; this client only sets the
//! User-Agent, timeout, cookie jar and redirect policy, and maps failures to [`ScraperError`].

use super::{Fetch, ScraperError};
use std::time::Duration;
use tracing::debug;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; novel-archiver/0.1; +https://github.com/novel-archiver)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Blocking HTTP client used by the CLI.
#[derive(Debug)]
pub struct HttpClient {
    inner: reqwest::blocking::Client,
}

impl HttpClient {
    /// Build a client with default User-Agent and timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    /// Builder for custom User-Agent and/or timeout.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, ScraperError> {
        debug!(url, "GET");
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

impl Fetch for HttpClient {
    fn fetch_text(&mut self, url: &str) -> Result<String, ScraperError> {
        self.get(url)?.text().map_err(|e| ScraperError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }

    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, ScraperError> {
        self.get(url)?
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ScraperError::BodyRead {
                url: url.to_string(),
                source: e,
            })
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpClient { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let b = HttpClientBuilder::default();
        assert!(b.user_agent.is_none());
        assert_eq!(b.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn builder_overrides() {
        let b = HttpClient::builder().user_agent("Custom/1.0").timeout_secs(5);
        assert_eq!(b.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(b.timeout_secs, 5);
    }
}
