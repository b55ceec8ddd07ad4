use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::types::{PageRequest, SearchPage};
use crate::config::SearchConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Search API key not configured (set SERPER_API_KEY or [search] api_key)")]
    MissingApiKey,
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

impl FetchError {
    /// Returns true if this error is transient and the request should be
    /// retried. Rate limiting (429) and server errors are transient; other
    /// client errors mean the request itself is wrong and will not heal.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) => true,
            FetchError::HttpStatus(status) => *status == 429 || *status >= 500,
            FetchError::MissingApiKey
            | FetchError::InsecureBaseUrl
            | FetchError::InvalidBody(_) => false,
        }
    }
}

/// Request body for the provider's `/news` endpoint.
#[derive(Debug, Serialize)]
struct NewsQuery<'a> {
    q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tbs: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gl: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    num: u32,
    page: u32,
}

/// Client for one news search provider endpoint.
///
/// Holds the HTTP client, credentials, and the retry policy applied to
/// each page fetch. Cheap to clone is not a goal; callers share it by
/// reference. `SecretString` keeps the key out of Debug output.
#[derive(Debug)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    page_size: u32,
    timeout: Duration,
    retry: RetryPolicy,
}

impl SearchClient {
    /// Build a client from configuration.
    ///
    /// Fails fast when no API key is configured or when the base URL is
    /// plain HTTP on a non-localhost host. The key would otherwise travel
    /// unencrypted in the `X-API-KEY` header.
    pub fn new(cfg: &SearchConfig, retry: RetryPolicy) -> Result<Self, FetchError> {
        let api_key = match cfg.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => SecretString::from(key),
            _ => return Err(FetchError::MissingApiKey),
        };

        let base = cfg.base_url.trim_end_matches('/').to_string();
        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                return Err(FetchError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base, "Using non-HTTPS search base URL (localhost only)");
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base,
            api_key,
            page_size: cfg.page_size,
            timeout: cfg.timeout(),
            retry,
        })
    }

    /// Results requested per page. Pagination stop heuristics compare
    /// returned item counts against this.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch one page of news results for a site-restricted query.
    ///
    /// Transient failures (timeouts, network errors, 429, 5xx) are retried
    /// per the configured policy; other HTTP errors and malformed bodies
    /// surface immediately.
    pub async fn fetch_page(&self, req: &PageRequest<'_>) -> Result<SearchPage, FetchError> {
        let url = format!("{}/news", self.base_url);
        let query = format!("site:{}", req.site);

        let page = self
            .retry
            .run("news page fetch", FetchError::is_retryable, || {
                self.fetch_once(&url, &query, req)
            })
            .await?;

        debug!(
            site = req.site,
            page = req.page,
            items = page.items.len(),
            credits = page.credits,
            echoed = %page.search_parameters,
            "Fetched news page"
        );
        Ok(page)
    }

    async fn fetch_once(
        &self,
        url: &str,
        query: &str,
        req: &PageRequest<'_>,
    ) -> Result<SearchPage, FetchError> {
        let body = NewsQuery {
            q: query,
            tbs: req.time_filter,
            gl: req.geo.gl.as_deref(),
            location: req.geo.location.as_deref(),
            num: self.page_size,
            page: req.page,
        };

        let request = self
            .http
            .post(url)
            .header("X-API-KEY", self.api_key.expose_secret())
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
            .map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // Transport failures while reading the body are retryable; a body
        // that arrived intact but does not parse is not.
        let bytes = response.bytes().await.map_err(FetchError::Network)?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::InvalidBody(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
