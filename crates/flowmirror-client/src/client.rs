//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::api::{ExecutionsApi, WorkflowsApi};
use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, with_retry};
use crate::types::ListEnvelope;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on cursor pages followed by [`MirrorClient::fetch_all_pages`].
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Header carrying the static API key.
const API_KEY_HEADER: &str = "x-n8n-api-key";

/// Longest error body kept in [`Error::Api`] messages.
const MAX_ERROR_BODY: usize = 512;

/// Upstream automation-engine API client.
///
/// Every request runs under the configured [`RetryPolicy`], with an
/// independent timeout per attempt.
///
/// ```no_run
/// use flowmirror_client::MirrorClient;
///
/// # async fn example() -> flowmirror_client::Result<()> {
/// let client = MirrorClient::builder()
///     .base_url("https://n8n.example.com/api/v1")
///     .api_key("secret")
///     .build()?;
///
/// let workflows = client.workflows().list().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MirrorClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for MirrorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("timeout", &self.inner.timeout)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    retry: RetryPolicy,
    max_pages: usize,
}

impl MirrorClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Retry policy applied to every request.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// Same connection settings with a different retry policy.
    pub fn with_retry_policy(&self, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http: self.inner.http.clone(),
                base_url: self.inner.base_url.clone(),
                timeout: self.inner.timeout,
                retry,
                max_pages: self.inner.max_pages,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the workflows API.
    pub fn workflows(&self) -> WorkflowsApi {
        WorkflowsApi::new(self.clone())
    }

    /// Access the executions API.
    pub fn executions(&self) -> ExecutionsApi {
        ExecutionsApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetch primitives
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner.base_url.join(path).map_err(Error::from)
    }

    /// Fetch a `{ data: [...] }` envelope and return its items.
    pub async fn fetch_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let envelope: ListEnvelope<T> = self.fetch_one(path, query).await?;
        Ok(envelope.data)
    }

    /// Fetch every page of a cursor-paginated list.
    pub async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..self.inner.max_pages {
            let mut page_query = query.to_vec();
            if let Some(c) = &cursor {
                page_query.push(("cursor", c.clone()));
            }

            let envelope: ListEnvelope<T> = self.fetch_one(path, &page_query).await?;
            items.extend(envelope.data);

            match envelope.next_cursor {
                Some(next) if !next.is_empty() => {
                    debug!(path, page, "Following next cursor");
                    cursor = Some(next);
                }
                _ => return Ok(items),
            }
        }

        tracing::warn!(
            path,
            max_pages = self.inner.max_pages,
            "Page limit reached, returning partial list"
        );
        Ok(items)
    }

    /// GET a single JSON document with retries.
    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path)?;
        let retry = self.inner.retry;
        with_retry(&retry, path, || self.attempt(url.clone(), query)).await
    }

    /// One GET attempt under the per-attempt timeout.
    async fn attempt<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        let timeout = self.inner.timeout;
        let response = self
            .inner
            .http
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: truncate(&body, status.canonical_reason().unwrap_or("request failed")),
            });
        }

        let bytes = response.bytes().await.map_err(|e| classify(e, timeout))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> Error {
    if error.is_timeout() {
        Error::Timeout(timeout)
    } else {
        Error::Http(error)
    }
}

fn truncate(body: &str, fallback: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return fallback.to_string();
    }
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

/// Builder for creating a [`MirrorClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    max_pages: usize,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            max_pages: DEFAULT_MAX_PAGES,
            user_agent: None,
        }
    }

    /// Set the API root (e.g. `https://n8n.example.com/api/v1`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the static API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cap the number of cursor pages followed per list.
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<MirrorClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| Error::Config("Invalid API key".to_string()))?;
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("flowmirror/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(MirrorClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
                retry: self.retry,
                max_pages: self.max_pages,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
