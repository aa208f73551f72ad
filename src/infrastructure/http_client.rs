//! HTTP client for catalog page fetches
//!
//! Every request draws a random client identifier from the configured pool.
//! Transport failures (connect, timeout, DNS, body read) are retried with a
//! fixed delay; any HTTP status is a transport success and non-2xx statuses
//! are handed back to the caller as [`FetchError::Status`] without retrying.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, ClientBuilder, Method};
use std::collections::BTreeMap;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::application::error::FetchError;
use crate::infrastructure::config::FetchConfig;

/// A single request against the source catalog
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    /// Form-encoded body
    pub form: Option<Vec<(String, String)>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: BTreeMap::new(),
            form: None,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            method: Method::POST,
            headers: BTreeMap::new(),
            form: Some(form),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        self.headers
            .extend(headers.iter().map(|(name, value)| (name.clone(), value.clone())));
        self
    }
}

/// Successful (2xx) response body
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Reasons a single attempt did not produce a page
enum AttemptError {
    Status(u16),
    Transport(reqwest::Error),
}

/// Stateless HTTP fetcher; clones share the underlying connection pool
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: FetchConfig,
}

impl HttpClient {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = ClientBuilder::new()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::InvalidRequest {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch a page, retrying transport failures
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let headers = build_headers(request)?;
        let attempts = self.config.max_attempts.max(1);
        let delay = self.config.retry_delay();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!("🌐 HTTP {} (attempt {}/{}): {}", request.method, attempt, attempts, request.url);

            match self.fetch_once(request, headers.clone()).await {
                Ok(page) => return Ok(page),
                Err(AttemptError::Status(status)) => {
                    return Err(FetchError::Status {
                        url: request.url.clone(),
                        status,
                    });
                }
                Err(AttemptError::Transport(e)) => {
                    warn!("Connection error on attempt {}/{} for {}: {}", attempt, attempts, request.url, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            url: request.url.clone(),
            attempts,
            last_error,
        })
    }

    async fn fetch_once(&self, request: &FetchRequest, mut headers: HeaderMap) -> Result<FetchedPage, AttemptError> {
        if let Some(agent) = self.random_user_agent() {
            headers.insert(USER_AGENT, agent);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(headers);
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = builder.send().await.map_err(AttemptError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(AttemptError::Transport)?;
        debug!("✅ {} {} ({} bytes)", status.as_u16(), request.url, body.len());

        Ok(FetchedPage {
            url: request.url.clone(),
            status: status.as_u16(),
            body,
        })
    }

    fn random_user_agent(&self) -> Option<HeaderValue> {
        let agents = &self.config.user_agents;
        if agents.is_empty() {
            return None;
        }
        HeaderValue::from_str(&agents[fastrand::usize(..agents.len())]).ok()
    }
}

fn build_headers(request: &FetchRequest) -> Result<HeaderMap, FetchError> {
    let invalid = |reason: String| FetchError::InvalidRequest {
        url: request.url.clone(),
        reason,
    };

    let mut headers = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| invalid(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| invalid(format!("header value for '{name}': {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
