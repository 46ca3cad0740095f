//! reqwest-backed target

use super::{HttpCall, Method, Response, Target, TargetError};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::{Duration, Instant};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP target sharing one pooled client across every virtual user
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTarget {
    /// Create a target for the given base URL with the default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, TargetError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a target with an explicit request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TargetError> {
        let base_url = base_url.into();
        check_base_url(&base_url)?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ticket-surge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TargetError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Full URL for a call path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn classify(&self, err: reqwest::Error) -> TargetError {
        if err.is_timeout() {
            TargetError::Timeout(self.timeout)
        } else if err.is_connect() {
            TargetError::Connect(err.to_string())
        } else {
            TargetError::Request(err.to_string())
        }
    }
}

/// Reject base URLs that are not absolute http(s) URLs
pub fn check_base_url(base_url: &str) -> Result<(), TargetError> {
    let parsed = Url::parse(base_url).map_err(|e| TargetError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TargetError::InvalidUrl {
            url: base_url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(())
}

#[async_trait]
impl Target for HttpTarget {
    async fn send(&self, call: &HttpCall) -> Result<Response, TargetError> {
        let method = match call.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let start = Instant::now();
        let response = self
            .client
            .request(method, self.url(&call.path))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();

        // The body has to be drained for the timing to cover the full transfer
        response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(Response {
            status,
            duration: start.elapsed(),
        })
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
