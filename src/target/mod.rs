//! Target service clients
//!
//! Journeys never talk to the network directly. They describe an [`HttpCall`]
//! and hand it to a [`Target`], which performs it and reports the status and
//! latency. [`http::HttpTarget`] is the real reqwest-backed implementation;
//! tests substitute their own.

pub mod http;

pub use http::{check_base_url, HttpTarget};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// HTTP methods used by the ticket journeys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request against the target, relative to its base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCall {
    pub method: Method,
    pub path: String,
}

impl HttpCall {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
        }
    }
}

impl fmt::Display for HttpCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// What came back from the target
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Time from sending the request until the body was fully received
    pub duration: Duration,
}

/// Transport-level failures. Non-2xx statuses are not errors.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A service under test
#[async_trait]
pub trait Target: Send + Sync {
    /// Perform one call and return the response metadata
    async fn send(&self, call: &HttpCall) -> Result<Response, TargetError>;

    /// Base URL every call path is joined to
    fn base_url(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_call_display() {
        assert_eq!(HttpCall::get("/matches").to_string(), "GET /matches");
        assert_eq!(HttpCall::post("/buy/v1/5").to_string(), "POST /buy/v1/5");
    }

    #[test]
    fn test_method_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Method::Post).unwrap(), "\"POST\"");
    }
}
