//! Outbound request pipeline
//!
//! Every layer implements [`Transport`] and owns the next hop as an
//! `Arc<dyn Transport>`. The leaf is [`HttpTransport`]; middleware layers
//! wrap it to add conditional caching, rate-limit handling and logging.
//!
//! At this level a non-2xx status is a normal [`ApiResponse`]. Only failures
//! to complete the exchange at all are returned as errors.

pub mod etag;
pub mod http;
pub mod logging;
pub mod rate_limit;

#[cfg(test)]
pub(crate) mod testing;

pub use etag::{CacheEntry, CacheStats, EtagTransport};
pub use http::HttpTransport;
pub use logging::LoggingTransport;
pub use rate_limit::{RateLimitTransport, RateState};

use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// A request as it travels through the pipeline
///
/// Owned and cloneable so a layer can resend it unchanged.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    /// Create a request with no headers or body
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a GET request
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add or replace a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response as it travels back through the pipeline
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// URL of the request that produced this response
    pub url: Url,
    /// Body was replayed from the conditional cache
    pub from_cache: bool,
}

impl ApiResponse {
    /// Create a response that did not come from the cache
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>, url: Url) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            url,
            from_cache: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header_str(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> HubResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            HubError::decode(format!("Failed to decode response from {}: {}", self.url, e))
        })
    }

    /// Turn a non-success response into an [`HubError::Upstream`]
    pub fn error_for_status(self) -> HubResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(HubError::upstream(
            self.status.as_u16(),
            self.error_message(),
            self.url.as_str(),
        ))
    }

    /// Best-effort error text: GitHub's `message` field, else the raw body
    pub fn error_message(&self) -> String {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            message: String,
        }

        if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(&self.body) {
            return parsed.message;
        }
        let text = String::from_utf8_lossy(&self.body);
        if text.trim().is_empty() {
            self.status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        } else {
            text.chars().take(200).collect()
        }
    }
}

/// One hop of the outbound pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request to the next hop and return its response
    async fn send(&self, request: ApiRequest) -> HubResult<ApiResponse>;
}
