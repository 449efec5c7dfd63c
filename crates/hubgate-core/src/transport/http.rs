//! reqwest-backed leaf transport

use super::{ApiRequest, ApiResponse, Transport};
use crate::config::ClientConfig;
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

/// Media type GitHub recommends for REST calls
pub const GITHUB_JSON: &str = "application/vnd.github+json";

/// Sends requests over the network
///
/// Authentication, the `Accept` header and the user agent are merged in here,
/// below every other layer, and only where the request does not set them. The
/// cache above therefore keys on headers the caller set explicitly; requests
/// through one client all share that client's credential.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    default_headers: HeaderMap,
}

impl HttpTransport {
    /// Build the transport from client configuration
    pub fn new(config: &ClientConfig) -> HubResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| HubError::config(format!("Failed to create HTTP client: {}", e)))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_JSON));
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| HubError::config(format!("Invalid user agent: {}", e)))?,
        );

        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| HubError::config("GitHub token contains invalid characters"))?;
            value.set_sensitive(true);
            default_headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client,
            default_headers,
        })
    }

    /// Headers merged into every request that does not set them itself
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> HubResult<ApiResponse> {
        let ApiRequest {
            method,
            url,
            mut headers,
            body,
        } = request;

        for (name, value) in &self.default_headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }

        let mut builder = self.client.request(method, url.clone()).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HubError::transport_at(e.to_string(), url.as_str()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| HubError::transport_at(e.to_string(), url.as_str()))?;

        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "http exchange complete");

        Ok(ApiResponse::new(status, headers, body, url))
    }
}
