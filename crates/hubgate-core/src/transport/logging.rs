//! Request/response tracing layer

use super::{ApiRequest, ApiResponse, Transport};
use crate::error::HubResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Emits a tracing event per exchange
///
/// Only method, URL, status and timing are recorded; headers are never
/// logged, so credentials stay out of the output.
pub struct LoggingTransport {
    inner: Arc<dyn Transport>,
    name: &'static str,
}

impl LoggingTransport {
    pub fn new(name: &'static str, inner: Arc<dyn Transport>) -> Self {
        Self { inner, name }
    }
}

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, request: ApiRequest) -> HubResult<ApiResponse> {
        let method = request.method.clone();
        let url = request.url.clone();
        debug!(api = self.name, %method, %url, "request");

        let start = Instant::now();
        let result = self.inner.send(request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) if response.is_success() => debug!(
                api = self.name,
                %method,
                %url,
                status = response.status.as_u16(),
                cached = response.from_cache,
                elapsed_ms,
                "response"
            ),
            Ok(response) => warn!(
                api = self.name,
                %method,
                %url,
                status = response.status.as_u16(),
                elapsed_ms,
                "non-success response"
            ),
            Err(error) => warn!(
                api = self.name,
                %method,
                %url,
                error = %error,
                elapsed_ms,
                "request failed"
            ),
        }

        result
    }
}
