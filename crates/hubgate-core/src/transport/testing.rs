//! Scripted transport used by unit tests

use super::{ApiRequest, ApiResponse, Transport};
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Replays queued responses in order and records every request it sees
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<HubResult<(u16, Vec<(String, String)>, String)>>>,
    requests: Mutex<Vec<ApiRequest>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Default::default()
        })
    }

    pub fn push(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.script
            .lock()
            .push_back(Ok((status, headers, body.to_string())));
    }

    pub fn push_error(&self, error: HubError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> HubResult<ApiResponse> {
        let url = request.url.clone();
        self.requests.lock().push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(HubError::transport("script exhausted")));
        let (status, headers, body) = next?;
        Ok(response(status, &headers, &body, url))
    }
}

pub(crate) fn response(status: u16, headers: &[(String, String)], body: &str, url: Url) -> ApiResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    ApiResponse::new(
        StatusCode::from_u16(status).unwrap(),
        map,
        body.to_string(),
        url,
    )
}

pub(crate) fn url(path: &str) -> Url {
    Url::parse("https://api.github.com/").unwrap().join(path).unwrap()
}
