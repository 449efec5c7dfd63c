//! Conditional-request cache
//!
//! Remembers the validator (`ETag`, or `Last-Modified` when no tag is sent)
//! and body of every successful GET. The next request for the same identity
//! carries the validator as a precondition; a `304 Not Modified` answer is
//! turned back into a `200` carrying the stored body.
//!
//! Entries live for the lifetime of the transport. Nothing is evicted, so
//! memory grows with the number of distinct request identities seen.

use super::{ApiRequest, ApiResponse, Transport};
use crate::error::HubResult;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, ETAG, HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED,
};
use reqwest::{Method, StatusCode};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Server-issued token identifying one version of a representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// Opaque entity tag, echoed back in `If-None-Match`
    ETag(String),
    /// Modification date, echoed back in `If-Modified-Since`
    LastModified(String),
}

impl Validator {
    fn from_response(response: &ApiResponse) -> Option<Self> {
        if let Some(tag) = response.header_str(ETAG) {
            return Some(Self::ETag(tag.to_string()));
        }
        response
            .header_str(LAST_MODIFIED)
            .map(|date| Self::LastModified(date.to_string()))
    }

    fn apply(&self, request: &mut ApiRequest) {
        let (name, value) = match self {
            Self::ETag(tag) => (IF_NONE_MATCH, tag),
            Self::LastModified(date) => (IF_MODIFIED_SINCE, date),
        };
        if let Ok(value) = HeaderValue::from_str(value) {
            request.headers.insert(name, value);
        }
    }
}

/// One cached representation
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Method, URL and representation-affecting headers
    pub identity: String,
    pub validator: Validator,
    pub body: Bytes,
    /// Headers of the stored response, `Link` and `Content-Type` included
    pub headers: HeaderMap,
    pub stored_at: DateTime<Utc>,
}

/// Counters describing cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// `304` answers served from a stored body
    pub hits: u64,
    /// Fresh bodies stored or overwritten
    pub stores: u64,
    /// Responses forwarded without touching the cache
    pub passthroughs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    stores: AtomicU64,
    passthroughs: AtomicU64,
}

/// Conditional-request caching layer
pub struct EtagTransport {
    inner: Arc<dyn Transport>,
    entries: DashMap<String, CacheEntry>,
    counters: Counters,
}

impl EtagTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Cache identity for a request
    ///
    /// Only headers that change the representation take part. The
    /// credential is hashed so it never sits in memory as a map key.
    pub fn cache_key(request: &ApiRequest) -> String {
        let mut key = format!("{} {}", request.method, request.url);

        if let Some(accept) = request.headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
            key.push_str("|accept=");
            key.push_str(accept);
        }
        if let Some(auth) = request.headers.get(AUTHORIZATION) {
            let mut hasher = DefaultHasher::new();
            auth.as_bytes().hash(&mut hasher);
            key.push_str(&format!("|auth={:016x}", hasher.finish()));
        }
        key
    }

    /// Stored entry for an identity
    pub fn get(&self, identity: &str) -> Option<CacheEntry> {
        self.entries.get(identity).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every stored entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            passthroughs: self.counters.passthroughs.load(Ordering::Relaxed),
        }
    }

    /// Rebuild the stored response, overlaid with the headers of the `304`
    fn replay(entry: CacheEntry, not_modified: ApiResponse) -> ApiResponse {
        let mut headers = entry.headers;
        for name in not_modified.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &not_modified.headers {
            headers.append(name.clone(), value.clone());
        }
        ApiResponse {
            status: StatusCode::OK,
            headers,
            body: entry.body,
            url: not_modified.url,
            from_cache: true,
        }
    }

    fn store(&self, identity: String, response: &ApiResponse) -> bool {
        let Some(validator) = Validator::from_response(response) else {
            return false;
        };
        let entry = CacheEntry {
            identity: identity.clone(),
            validator,
            body: response.body.clone(),
            headers: response.headers.clone(),
            stored_at: Utc::now(),
        };
        self.entries.insert(identity, entry);
        true
    }
}

#[async_trait]
impl Transport for EtagTransport {
    async fn send(&self, mut request: ApiRequest) -> HubResult<ApiResponse> {
        if request.method != Method::GET {
            return self.inner.send(request).await;
        }

        let identity = Self::cache_key(&request);
        // Cloned out so no shard lock is held across the await below.
        let cached = self.get(&identity);
        if let Some(entry) = &cached {
            entry.validator.apply(&mut request);
        }

        let response = self.inner.send(request).await?;

        if response.status == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(identity = %identity, "not modified, replaying cached body");
                return Ok(Self::replay(entry, response));
            }
        } else if response.is_success() && self.store(identity, &response) {
            self.counters.stores.fetch_add(1, Ordering::Relaxed);
            return Ok(response);
        }

        self.counters.passthroughs.fetch_add(1, Ordering::Relaxed);
        Ok(response)
    }
}
