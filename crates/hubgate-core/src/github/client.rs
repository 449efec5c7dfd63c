//! Assembled GitHub REST client

use super::models::{Collaborator, Label, RateLimitOverview, RepoKey};
use crate::config::ClientConfig;
use crate::error::{HubError, HubResult};
use crate::transport::{
    ApiRequest, ApiResponse, CacheStats, EtagTransport, HttpTransport, LoggingTransport,
    RateLimitTransport, RateState, Transport,
};
use reqwest::header::LINK;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// Page size requested from list endpoints
pub const PER_PAGE: u32 = 100;

/// Upper bound on pages fetched for one listing
pub const MAX_PAGES: u32 = 1000;

/// GitHub client over the full transport pipeline
///
/// Requests flow `Logging -> RateLimit -> ConditionalCache -> leaf`. Each
/// client owns its own cache and quota state.
pub struct GithubClient {
    base_url: Url,
    transport: Arc<dyn Transport>,
    cache: Arc<EtagTransport>,
    rate_limit: Arc<RateLimitTransport>,
}

impl GithubClient {
    /// Build a client that talks to the network
    pub fn new(config: &ClientConfig) -> HubResult<Self> {
        let leaf = Arc::new(HttpTransport::new(config)?);
        Self::with_transport(config, leaf)
    }

    /// Build a client over an arbitrary leaf transport
    pub fn with_transport(config: &ClientConfig, leaf: Arc<dyn Transport>) -> HubResult<Self> {
        let mut config = config.clone();
        config.validate()?;

        let cache = Arc::new(EtagTransport::new(leaf));
        let rate_limit = Arc::new(RateLimitTransport::new(
            cache.clone(),
            config.rate_limit.clone(),
        ));
        let transport: Arc<dyn Transport> =
            Arc::new(LoggingTransport::new("GitHub", rate_limit.clone()));

        Ok(Self {
            base_url: config.base_url()?,
            transport,
            cache,
            rate_limit,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Conditional cache layer
    pub fn cache(&self) -> &EtagTransport {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Last quota reported by the server
    pub fn rate_state(&self) -> RateState {
        self.rate_limit.snapshot()
    }

    /// Absolute URL for a path relative to the API root
    pub fn endpoint(&self, path: &str) -> HubResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Send a request through the pipeline without status checking
    pub async fn send(&self, request: ApiRequest) -> HubResult<ApiResponse> {
        self.transport.send(request).await
    }

    /// GET a path and fail on non-success status
    pub async fn get(&self, path: &str) -> HubResult<ApiResponse> {
        let url = self.endpoint(path)?;
        self.send(ApiRequest::get(url)).await?.error_for_status()
    }

    /// GET a path and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> HubResult<T> {
        self.get(path).await?.json()
    }

    /// GET every page of a list endpoint
    #[instrument(skip(self), fields(pages))]
    pub async fn list_all_pages<T: DeserializeOwned>(&self, path: &str) -> HubResult<Vec<T>> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string());

        let mut items = Vec::new();
        let mut pages = 0u32;
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(url.clone()) {
                return Err(HubError::invalid_input(format!(
                    "Pagination link revisits an earlier page: {}",
                    url
                )));
            }
            if pages >= MAX_PAGES {
                return Err(HubError::invalid_input(format!(
                    "Listing {} exceeds {} pages",
                    path, MAX_PAGES
                )));
            }

            let response = self
                .send(ApiRequest::get(url.clone()))
                .await?
                .error_for_status()?;
            let mut page: Vec<T> = response.json()?;
            items.append(&mut page);
            pages += 1;

            match response.header_str(LINK).and_then(next_page_link) {
                Some(next) => url = self.check_same_origin(next)?,
                None => break,
            }
        }

        tracing::Span::current().record("pages", pages);
        debug!(path, pages, items = items.len(), "listing complete");
        Ok(items)
    }

    /// All labels of a repository
    pub async fn list_labels(&self, repo: &RepoKey) -> HubResult<Vec<Label>> {
        self.list_all_pages(&repo.path("labels")).await
    }

    /// All collaborators of a repository
    pub async fn list_collaborators(&self, repo: &RepoKey) -> HubResult<Vec<Collaborator>> {
        self.list_all_pages(&repo.path("collaborators")).await
    }

    /// Current quota buckets; also refreshes the local rate state
    pub async fn rate_limit_overview(&self) -> HubResult<RateLimitOverview> {
        self.get_json("rate_limit").await
    }

    fn check_same_origin(&self, next: Url) -> HubResult<Url> {
        if next.origin() == self.base_url.origin() {
            Ok(next)
        } else {
            Err(HubError::invalid_input(format!(
                "Pagination link points outside the API origin: {}",
                next
            )))
        }
    }
}

/// Extract the `rel="next"` target from a `Link` header
pub fn next_page_link(header: &str) -> Option<Url> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedTransport;

    fn client(upstream: Arc<ScriptedTransport>) -> GithubClient {
        GithubClient::with_transport(&ClientConfig::with_token("t"), upstream).unwrap()
    }

    #[test]
    fn test_next_page_link() {
        let header = r#"<https://api.github.com/repositories/1/labels?per_page=100&page=2>; rel="next", <https://api.github.com/repositories/1/labels?per_page=100&page=5>; rel="last""#;
        let next = next_page_link(header).unwrap();
        assert_eq!(
            next.as_str(),
            "https://api.github.com/repositories/1/labels?per_page=100&page=2"
        );

        let last_page = r#"<https://api.github.com/repositories/1/labels?page=1>; rel="first", <https://api.github.com/repositories/1/labels?page=4>; rel="prev""#;
        assert!(next_page_link(last_page).is_none());
        assert!(next_page_link("").is_none());
    }

    #[tokio::test]
    async fn test_list_all_pages_follows_links() {
        let upstream = ScriptedTransport::new();
        let page2 = r#"<https://api.github.com/repositories/1/labels?per_page=100&page=2>; rel="next""#;
        upstream.push(200, &[("link", page2)], r#"[{"id":1,"name":"bug"},{"id":2,"name":"docs"}]"#);
        upstream.push(200, &[], r#"[{"id":3,"name":"wontfix"}]"#);
        let client = client(upstream.clone());

        let repo = RepoKey::new("octo", "hello").unwrap();
        let labels = client.list_labels(&repo).await.unwrap();

        let names: Vec<_> = labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["bug", "docs", "wontfix"]);

        let requests = upstream.requests();
        assert_eq!(
            requests[0].url.as_str(),
            "https://api.github.com/repos/octo/hello/labels?per_page=100"
        );
        assert_eq!(
            requests[1].url.as_str(),
            "https://api.github.com/repositories/1/labels?per_page=100&page=2"
        );
    }

    #[tokio::test]
    async fn test_list_fails_as_unit_on_later_page_error() {
        let upstream = ScriptedTransport::new();
        let page2 = r#"<https://api.github.com/repositories/1/labels?page=2>; rel="next""#;
        upstream.push(200, &[("link", page2)], r#"[{"id":1,"name":"bug"}]"#);
        upstream.push(500, &[], r#"{"message":"Server Error"}"#);
        let client = client(upstream);

        let repo = RepoKey::new("octo", "hello").unwrap();
        let err = client.list_labels(&repo).await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_pagination_refuses_foreign_origin() {
        let upstream = ScriptedTransport::new();
        let evil = r#"<https://evil.example.com/steal?page=2>; rel="next""#;
        upstream.push(200, &[("link", evil)], "[]");
        let client = client(upstream.clone());

        let repo = RepoKey::new("octo", "hello").unwrap();
        let err = client.list_collaborators(&repo).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidInput { .. }));
        assert_eq!(upstream.call_count(), 1);
    }

    #[tokio::test]
    async fn test_pagination_stops_on_repeated_page() {
        let upstream = ScriptedTransport::new();
        let page2 = r#"<https://api.github.com/repositories/1/labels?page=2>; rel="next""#;
        let back = r#"<https://api.github.com/repositories/1/labels?page=2>; rel="next""#;
        upstream.push(200, &[("link", page2)], r#"[{"id":1,"name":"bug"}]"#);
        upstream.push(200, &[("link", back)], r#"[{"id":2,"name":"docs"}]"#);
        let client = client(upstream.clone());

        let repo = RepoKey::new("octo", "hello").unwrap();
        let err = client.list_labels(&repo).await.unwrap_err();

        assert!(matches!(err, HubError::InvalidInput { ref message } if message.contains("page=2")));
        assert_eq!(upstream.call_count(), 2);
    }

    #[tokio::test]
    async fn test_revalidated_listing_still_follows_pages() {
        let upstream = ScriptedTransport::new();
        let page2 = r#"<https://api.github.com/repositories/1/labels?per_page=100&page=2>; rel="next""#;
        upstream.push(200, &[("etag", "\"p1\""), ("link", page2)], r#"[{"id":1,"name":"bug"}]"#);
        upstream.push(200, &[("etag", "\"p2\"")], r#"[{"id":2,"name":"docs"}]"#);
        upstream.push(304, &[("etag", "\"p1\"")], "");
        upstream.push(304, &[("etag", "\"p2\"")], "");
        let client = client(upstream.clone());

        let repo = RepoKey::new("octo", "hello").unwrap();
        let first = client.list_labels(&repo).await.unwrap();
        let second = client.list_labels(&repo).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second, first);
        assert_eq!(upstream.call_count(), 4);
        assert_eq!(client.cache_stats().hits, 2);
    }

    #[tokio::test]
    async fn test_enterprise_base_url_keeps_path() {
        let upstream = ScriptedTransport::new();
        upstream.push(200, &[], "[]");
        let config = ClientConfig {
            base_url: "https://ghe.example.com/api/v3".to_string(),
            ..Default::default()
        };
        let client = GithubClient::with_transport(&config, upstream.clone()).unwrap();

        let repo = RepoKey::new("octo", "hello").unwrap();
        client.list_collaborators(&repo).await.unwrap();

        assert_eq!(
            upstream.requests()[0].url.as_str(),
            "https://ghe.example.com/api/v3/repos/octo/hello/collaborators?per_page=100"
        );
    }

    #[tokio::test]
    async fn test_pipeline_serves_not_modified_from_cache() {
        let upstream = ScriptedTransport::new();
        upstream.push(
            200,
            &[("etag", "\"abc\""), ("x-ratelimit-remaining", "4999")],
            r#"[{"id":1,"name":"bug"}]"#,
        );
        upstream.push(304, &[("x-ratelimit-remaining", "4999")], "");
        let client = client(upstream);

        let repo = RepoKey::new("octo", "hello").unwrap();
        let first = client.list_labels(&repo).await.unwrap();
        let second = client.list_labels(&repo).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.cache_stats().hits, 1);
        assert_eq!(client.rate_state().remaining, Some(4999));
    }
}
