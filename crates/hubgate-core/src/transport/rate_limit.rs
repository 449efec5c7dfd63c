//! Quota-aware transport
//!
//! Tracks the quota GitHub reports in `X-RateLimit-*` headers. When the
//! quota is spent, new requests sleep until the reset instant instead of
//! failing; every request parked on the same exhaustion wakes at that same
//! instant. Throttled responses (429, or 403 with an empty quota or a
//! `Retry-After`) are retried a bounded number of times.
//!
//! Connection failures are not retried here.

use super::{ApiRequest, ApiResponse, Transport};
use crate::config::RateLimitConfig;
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Last known quota
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateState {
    /// Requests left in the current window
    pub remaining: Option<u32>,
    /// Size of the window
    pub limit: Option<u32>,
    /// When the window resets
    pub reset_at: Option<Instant>,
    /// Earliest retry after a throttled response, independent of the window
    pub retry_until: Option<Instant>,
}

impl RateState {
    /// Deadline a new request has to wait for, if the quota is spent or the
    /// server asked for a pause
    pub fn blocked_until(&self, now: Instant) -> Option<Instant> {
        let exhausted = match (self.remaining, self.reset_at) {
            (Some(0), Some(reset_at)) if reset_at > now => Some(reset_at),
            _ => None,
        };
        let paused = self.retry_until.filter(|until| *until > now);
        exhausted.max(paused)
    }
}

/// Quota values parsed from one response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Observation {
    remaining: Option<u32>,
    limit: Option<u32>,
    reset_at: Option<Instant>,
    retry_after: Option<Duration>,
}

impl Observation {
    fn parse(response: &ApiResponse, now: Instant) -> Self {
        let number = |name: &str| response.header_str(name).and_then(|v| v.trim().parse::<u64>().ok());

        let reset_at = number(RESET_HEADER).map(|epoch_secs| {
            let delta = (epoch_secs as i64 - Utc::now().timestamp()).max(0) as u64;
            now + Duration::from_secs(delta)
        });

        Self {
            remaining: number(REMAINING_HEADER).map(|v| v.min(u32::MAX as u64) as u32),
            limit: number(LIMIT_HEADER).map(|v| v.min(u32::MAX as u64) as u32),
            reset_at,
            retry_after: response
                .header_str(RETRY_AFTER)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        }
    }

    fn is_rejection(&self, status: StatusCode) -> bool {
        match status {
            StatusCode::TOO_MANY_REQUESTS => true,
            StatusCode::FORBIDDEN => self.remaining == Some(0) || self.retry_after.is_some(),
            _ => false,
        }
    }
}

/// Rate-limit layer
pub struct RateLimitTransport {
    inner: Arc<dyn Transport>,
    config: RateLimitConfig,
    state: Mutex<RateState>,
}

impl RateLimitTransport {
    pub fn new(inner: Arc<dyn Transport>, config: RateLimitConfig) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(RateState::default()),
        }
    }

    /// Current quota as last reported by the server
    pub fn snapshot(&self) -> RateState {
        *self.state.lock()
    }

    /// Record quota information obtained out of band
    pub fn record(&self, remaining: u32, reset_at: Instant) {
        let mut state = self.state.lock();
        state.remaining = Some(remaining);
        state.reset_at = Some(reset_at);
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Sleep while the quota is spent
    ///
    /// All waiters read the same `reset_at` and sleep until it, so they are
    /// released together. The state is re-read after waking in case a
    /// concurrent response moved the deadline.
    async fn wait_for_quota(&self) {
        let cap = Instant::now() + self.config.max_wait;
        loop {
            let now = Instant::now();
            let Some(deadline) = self.state.lock().blocked_until(now) else {
                return;
            };
            if now >= cap {
                warn!("Rate limit wait exceeded max_wait, proceeding anyway");
                return;
            }

            let target = deadline.min(cap);
            warn!(
                wait_secs = (target - now).as_secs_f64(),
                "rate limit exhausted, waiting for reset"
            );
            sleep_until(target).await;
        }
    }

    fn observe(&self, observation: &Observation) {
        if observation.remaining.is_none()
            && observation.limit.is_none()
            && observation.reset_at.is_none()
        {
            return;
        }
        let mut state = self.state.lock();
        if observation.remaining.is_some() {
            state.remaining = observation.remaining;
        }
        if observation.limit.is_some() {
            state.limit = observation.limit;
        }
        if observation.reset_at.is_some() {
            state.reset_at = observation.reset_at;
        }
        debug!(
            remaining = ?state.remaining,
            limit = ?state.limit,
            "rate limit state updated"
        );
    }

    /// Block every request until the server says it may retry
    ///
    /// `Retry-After` wins. The window reset only applies when the quota is
    /// actually spent; a secondary limit without either waits the fallback
    /// delay. The primary window in the state is left as reported.
    fn throttle(&self, observation: &Observation, now: Instant) -> Instant {
        let deadline = match (observation.retry_after, observation.remaining, observation.reset_at) {
            (Some(after), _, _) => now + after,
            (None, Some(0), Some(reset_at)) if reset_at > now => reset_at,
            _ => now + self.config.fallback_delay,
        };
        let deadline = deadline.min(now + self.config.max_wait);

        let mut state = self.state.lock();
        let live = state.retry_until.filter(|until| *until > now);
        state.retry_until = Some(live.map_or(deadline, |until| until.max(deadline)));
        deadline
    }
}

#[async_trait]
impl Transport for RateLimitTransport {
    async fn send(&self, request: ApiRequest) -> HubResult<ApiResponse> {
        let mut retries = 0;

        loop {
            self.wait_for_quota().await;

            let response = self.inner.send(request.clone()).await?;
            let now = Instant::now();
            let observation = Observation::parse(&response, now);
            self.observe(&observation);

            if !observation.is_rejection(response.status) {
                return Ok(response);
            }

            let deadline = self.throttle(&observation, now);
            let wait_secs = (deadline - now).as_secs();

            if retries >= self.config.max_retries {
                warn!(
                    url = %request.url,
                    attempts = retries + 1,
                    "rate limited, retry ceiling reached"
                );
                return Err(HubError::rate_limited(
                    response.status.as_u16(),
                    response.error_message(),
                    request.url.as_str(),
                    Some(wait_secs),
                ));
            }

            retries += 1;
            warn!(
                url = %request.url,
                status = response.status.as_u16(),
                attempt = retries,
                max_retries = self.config.max_retries,
                wait_secs,
                "rate limited by server, retrying after reset"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crate::transport::testing::{ScriptedTransport, url};

    fn config(max_retries: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_retries,
            fallback_delay: Duration::from_secs(60),
            max_wait: Duration::from_secs(3600),
        }
    }

    fn get() -> ApiRequest {
        ApiRequest::get(url("repos/o/r/labels"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_quota_delays_request_until_reset() {
        let upstream = ScriptedTransport::new();
        upstream.push(200, &[], "ok");
        let transport = RateLimitTransport::new(upstream.clone(), config(3));

        let start = Instant::now();
        let reset_at = start + Duration::from_secs(30);
        transport.record(0, reset_at);

        let response = transport.send(get()).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(Instant::now() >= reset_at);
        assert_eq!(upstream.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_requests_released_together() {
        let upstream = ScriptedTransport::new();
        for _ in 0..3 {
            upstream.push(200, &[], "ok");
        }
        let transport = Arc::new(RateLimitTransport::new(upstream.clone(), config(3)));
        let reset_at = Instant::now() + Duration::from_secs(10);
        transport.record(0, reset_at);

        let mut handles = Vec::new();
        for _ in 0..3 {
            let transport = transport.clone();
            handles.push(tokio::spawn(async move {
                transport.send(get()).await.unwrap();
                Instant::now()
            }));
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(upstream.call_count(), 0);

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        assert_eq!(upstream.call_count(), 3);
        assert!(finished.iter().all(|t| *t == finished[0]));
        assert!(finished[0] >= reset_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_too_many_requests() {
        let upstream = ScriptedTransport::new();
        upstream.push(429, &[("retry-after", "5")], r#"{"message":"slow down"}"#);
        upstream.push(200, &[("x-ratelimit-remaining", "10")], "ok");
        let transport = RateLimitTransport::new(upstream.clone(), config(3));

        let start = Instant::now();
        let response = transport.send(get()).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(upstream.call_count(), 2);
        assert_eq!(transport.snapshot().remaining, Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_wins_over_distant_window_reset() {
        let upstream = ScriptedTransport::new();
        let reset_epoch = (Utc::now().timestamp() + 3000).to_string();
        upstream.push(
            429,
            &[
                ("retry-after", "5"),
                ("x-ratelimit-remaining", "4000"),
                ("x-ratelimit-reset", reset_epoch.as_str()),
            ],
            r#"{"message":"secondary rate limit"}"#,
        );
        upstream.push(200, &[("x-ratelimit-remaining", "3999")], "ok");
        upstream.push(200, &[], "ok");
        let transport = RateLimitTransport::new(upstream.clone(), config(3));

        let start = Instant::now();
        transport.send(get()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(transport.snapshot().remaining, Some(3999));

        // The pause is over, so the next request goes straight through
        let before = Instant::now();
        transport.send(get()).await.unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(upstream.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_error_carries_status() {
        let upstream = ScriptedTransport::new();
        upstream.push(403, &[("retry-after", "1")], r#"{"message":"abuse detection"}"#);
        let transport = RateLimitTransport::new(upstream.clone(), config(0));

        let err = transport.send(get()).await.unwrap_err();

        assert_eq!(err.status_code(), Some(403));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retry_ceiling() {
        let upstream = ScriptedTransport::new();
        for _ in 0..3 {
            upstream.push(429, &[("retry-after", "1")], r#"{"message":"slow down"}"#);
        }
        let transport = RateLimitTransport::new(upstream.clone(), config(2));

        let err = transport.send(get()).await.unwrap_err();

        assert!(matches!(err, HubError::RateLimited { ref message, .. } if message == "slow down"));
        assert_eq!(upstream.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_with_empty_quota_is_rate_limit() {
        let upstream = ScriptedTransport::new();
        upstream.push(403, &[("x-ratelimit-remaining", "0")], "");
        upstream.push(200, &[("x-ratelimit-remaining", "4999")], "ok");
        let transport = RateLimitTransport::new(upstream.clone(), config(3));

        let start = Instant::now();
        let response = transport.send(get()).await.unwrap();

        assert!(response.is_success());
        // No reset header: the fallback delay applies
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(upstream.call_count(), 2);
    }

    #[tokio::test]
    async fn test_plain_forbidden_passes_through() {
        let upstream = ScriptedTransport::new();
        upstream.push(403, &[("x-ratelimit-remaining", "12")], r#"{"message":"Must have admin rights"}"#);
        let transport = RateLimitTransport::new(upstream.clone(), config(3));

        let response = transport.send(get()).await.unwrap();

        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(upstream.call_count(), 1);
    }

    #[tokio::test]
    async fn test_state_updated_from_error_response() {
        let upstream = ScriptedTransport::new();
        upstream.push(
            500,
            &[("x-ratelimit-remaining", "41"), ("x-ratelimit-limit", "5000")],
            "",
        );
        let transport = RateLimitTransport::new(upstream, config(3));

        transport.send(get()).await.unwrap();

        let state = transport.snapshot();
        assert_eq!(state.remaining, Some(41));
        assert_eq!(state.limit, Some(5000));
    }

    #[tokio::test]
    async fn test_reset_header_parsed_as_deadline() {
        let upstream = ScriptedTransport::new();
        let reset_epoch = (Utc::now().timestamp() + 120).to_string();
        upstream.push(
            200,
            &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", reset_epoch.as_str())],
            "ok",
        );
        let transport = RateLimitTransport::new(upstream, config(3));

        let before = Instant::now();
        transport.send(get()).await.unwrap();

        let state = transport.snapshot();
        let blocked = state.blocked_until(Instant::now()).unwrap();
        assert!(blocked >= before + Duration::from_secs(118));
        assert!(blocked <= Instant::now() + Duration::from_secs(121));
    }

    #[tokio::test]
    async fn test_transport_error_not_retried() {
        let mut upstream = MockTransport::new();
        upstream
            .expect_send()
            .times(1)
            .returning(|_| Err(HubError::transport("connection refused")));
        let transport = RateLimitTransport::new(Arc::new(upstream), config(3));

        let err = transport.send(get()).await.unwrap_err();
        assert_eq!(err, HubError::transport("connection refused"));
    }

    #[test]
    fn test_blocked_until() {
        let now = Instant::now();
        let state = RateState {
            remaining: Some(0),
            limit: Some(5000),
            reset_at: Some(now + Duration::from_secs(1)),
            retry_until: None,
        };
        assert!(state.blocked_until(now).is_some());
        assert!(state.blocked_until(now + Duration::from_secs(2)).is_none());

        let state = RateState {
            remaining: Some(3),
            ..state
        };
        assert!(state.blocked_until(now).is_none());
        assert!(RateState::default().blocked_until(now).is_none());

        let state = RateState {
            retry_until: Some(now + Duration::from_secs(5)),
            ..state
        };
        assert_eq!(state.blocked_until(now), Some(now + Duration::from_secs(5)));
        assert!(state.blocked_until(now + Duration::from_secs(5)).is_none());
    }
}
