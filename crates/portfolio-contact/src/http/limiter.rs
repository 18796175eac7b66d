//! Per-IP request limiting middleware using a fixed-window counter.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use tracing::debug;

use super::client_ip::resolve_client_ip;
use super::envelope::ApiError;
use super::AppState;

/// In-memory per-IP limiter. `max_requests = 0` disables it.
#[derive(Debug, Clone)]
pub struct RequestLimiter {
    inner: Arc<LimiterInner>,
}

#[derive(Debug)]
struct LimiterInner {
    max_requests: u64,
    window: Duration,
    counters: DashMap<IpAddr, (u64, Instant)>,
}

impl RequestLimiter {
    /// Create a limiter allowing `max_requests` per `window` per IP.
    #[must_use]
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                max_requests,
                window,
                counters: DashMap::new(),
            }),
        }
    }

    /// Whether requests are counted at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.max_requests > 0
    }

    /// The configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Count a request from `ip`. Returns `false` if it is over the limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut entry = self.inner.counters.entry(ip).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= self.inner.window {
            *count = 1;
            *window_start = now;
            true
        } else if *count < self.inner.max_requests {
            *count += 1;
            true
        } else {
            false
        }
    }

    /// Drop counters whose window has passed.
    pub fn cleanup(&self) {
        let window = self.inner.window;
        self.inner
            .counters
            .retain(|_, (_, start)| start.elapsed() < window);
    }

    /// Number of tracked addresses.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.inner.counters.len()
    }
}

/// Reject the request with 429 when the client is over its limit.
pub async fn limit_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.limiter.is_enabled() {
        let ip = resolve_client_ip(
            req.headers(),
            req.extensions(),
            state.trust_forwarded_headers,
        );
        if !state.limiter.check(ip) {
            debug!(%ip, "Request limit exceeded");
            return ApiError::rate_limited().into_response();
        }
    }
    next.run(req).await
}
