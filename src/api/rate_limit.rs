//! Per-client request limiting.
//!
//! Every request is attributed to a client address (proxy headers first, then
//! the socket peer) and counted in a fixed one-minute window. Requests over
//! the limit are answered with `429` before reaching any handler.

use super::handlers::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};
use tracing::debug;

pub const DEFAULT_RATE_LIMIT: u32 = 100;
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

// Stale windows are dropped once the table grows past this many clients.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    fn check_ip(&self, ip: Option<&str>) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Allows `limit` requests per client address in each `window`.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check_ip(&self, ip: Option<&str>) -> RateLimitDecision {
        // Without an address there is nothing to attribute the request to.
        let Some(ip) = ip else {
            return RateLimitDecision::Allowed;
        };

        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if clients.len() > PRUNE_THRESHOLD {
            let window = self.window;
            clients.retain(|_, entry| now.duration_since(entry.started) < window);
        }

        let entry = clients.entry(ip.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            RateLimitDecision::Limited
        } else {
            entry.count += 1;
            RateLimitDecision::Allowed
        }
    }
}

/// Limiter for `requests` per minute; `0` disables limiting.
#[must_use]
pub fn per_minute(requests: u32) -> Arc<dyn RateLimiter> {
    if requests == 0 {
        Arc::new(NoopRateLimiter)
    } else {
        Arc::new(FixedWindowLimiter::new(requests, RATE_LIMIT_WINDOW))
    }
}

/// Client address as seen through `True-Client-IP`, `X-Real-IP` or the first
/// `X-Forwarded-For` hop, falling back to the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("true-client-ip")
        .or_else(|| header("x-real-ip"))
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

// axum middleware for rate limiting
pub async fn limit_by_ip(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    match limiter.check_ip(ip.as_deref()) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited => {
            debug!("Rate limit exceeded for {:?}", ip);

            ApiError::new(StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(limiter.check_ip(None), RateLimitDecision::Allowed);
        assert_eq!(
            limiter.check_ip(Some("203.0.113.7")),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn limit_applies_per_address() {
        let limiter = FixedWindowLimiter::new(2, RATE_LIMIT_WINDOW);
        let ip = Some("203.0.113.7");

        assert_eq!(limiter.check_ip(ip), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_ip(ip), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_ip(ip), RateLimitDecision::Limited);
        assert_eq!(
            limiter.check_ip(Some("198.51.100.1")),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_resets() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(20));
        let ip = Some("203.0.113.7");

        assert_eq!(limiter.check_ip(ip), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_ip(ip), RateLimitDecision::Limited);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(limiter.check_ip(ip), RateLimitDecision::Allowed);
    }

    #[test]
    fn unknown_address_is_not_limited() {
        let limiter = FixedWindowLimiter::new(1, RATE_LIMIT_WINDOW);
        for _ in 0..3 {
            assert_eq!(limiter.check_ip(None), RateLimitDecision::Allowed);
        }
    }

    #[test]
    fn zero_disables_limiting() {
        let limiter = per_minute(0);
        for _ in 0..3 {
            assert_eq!(
                limiter.check_ip(Some("203.0.113.7")),
                RateLimitDecision::Allowed
            );
        }
    }

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let peer: Option<SocketAddr> = "192.0.2.10:5000".parse().ok();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), Some("192.0.2.10".to_string()));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer), Some("203.0.113.7".to_string()));

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.1"));
        assert_eq!(client_ip(&headers, peer), Some("198.51.100.1".to_string()));

        headers.insert("true-client-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, peer), Some("198.51.100.2".to_string()));

        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
