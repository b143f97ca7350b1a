//! Per-client fixed-window rate limiter middleware.
//!
//! Each client IP gets a counter that resets once its window has elapsed.
//! Applied to the chat routes so one visitor cannot exhaust the upstream
//! quota for everyone else.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Extension, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::client_ip::ClientIp;
use crate::error::ErrorBody;

/// Stale windows are swept after this many requests.
const CLEANUP_EVERY_REQUESTS: u64 = 512;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Shared state for the rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    /// Maximum requests per client per window; 0 disables the limiter.
    max_requests: u32,
    window: Duration,
    buckets: Arc<DashMap<String, Window>>,
    requests_seen: Arc<AtomicU64>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: Arc::new(DashMap::new()),
            requests_seen: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a limiter allowing `max_requests` per client per minute.
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// Try to acquire a permit for `client`. Returns the time until the
    /// window resets when the request must be refused.
    pub fn try_acquire(&self, client: &str) -> Result<(), Duration> {
        self.try_acquire_at(client, Instant::now())
    }

    fn try_acquire_at(&self, client: &str, now: Instant) -> Result<(), Duration> {
        if !self.is_enabled() {
            return Ok(());
        }

        let decision = match self.buckets.entry(client.to_string()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                let elapsed = now.duration_since(state.started_at);
                if elapsed >= self.window {
                    *state = Window {
                        started_at: now,
                        count: 1,
                    };
                    Ok(())
                } else if state.count < self.max_requests {
                    state.count += 1;
                    Ok(())
                } else {
                    Err(self.window.saturating_sub(elapsed))
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Window {
                    started_at: now,
                    count: 1,
                });
                Ok(())
            }
        };

        let seen = self.requests_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % CLEANUP_EVERY_REQUESTS == 0 {
            let window = self.window;
            self.buckets.retain(|_, state| now.duration_since(state.started_at) < window);
        }

        decision
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

/// Axum middleware that enforces the rate limit per client IP.
pub async fn rate_limit_middleware(
    Extension(limiter): Extension<RateLimiter>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Response {
    match limiter.try_acquire(&ip) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::debug!(ip = %ip, "Chat rate limit exceeded");
            let secs = retry_after.as_secs().max(1);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody::new(
                    "too_many_requests",
                    format!("Rate limit exceeded, retry after {secs}s"),
                )),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            response
        }
    }
}
