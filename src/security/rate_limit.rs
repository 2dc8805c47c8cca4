//! Fixed-window rate limiting middleware.
//!
//! # Responsibilities
//! - Count requests per client identity inside a fixed time window
//! - Reject with 429 and `Retry-After` once the window's budget is spent
//! - Attach `X-RateLimit-*` headers to every limited response
//! - Keep memory bounded: periodic sweep plus a hard entry cap
//!
//! # Design Decisions
//! - Fixed window, not sliding: up to 2x the limit can pass across a window
//!   boundary
//! - Read-check-write happens under one mutex guard, never across `.await`
//! - At the cap, expired entries go first, then the earliest-expiring tenth

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};

use crate::config::RateLimitConfig;
use crate::lifecycle::sweeper::Sweep;
use crate::observability::metrics;
use crate::security::client_identity::client_identity;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Options for a rate limiter instance.
#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    pub window: Duration,
    pub max_requests: u32,
    /// Do not count requests whose response is 2xx.
    pub skip_successful_requests: bool,
    /// Do not count requests whose response is not 2xx.
    pub skip_failed_requests: bool,
    /// Hard cap on tracked identities.
    pub max_entries: usize,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 100,
            skip_successful_requests: false,
            skip_failed_requests: false,
            max_entries: 10_000,
        }
    }
}

impl From<&RateLimitConfig> for RateLimitOptions {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_millis(config.window_ms),
            max_requests: config.max_requests,
            skip_successful_requests: config.skip_successful_requests,
            skip_failed_requests: config.skip_failed_requests,
            max_entries: config.max_entries,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    reset_at: Instant,
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_in: Duration,
    },
    Limited {
        limit: u32,
        reset_in: Duration,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }

    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        let reset_in = match self {
            RateLimitDecision::Allowed { reset_in, .. } | RateLimitDecision::Limited { reset_in, .. } => {
                *reset_in
            }
        };
        let millis = reset_in.as_millis() as u64;
        millis.div_ceil(1000)
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        let (limit, remaining, reset_in) = match *self {
            RateLimitDecision::Allowed { limit, remaining, reset_in } => (limit, remaining, reset_in),
            RateLimitDecision::Limited { limit, reset_in } => (limit, 0, reset_in),
        };
        let reset_epoch = SystemTime::now()
            .checked_add(reset_in)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();

        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_epoch));
    }
}

/// Shared fixed-window counter store.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    options: RateLimitOptions,
}

impl RateLimiter {
    /// A `max_entries` of zero is raised to one: the current client always
    /// needs a slot.
    pub fn new(mut options: RateLimitOptions) -> Self {
        options.max_entries = options.max_entries.max(1);
        Self {
            entries: Mutex::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> &RateLimitOptions {
        &self.options
    }

    /// Count one request from `key`.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let limit = self.options.max_requests;
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");

        if let Some(entry) = entries.get_mut(key) {
            if now <= entry.reset_at {
                let reset_in = entry.reset_at.saturating_duration_since(now);
                if entry.count < limit {
                    entry.count += 1;
                    return RateLimitDecision::Allowed {
                        limit,
                        remaining: limit - entry.count,
                        reset_in,
                    };
                }
                return RateLimitDecision::Limited { limit, reset_in };
            }
        } else if entries.len() >= self.options.max_entries {
            self.make_room(&mut entries, now);
        }

        let reset_at = now + self.options.window;
        entries.insert(key.to_string(), RateLimitEntry { count: 1, reset_at });
        metrics::record_tracked_clients(entries.len());

        RateLimitDecision::Allowed {
            limit,
            remaining: limit.saturating_sub(1),
            reset_in: self.options.window,
        }
    }

    /// Give back one request, used when the response status is not counted.
    pub fn refund(&self, key: &str) {
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        if let Some(entry) = entries.get_mut(key) {
            entry.count = entry.count.saturating_sub(1);
        }
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.entries.lock().expect("rate limiter mutex poisoned").len()
    }

    fn make_room(&self, entries: &mut HashMap<String, RateLimitEntry>, now: Instant) {
        entries.retain(|_, e| now <= e.reset_at);
        if entries.len() < self.options.max_entries {
            return;
        }

        let evict = (self.options.max_entries / 10).clamp(1, entries.len().max(1));
        let mut by_reset: Vec<(Instant, String)> = entries
            .iter()
            .map(|(k, e)| (e.reset_at, k.clone()))
            .collect();
        if by_reset.is_empty() {
            return;
        }
        by_reset.select_nth_unstable_by_key(evict - 1, |(reset_at, _)| *reset_at);
        for (_, key) in by_reset.into_iter().take(evict) {
            entries.remove(&key);
        }

        tracing::warn!(
            evicted = evict,
            max_entries = self.options.max_entries,
            "Rate limiter at capacity, evicted earliest-expiring clients"
        );
    }

    /// Wrap every route of `router` with this limiter.
    pub fn layer_on<S>(self: &Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self.clone(), rate_limit_middleware))
    }
}

impl Sweep for RateLimiter {
    fn store_name(&self) -> &'static str {
        "rate_limit"
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        let before = entries.len();
        entries.retain(|_, e| now <= e.reset_at);
        metrics::record_tracked_clients(entries.len());
        before - entries.len()
    }
}

/// Middleware applying a [`RateLimiter`] keyed by client identity.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_identity(request.headers());
    let decision = limiter.check(&key);

    if !decision.is_allowed() {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        return too_many_requests(&decision);
    }

    let mut response = next.run(request).await;

    let success = response.status().is_success();
    let options = limiter.options();
    if (success && options.skip_successful_requests) || (!success && options.skip_failed_requests) {
        limiter.refund(&key);
    }

    decision.apply_headers(response.headers_mut());
    response
}

fn too_many_requests(decision: &RateLimitDecision) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({ "error": "Too many requests" })),
    )
        .into_response();
    let headers = response.headers_mut();
    decision.apply_headers(headers);
    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after_secs()),
    );
    response
}
