//! Transport authentication gate.
//!
//! # Responsibilities
//! - Issue one-time, IP-bound WebSocket tokens with a short TTL
//! - Validate Basic-Auth credentials in constant time
//! - Decide whether a WebSocket upgrade may proceed
//!
//! # Data Flow
//! ```text
//! POST /api/ws-token (Basic auth) → WsTokenStore::generate(identity)
//! GET  /ws?token=...              → AuthGate::verify_websocket_auth
//!                                     1. valid token        → accept
//!                                     2. no credentials set → accept
//!                                     3. Basic auth         → accept / reject
//! ```
//!
//! # Design Decisions
//! - A token is removed on its first lookup, whatever the outcome
//! - A lookup from the wrong identity burns the token
//! - Every rejection is a bare 401; the reason is only logged

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::lifecycle::sweeper::Sweep;
use crate::observability::metrics;
use crate::security::client_identity::client_identity;

pub const TOKEN_QUERY_PARAM: &str = "token";

const TOKEN_BYTES: usize = 32;

/// Default upper bound on outstanding tokens.
pub const DEFAULT_MAX_TOKENS: usize = 10_000;
const PAD_BYTE: u8 = 0;

/// Why an authentication attempt failed. Never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token invalid or expired")]
    TokenInvalidOrExpired,
    #[error("token presented from a different client")]
    IpMismatch,
    #[error("authentication failed")]
    AuthenticationFailed,
}

impl AuthError {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::TokenInvalidOrExpired => "token_invalid",
            AuthError::IpMismatch => "ip_mismatch",
            AuthError::AuthenticationFailed => "basic_auth",
        }
    }
}

#[derive(Debug, Clone)]
struct WsTokenEntry {
    issued_to: String,
    expiry: Instant,
}

/// One-time WebSocket tokens.
pub struct WsTokenStore {
    tokens: Mutex<HashMap<String, WsTokenEntry>>,
    ttl: Duration,
    max_tokens: usize,
}

impl WsTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Bound the number of outstanding tokens (at least one).
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    /// Issue a token bound to `ip`.
    pub fn generate(&self, ip: &str) -> String {
        self.generate_at(ip, Instant::now())
    }

    fn generate_at(&self, ip: &str, now: Instant) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let entry = WsTokenEntry {
            issued_to: ip.to_string(),
            expiry: now + self.ttl,
        };
        let mut tokens = self.tokens.lock().expect("token store mutex poisoned");
        if tokens.len() >= self.max_tokens {
            self.make_room(&mut tokens, now);
        }
        tokens.insert(token.clone(), entry);
        drop(tokens);

        tracing::debug!(client = %ip, "Issued WebSocket token");
        token
    }

    /// Consume `token` on behalf of `ip`. True only for an unexpired token
    /// issued to the same identity.
    pub fn validate(&self, token: &str, ip: &str) -> bool {
        self.consume(token, ip).is_ok()
    }

    /// Like [`validate`](Self::validate) but reports why a token was refused.
    pub fn consume(&self, token: &str, ip: &str) -> Result<(), AuthError> {
        self.consume_at(token, ip, Instant::now())
    }

    fn consume_at(&self, token: &str, ip: &str, now: Instant) -> Result<(), AuthError> {
        let entry = self
            .tokens
            .lock()
            .expect("token store mutex poisoned")
            .remove(token)
            .ok_or(AuthError::TokenInvalidOrExpired)?;

        if entry.issued_to != ip {
            return Err(AuthError::IpMismatch);
        }
        if now <= entry.expiry {
            Ok(())
        } else {
            Err(AuthError::TokenInvalidOrExpired)
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Purge expired tokens; if still full, drop the earliest-expiring tenth.
    fn make_room(&self, tokens: &mut HashMap<String, WsTokenEntry>, now: Instant) {
        tokens.retain(|_, entry| now <= entry.expiry);
        if tokens.len() < self.max_tokens {
            return;
        }

        let evict = (self.max_tokens / 10).clamp(1, tokens.len());
        let mut by_expiry: Vec<(Instant, String)> = tokens
            .iter()
            .map(|(token, entry)| (entry.expiry, token.clone()))
            .collect();
        by_expiry.select_nth_unstable_by_key(evict - 1, |(expiry, _)| *expiry);
        for (_, token) in by_expiry.into_iter().take(evict) {
            tokens.remove(&token);
        }

        tracing::warn!(
            evicted = evict,
            max_tokens = self.max_tokens,
            "Token store at capacity, evicted earliest-expiring tokens"
        );
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().expect("token store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sweep for WsTokenStore {
    fn store_name(&self) -> &'static str {
        "ws_tokens"
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut tokens = self.tokens.lock().expect("token store mutex poisoned");
        let before = tokens.len();
        tokens.retain(|_, entry| now <= entry.expiry);
        before - tokens.len()
    }
}

/// Configured Basic-Auth credentials.
#[derive(Clone)]
pub struct BasicCredentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Credentials are active only when both parts are configured.
    pub fn from_config(config: &AuthConfig) -> Option<Self> {
        match (&config.username, &config.password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some(Self::new(u, p)),
            _ => None,
        }
    }

    /// Check an `Authorization` header.
    pub fn verify_headers(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let (user, pass) = parse_basic_header(headers).ok_or(AuthError::AuthenticationFailed)?;
        if self.matches(&user, &pass) {
            Ok(())
        } else {
            Err(AuthError::AuthenticationFailed)
        }
    }

    /// Both fields are always compared, so timing does not reveal which one
    /// was wrong.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = timing_safe_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = timing_safe_eq(password.as_bytes(), self.password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}

/// Pad both inputs to the longer length and compare in constant time. The
/// length check is folded in so padding never makes unequal inputs match.
fn timing_safe_eq(supplied: &[u8], expected: &[u8]) -> subtle::Choice {
    let len = supplied.len().max(expected.len());
    let mut a = vec![PAD_BYTE; len];
    let mut b = vec![PAD_BYTE; len];
    a[..supplied.len()].copy_from_slice(supplied);
    b[..expected.len()].copy_from_slice(expected);

    let same_len = (supplied.len() as u64).ct_eq(&(expected.len() as u64));
    a.ct_eq(&b) & same_len
}

fn parse_basic_header(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// The gate consulted for WebSocket upgrades and protected routes.
pub struct AuthGate {
    tokens: Arc<WsTokenStore>,
    basic: Option<BasicCredentials>,
}

impl AuthGate {
    pub fn new(tokens: Arc<WsTokenStore>, basic: Option<BasicCredentials>) -> Self {
        if basic.is_none() {
            tracing::warn!("No Basic-Auth credentials configured; connections are not authenticated");
        }
        Self { tokens, basic }
    }

    pub fn tokens(&self) -> &Arc<WsTokenStore> {
        &self.tokens
    }

    pub fn requires_credentials(&self) -> bool {
        self.basic.is_some()
    }

    /// Decide whether a WebSocket upgrade request may proceed.
    pub fn verify_websocket_auth<B>(&self, request: &Request<B>) -> bool {
        let identity = client_identity(request.headers());

        if let Some(token) = query_token(request.uri().query()) {
            match self.tokens.consume(&token, &identity) {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(client = %identity, reason = e.reason(), "WebSocket token rejected");
                    metrics::record_auth_rejected(e.reason());
                }
            }
        }

        self.verify_basic(request.headers(), &identity).is_ok()
    }

    /// Basic-Auth check; passes when no credentials are configured.
    pub fn verify_basic(&self, headers: &HeaderMap, identity: &str) -> Result<(), AuthError> {
        let Some(basic) = &self.basic else {
            return Ok(());
        };
        basic.verify_headers(headers).inspect_err(|e| {
            tracing::warn!(client = %identity, reason = e.reason(), "Basic authentication failed");
            metrics::record_auth_rejected(e.reason());
        })
    }
}

fn query_token(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == TOKEN_QUERY_PARAM)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Gate for WebSocket upgrade routes.
pub async fn ws_auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if gate.verify_websocket_auth(&request) {
        next.run(request).await
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

/// Gate for ordinary API routes.
pub async fn basic_auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identity = client_identity(request.headers());
    match gate.verify_basic(request.headers(), &identity) {
        Ok(()) => next.run(request).await,
        Err(_) => {
            let mut response = StatusCode::UNAUTHORIZED.into_response();
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"deck-guard\""),
            );
            response
        }
    }
}
