//! Client identity derivation shared by the rate limiter and the auth gate.
//!
//! # Responsibilities
//! - Pick a client address from proxy headers, in fixed precedence
//! - Validate every candidate against a restrictive IP charset and length
//! - Fall back to a stable fingerprint of browser headers when no address
//!   is usable
//!
//! # Design Decisions
//! - Header values are untrusted: anything malformed is treated as absent
//! - The fallback is prefixed `anon-` so it can never collide with an IP

use std::sync::LazyLock;

use axum::http::{header, HeaderMap};
use regex::Regex;
use sha2::{Digest, Sha256};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Longest textual IPv6 form is 45 characters.
const MAX_IP_LENGTH: usize = 45;

static IP_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F:.]+$").expect("IP charset pattern is valid"));

/// Derive the identity used to key rate limits and WebSocket tokens.
pub fn client_identity(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, X_FORWARDED_FOR)
        .and_then(|v| v.split(',').next())
        .map(str::trim);

    let candidates = [
        forwarded,
        header_str(headers, X_REAL_IP).map(str::trim),
        header_str(headers, CF_CONNECTING_IP).map(str::trim),
    ];

    for candidate in candidates.into_iter().flatten() {
        if is_valid_ip_text(candidate) {
            return candidate.to_string();
        }
    }

    anonymous_identity(headers)
}

fn is_valid_ip_text(value: &str) -> bool {
    !value.is_empty() && value.len() <= MAX_IP_LENGTH && IP_CHARSET.is_match(value)
}

fn anonymous_identity(headers: &HeaderMap) -> String {
    let fingerprint = format!(
        "{}|{}|{}",
        header_str(headers, header::USER_AGENT.as_str()).unwrap_or_default(),
        header_str(headers, header::ACCEPT_LANGUAGE.as_str()).unwrap_or_default(),
        header_str(headers, header::ACCEPT_ENCODING.as_str()).unwrap_or_default(),
    );
    let digest = Sha256::digest(fingerprint.as_bytes());
    format!("anon-{}", hex::encode(&digest[..8]))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_forwarded_for_leftmost_wins() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_identity(&h), "203.0.113.7");
    }

    #[test]
    fn test_precedence_falls_through_invalid_values() {
        let h = headers(&[
            ("x-forwarded-for", "not-an-ip"),
            ("x-real-ip", "<script>"),
            ("cf-connecting-ip", "2001:db8::1"),
        ]);
        assert_eq!(client_identity(&h), "2001:db8::1");
    }

    #[test]
    fn test_overlong_value_rejected() {
        let long = "1".repeat(46);
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_str(&long).unwrap());
        assert!(client_identity(&h).starts_with("anon-"));
    }

    #[test]
    fn test_non_utf8_header_is_ignored() {
        let mut h = HeaderMap::new();
        h.insert("x-real-ip", HeaderValue::from_bytes(b"\xff\xfe").unwrap());
        assert!(client_identity(&h).starts_with("anon-"));
    }

    #[test]
    fn test_anonymous_identity_is_stable() {
        let a = headers(&[("user-agent", "Mozilla/5.0"), ("accept-language", "en")]);
        let b = headers(&[("user-agent", "Mozilla/5.0"), ("accept-language", "en")]);
        let c = headers(&[("user-agent", "curl/8.0")]);
        assert_eq!(client_identity(&a), client_identity(&b));
        assert_ne!(client_identity(&a), client_identity(&c));
        assert_eq!(client_identity(&a).len(), "anon-".len() + 16);
    }
}
