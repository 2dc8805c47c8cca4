//! Rate limiting through the assembled router.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use tower::ServiceExt;

use deck_guard::security::rate_limit::{RateLimitOptions, RateLimiter};
use deck_guard::GuardServer;

mod common;

fn limited_app(options: RateLimitOptions) -> (Router, Arc<RateLimiter>) {
    let limiter = Arc::new(RateLimiter::new(options));
    let router = Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/fail", get(|| async { (StatusCode::BAD_REQUEST, "bad") }));
    (limiter.layer_on(router), limiter)
}

fn request(path: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_sixth_request_gets_429_with_headers() {
    let (app, _) = limited_app(RateLimitOptions {
        window: Duration::from_secs(10),
        max_requests: 5,
        ..Default::default()
    });

    for i in 0..5 {
        let res = app.clone().oneshot(request("/ok", "1.2.3.4")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-limit"], "5");
        assert_eq!(res.headers()["x-ratelimit-remaining"], (4 - i).to_string().as_str());
        assert!(res.headers().contains_key("x-ratelimit-reset"));
    }

    for _ in 5..10 {
        let res = app.clone().oneshot(request("/ok", "1.2.3.4")).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
        let retry: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
        assert!((1..=10).contains(&retry));

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Too many requests");
    }

    // A different identity is unaffected.
    let res = app.clone().oneshot(request("/ok", "5.6.7.8")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_window_expiry_readmits() {
    let (app, _) = limited_app(RateLimitOptions {
        window: Duration::from_millis(200),
        max_requests: 1,
        ..Default::default()
    });

    assert_eq!(app.clone().oneshot(request("/ok", "9.9.9.9")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        app.clone().oneshot(request("/ok", "9.9.9.9")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(app.clone().oneshot(request("/ok", "9.9.9.9")).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_skip_successful_requests() {
    let (app, _) = limited_app(RateLimitOptions {
        window: Duration::from_secs(10),
        max_requests: 2,
        skip_successful_requests: true,
        ..Default::default()
    });

    for _ in 0..10 {
        let res = app.clone().oneshot(request("/ok", "1.1.1.1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    // Failures still count.
    for _ in 0..2 {
        let res = app.clone().oneshot(request("/fail", "1.1.1.1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
    let res = app.clone().oneshot(request("/fail", "1.1.1.1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_skip_failed_requests() {
    let (app, _) = limited_app(RateLimitOptions {
        window: Duration::from_secs(10),
        max_requests: 1,
        skip_failed_requests: true,
        ..Default::default()
    });

    for _ in 0..5 {
        let res = app.clone().oneshot(request("/fail", "2.2.2.2")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(app.clone().oneshot(request("/ok", "2.2.2.2")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        app.clone().oneshot(request("/ok", "2.2.2.2")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_fifteen_thousand_identities() {
    let (app, limiter) = limited_app(RateLimitOptions::default());

    for i in 0..15_000u32 {
        let ip = format!("10.{}.{}.{}", i >> 16, (i >> 8) & 0xff, i & 0xff);
        let res = app.clone().oneshot(request("/ok", &ip)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    assert!(limiter.tracked() <= limiter.options().max_entries);
}

#[tokio::test]
async fn test_malformed_forwarding_headers_still_limited() {
    let (app, _) = limited_app(RateLimitOptions {
        window: Duration::from_secs(10),
        max_requests: 1,
        ..Default::default()
    });

    let spoof = |value: &str| {
        Request::builder()
            .uri("/ok")
            .header("x-forwarded-for", value)
            .header("user-agent", "same-browser")
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.clone().oneshot(spoof("garbage-1")).await.unwrap().status(), StatusCode::OK);
    // Different junk does not yield a fresh identity.
    assert_eq!(
        app.clone().oneshot(spoof("garbage-2")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_server_health_is_not_limited() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = common::test_config(dir.path());
    config.rate_limit.max_requests = 1;
    let app = GuardServer::new(config).router();

    for _ in 0..3 {
        let res = app.clone().oneshot(request("/health", "3.3.3.3")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
    }

    let first = app.clone().oneshot(request("/api/files?path=", "3.3.3.3")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.clone().oneshot(request("/api/files?path=", "3.3.3.3")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}
