//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the guard stores (rate limiter, WebSocket tokens) and auth gate
//! - Create the Axum Router with handlers and guard middleware
//! - Wire up ambient layers (request id, tracing, timeout)
//! - Run sweeps for the lifetime of the server and stop them on shutdown
//!
//! # Routes
//! ```text
//! GET  /health        open
//! POST /api/ws-token  rate limit → Basic auth → issue one-time token
//! GET  /api/files     rate limit → Basic auth → sandboxed read
//! GET  /ws            WebSocket auth → upgrade
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GuardConfig;
use crate::http::request::{request_id, MakeRequestUuidV4};
use crate::http::{files, websocket};
use crate::lifecycle::SweepTask;
use crate::security::auth::{basic_auth_middleware, ws_auth_middleware};
use crate::security::{
    client_identity, AuthGate, BasicCredentials, RateLimitOptions, RateLimiter, WorkspaceSandbox,
    WsTokenStore,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthGate>,
    pub sandbox: WorkspaceSandbox,
    pub workspace_root: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct WsTokenResponse {
    token: String,
    expires_in: u64,
}

/// HTTP host for the guards.
pub struct GuardServer {
    router: Router,
    config: GuardConfig,
    limiter: Arc<RateLimiter>,
    tokens: Arc<WsTokenStore>,
}

impl GuardServer {
    /// Create a new server with the given configuration.
    pub fn new(config: GuardConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(RateLimitOptions::from(&config.rate_limit)));
        let tokens = Arc::new(
            WsTokenStore::new(Duration::from_secs(config.auth.token_ttl_secs))
                .with_max_tokens(config.auth.max_tokens),
        );
        let auth = Arc::new(AuthGate::new(
            tokens.clone(),
            BasicCredentials::from_config(&config.auth),
        ));

        let state = AppState {
            auth,
            sandbox: WorkspaceSandbox::new(),
            workspace_root: Arc::new(config.workspace.root.clone()),
        };

        let router = Self::build_router(&config, state, &limiter);
        Self {
            router,
            config,
            limiter,
            tokens,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, state: AppState, limiter: &Arc<RateLimiter>) -> Router {
        let api = Router::new()
            .route("/api/ws-token", post(issue_ws_token))
            .route("/api/files", get(files::read_file))
            .layer(middleware::from_fn_with_state(
                state.auth.clone(),
                basic_auth_middleware,
            ));
        let api = if config.rate_limit.enabled {
            limiter.layer_on(api)
        } else {
            api
        };

        let ws = Router::new()
            .route("/ws", get(websocket::ws_handler))
            .layer(middleware::from_fn_with_state(
                state.auth.clone(),
                ws_auth_middleware,
            ));

        Router::new()
            .route("/health", get(health))
            .merge(api)
            .merge(ws)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// The assembled router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn token_store(&self) -> &Arc<WsTokenStore> {
        &self.tokens
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let rate_sweep = self.config.rate_limit.enabled.then(|| {
            SweepTask::spawn(
                &self.limiter,
                Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
            )
        });
        let token_sweep = SweepTask::spawn(
            &self.tokens,
            Duration::from_secs(self.config.auth.sweep_interval_secs),
        );

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await;

        if let Some(task) = rate_sweep {
            task.stop().await;
        }
        token_sweep.stop().await;

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Issue a one-time WebSocket token bound to the caller's identity.
async fn issue_ws_token(State(state): State<AppState>, headers: HeaderMap) -> Json<WsTokenResponse> {
    let identity = client_identity(&headers);
    let tokens = state.auth.tokens();
    let token = tokens.generate(&identity);
    Json(WsTokenResponse {
        token,
        expires_in: tokens.ttl().as_secs(),
    })
}
