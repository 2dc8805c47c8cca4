//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::http::HeaderValue;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::net::TcpListener;

use deck_guard::config::GuardConfig;
use deck_guard::lifecycle::Shutdown;
use deck_guard::GuardServer;

/// Config rooted at `workspace` with generous limits.
pub fn test_config(workspace: &Path) -> GuardConfig {
    let mut config = GuardConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.workspace.root = workspace.to_path_buf();
    config.auth.sweep_interval_secs = 1;
    config
}

pub fn with_credentials(mut config: GuardConfig, user: &str, pass: &str) -> GuardConfig {
    config.auth.username = Some(user.into());
    config.auth.password = Some(pass.into());
    config
}

pub fn basic_auth(user: &str, pass: &str) -> HeaderValue {
    let encoded = STANDARD.encode(format!("{user}:{pass}"));
    HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
}

/// A server running on an ephemeral port.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked");
        assert!(result.is_ok(), "server returned error: {result:?}");
    }
}

pub async fn start_server(config: GuardConfig) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = GuardServer::new(config);
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, rx).await });

    RunningServer {
        addr,
        shutdown,
        handle,
    }
}
