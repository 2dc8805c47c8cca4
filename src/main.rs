//! deck-guard host binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────┐
//!                     │                  deck-guard                    │
//!   Client request    │  ┌──────────┐   ┌───────────┐   ┌───────────┐  │
//!   ──────────────────┼─▶│  http    │──▶│ security  │──▶│ handlers  │  │
//!                     │  │  server  │   │ rate limit│   │ files, ws │  │
//!                     │  └──────────┘   │ auth gate │   └─────┬─────┘  │
//!                     │                 └───────────┘         │        │
//!                     │                        path sandbox ◀─┤        │
//!                     │                        env sanitizer ◀┘        │
//!                     │  ┌─────────────────────────────────────────┐   │
//!                     │  │ config · observability · lifecycle      │   │
//!                     │  └─────────────────────────────────────────┘   │
//!                     └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use deck_guard::config::{self, GuardConfig};
use deck_guard::lifecycle::{signals, Shutdown};
use deck_guard::observability::{logging, metrics};
use deck_guard::GuardServer;

#[derive(Parser)]
#[command(name = "deck-guard")]
#[command(about = "Trust boundary host for a browser IDE", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the workspace root.
    #[arg(short, long)]
    workspace: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => {
            let mut config = GuardConfig::default();
            config::loader::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config::validate_config(&config).map_err(config::ConfigError::Validation)?;
            config
        }
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(workspace) = cli.workspace {
        config.workspace.root = workspace;
    }

    logging::init_tracing(&config.observability.log_level);
    tracing::info!("deck-guard v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        workspace = %config.workspace.root.display(),
        rate_limit_enabled = config.rate_limit.enabled,
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window_ms,
        basic_auth = config.auth.username.is_some() && config.auth.password.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::forward_to(&shutdown);

    let server = GuardServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
