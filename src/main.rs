//! Thinking proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                   THINKING PROXY                     │
//!                    │                                                      │
//!   Client Request   │  ┌─────────┐   ┌──────────┐   ┌───────────┐          │
//!   ─────────────────┼─▶│   net   │──▶│   http   │──▶│ transform │          │
//!   127.0.0.1:8317   │  │listener │   │ request  │   │ thinking  │          │
//!                    │  └─────────┘   └──────────┘   └─────┬─────┘          │
//!                    │                                     │                │
//!                    │                                     ▼                │
//!   Client Response  │                               ┌───────────┐          │
//!   ◀────────────────┼───────── raw bytes ───────────│   http    │◀─────────┼── Backend
//!                    │                               │  forward  │          │   127.0.0.1:8318
//!                    │                               └───────────┘          │
//!                    │                                                      │
//!                    │  ┌──────────────────────────────────────────────┐    │
//!                    │  │  config │ lifecycle │ observability          │    │
//!                    │  └──────────────────────────────────────────────┘    │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use thinking_proxy::config::{load_config, validate_config, ConfigError, LogFormat, ProxyConfig};
use thinking_proxy::lifecycle::signals::shutdown_signal;
use thinking_proxy::observability::{logging, metrics};
use thinking_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "thinking-proxy", version)]
#[command(about = "Loopback proxy that turns thinking model names into thinking budgets", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `listener.bind_address`
    #[arg(long)]
    listen: Option<String>,

    /// Backend address, overrides `backend.address`
    #[arg(long)]
    backend: Option<String>,

    /// Log level, overrides `observability.log_level`
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(backend) = &self.backend {
            config.backend.address = backend.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if self.json_logs {
            config.observability.log_format = LogFormat::Json;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability)?;

    tracing::info!("thinking-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        connect_timeout_secs = config.timeouts.connect_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validation guarantees the address parses.
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics endpoint");
        }
    }

    let server = ProxyServer::new(config);
    let mut status = server.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            tracing::info!(status = %current, "Proxy status changed");
        }
    });

    server.start().await?;

    shutdown_signal().await;
    server.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
