//! Restarter Node - resourceone HTTP service.

use anyhow::Context;
use clap::Parser;
use restarter_node::observability::{init_logging, LogFormat};
use restarter_node::{create_router, AppState, NodeConfig};
use restarter_storage::ResourceStore;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Restarter Node - resourceone HTTP service
#[derive(Parser, Debug)]
#[command(name = "restarter-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// SQLite database file
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(addr) = self.http_addr {
            config.http_addr = addr;
        }
        if let Some(path) = self.database_path {
            config.database_path = path;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    init_logging(&config.log_level, config.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting restarter node");
    tracing::info!(
        http_addr = %config.http_addr,
        database_path = %config.database_path.display(),
        pool_max_connections = config.pool_max_connections,
        request_timeout_ms = config.request_timeout_ms,
        "Node configuration"
    );

    if let Some(dir) = config.database_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }

    let store = ResourceStore::open(config.store_config())
        .await
        .context("failed to open resource store")?;

    let state = AppState {
        store,
        instrumentation: config.instrument_settings(),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    tracing::info!(addr = %config.http_addr, "Listening");

    let shutdown = CancellationToken::new();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        joined = &mut server => {
            joined.context("server task failed")?.context("server error")?;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!(
        grace_ms = config.shutdown_timeout_ms,
        "Shutting down, draining in-flight requests"
    );
    shutdown.cancel();

    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(joined) => joined.context("server task failed")?.context("server error")?,
        Err(_) => tracing::warn!("Grace period elapsed, abandoning in-flight requests"),
    }

    tracing::info!("Restarter node stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
