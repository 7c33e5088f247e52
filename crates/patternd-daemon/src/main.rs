//! patternd
//!
//! HTTP service that runs named patterns through the external text
//! generator and returns its output buffered or as a live event stream.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use patternd_core::config::{FetchStrategy, load_config};
use patternd_core::FsPatternStore;
use patternd_daemon::Executor;
use patternd_daemon::server::{AppState, ServerConfig, build_router, serve};

#[derive(Parser, Debug)]
#[command(name = "patternd")]
#[command(version, about = "patternd - run generator patterns over HTTP")]
struct Args {
    /// TCP bind address
    #[arg(long, env = "PATTERND_ADDR")]
    addr: Option<SocketAddr>,

    /// Settings file layered over the global settings
    #[arg(long, env = "PATTERND_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the text-generation executable
    #[arg(long, env = "PATTERND_GENERATOR_BIN")]
    generator_bin: Option<PathBuf>,

    /// Directory holding `<name>/system.md` pattern files
    #[arg(long, env = "PATTERND_PATTERNS_DIR")]
    patterns_dir: Option<PathBuf>,

    /// How web pages are fetched: "in-process" or "external"
    #[arg(long, env = "PATTERND_FETCH_STRATEGY")]
    fetch_strategy: Option<FetchStrategy>,

    /// Per-execution ceiling in seconds (0 disables it)
    #[arg(long, env = "PATTERND_EXECUTION_TIMEOUT")]
    execution_timeout: Option<u64>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, env = "PATTERND_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "PATTERND_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(bin) = args.generator_bin {
        config.execution.generator_bin = bin;
    }
    if let Some(dir) = args.patterns_dir {
        config.patterns.directory = dir;
    }
    if let Some(strategy) = args.fetch_strategy {
        config.execution.fetch_strategy = strategy;
    }
    if let Some(secs) = args.execution_timeout {
        config.execution.execution_timeout_secs = secs;
    }
    if let Some(level) = args.log_level {
        config.server.log_level = level;
    }
    config.server.log_json |= args.log_json;

    patternd_core::tracing_init::init_tracing(
        &patternd_core::tracing_init::default_filter(&config.server.log_level),
        config.server.log_json,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        generator = %config.execution.generator_bin.display(),
        patterns = %config.patterns.directory.display(),
        fetch_strategy = ?config.execution.fetch_strategy,
        "Starting patternd"
    );
    if !config.patterns.directory.is_dir() {
        warn!(
            path = %config.patterns.directory.display(),
            "Pattern directory does not exist; every pattern lookup will fail"
        );
    }

    let executor = Executor::from_settings(&config.execution)?;
    let store = FsPatternStore::new(config.patterns.directory.clone());
    let server_config = ServerConfig::from_settings(&config.server);
    let router = build_router(AppState::new(executor, store), &server_config);

    serve(router, &server_config, shutdown_signal()).await?;

    info!("patternd stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C shutdown signal"),
        () = terminate => info!("Received SIGTERM shutdown signal"),
    }
}
