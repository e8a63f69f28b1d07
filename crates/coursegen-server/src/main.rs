//! Coursegen server - HTTP/WebSocket front end for the streaming course pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use coursegen_core::{capture, CoursePipeline};
use coursegen_server::{app, config, logging, state};
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::Config;
use logging::{LogConfig, LogFormat};
use state::AppState;

/// Coursegen server - builds course trees from streamed generator output.
#[derive(Parser, Debug)]
#[command(name = "coursegen-server")]
#[command(about = "HTTP/WebSocket server for the streaming course-tree pipeline")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "tree=debug" or "extractor=trace").
    /// Can be specified multiple times. Targets are prefixed with "coursegen::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Replay a capture file through a fresh pipeline, print the result and exit
    #[arg(long, value_name = "CAPTURE.json")]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    if let Some(path) = &cli.replay {
        return replay_capture(path).await;
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(target: "coursegen::startup", "Loaded configuration (port: {})", config.port);

    let state = Arc::new(AppState::new(config.clone())?);
    tracing::info!(target: "coursegen::startup", "Initialized application state");

    let app = app(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "coursegen::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let dropped = state.captures.dispose().await;
    tracing::info!(target: "coursegen::startup", "Server stopped ({} open capture(s) dropped)", dropped);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "coursegen::startup", "Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Feed one capture through a fresh pipeline and print what it produced.
async fn replay_capture(path: &Path) -> Result<()> {
    let recorded = capture::load(path)
        .await
        .with_context(|| format!("loading capture {}", path.display()))?;

    let pipeline = CoursePipeline::default();
    let phase = capture::replay(&pipeline, &recorded).await?;

    let output = json!({
        "responseId": recorded.id,
        "phase": phase,
        "sections": pipeline.sections(recorded.id).await?,
        "tree": *pipeline.tree().await,
        "tasks": pipeline.tasks().await,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
