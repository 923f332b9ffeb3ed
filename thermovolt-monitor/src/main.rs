// Thermovolt Monitor - Sensor status poll loop and exporter
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Thermovolt Monitor
//!
//! Polls a sensor record source, renders annotated live windows and serves
//! Prometheus metrics. Also projects the recent behaviour forward on demand.
//!
//! ## Usage
//!
//! ```bash
//! # Poll a CSV file every 12 seconds
//! thermovolt-monitor --source readings.csv --models models/
//!
//! # Extended preset, JSON lines output, metrics on port 9100
//! thermovolt-monitor --source readings.csv --models models/ --preset extended \
//!     --output json --port 9100
//!
//! # Project the next 30 days once
//! thermovolt-monitor --source readings.csv --models models/ project --days 30
//! ```

mod error;
mod metrics;
mod poller;
mod sink;
mod sources;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::{Parser, Subcommand, ValueEnum};
use error::MonitorError;
use metrics::encode_metrics;
use poller::{Poller, PollerState, PollerStats};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use sink::{JsonLinesSink, LogSink, PresentationSink};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thermovolt::{PipelineConfig, PipelineContext, StatusSummary};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Thermovolt sensor monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Record source (.csv or .json), re-read on every poll
    #[arg(short, long)]
    source: PathBuf,

    /// Directory holding scaler.json, temp_status.json and volt_status.json
    #[arg(short, long, default_value = "models")]
    models: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration preset (basic, timestamped, extended)
    #[arg(long)]
    preset: Option<String>,

    /// Readings kept in the rolling window
    #[arg(short, long)]
    window: Option<usize>,

    /// Seconds between polls
    #[arg(short, long)]
    interval: Option<u64>,

    /// How views are rendered
    #[arg(short, long, value_enum, default_value = "log")]
    output: Output,

    /// Serve /metrics, /health and /status on this port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the source until interrupted (default)
    Monitor,
    /// Project the current window forward once and exit
    Project {
        /// Days to project (defaults to the configured value)
        #[arg(short, long)]
        days: Option<usize>,

        /// Seed for reproducible draws
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Log,
    Json,
}

/// Application state shared across handlers.
struct AppState {
    poller: Arc<PollerState>,
    config: PipelineConfig,
    start_time: std::time::Instant,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Thermovolt Monitor v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn build_config(args: &Args) -> Result<PipelineConfig, MonitorError> {
    let mut config = match (&args.config, &args.preset) {
        (Some(path), _) => PipelineConfig::from_file(path)?,
        (None, Some(name)) => PipelineConfig::preset(name)?,
        (None, None) => PipelineConfig::default(),
    };
    if let Some(window) = args.window {
        config = config.with_window_size(window);
    }
    if let Some(interval) = args.interval {
        config = config.with_poll_interval_secs(interval);
    }
    if let Some(Command::Project {
        days: Some(days), ..
    }) = args.command
    {
        config = config.with_projection_days(days);
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<(), MonitorError> {
    let config = build_config(&args)?;

    // Missing or malformed models are fatal here, before anything is served.
    let context = Arc::new(PipelineContext::load(config, &args.models)?);

    let sink: Arc<dyn PresentationSink> = match args.output {
        Output::Log => Arc::new(LogSink),
        Output::Json => Arc::new(JsonLinesSink::stdout()),
    };
    let source: Arc<dyn thermovolt::RecordSource> =
        Arc::from(sources::open_source(&args.source));

    match args.command {
        Some(Command::Project { seed, .. }) => project(&context, source, sink, seed).await,
        Some(Command::Monitor) | None => monitor(context, source, sink, args.port).await,
    }
}

async fn project(
    context: &PipelineContext,
    source: Arc<dyn thermovolt::RecordSource>,
    sink: Arc<dyn PresentationSink>,
    seed: Option<u64>,
) -> Result<(), MonitorError> {
    let context = context.clone();
    let series = tokio::task::spawn_blocking(move || {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let now = chrono::Local::now().naive_local();
        context.project_from_source(&source, &mut rng, now)
    })
    .await??;

    let summary = StatusSummary::from_series(&series);
    sink.render_projection(&series, &summary)?;
    Ok(())
}

async fn monitor(
    context: Arc<PipelineContext>,
    source: Arc<dyn thermovolt::RecordSource>,
    sink: Arc<dyn PresentationSink>,
    port: Option<u16>,
) -> Result<(), MonitorError> {
    let config = context.config().clone();
    let poller = Poller::new(context, source, sink);
    let (handle, task) = poller.spawn();

    if let Some(port) = port {
        let state = Arc::new(AppState {
            poller: handle.state(),
            config,
            start_time: std::time::Instant::now(),
        });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/status", get(status_handler))
            .with_state(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        info!("Starting server on http://{}", addr);
        info!("Metrics endpoint: http://{}/metrics", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("server error: {}", e);
            }
        });
    }

    let stopper = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping after the current tick");
                stopper.set_running(false);
            }
            Err(e) => tracing::error!("failed to listen for interrupt: {}", e),
        }
    });

    let poller = task.await?;
    let stats = poller.handle().state().stats();
    info!(
        "ticks={} refreshed={} reused={} failed={}",
        stats.ticks, stats.refreshes, stats.reuses, stats.failures
    );
    Ok(())
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    poller: PollerStats,
    window_size: usize,
    poll_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    readings: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<StatusSummary>,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let latest = state.poller.latest.read().await;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        poller: state.poller.stats(),
        window_size: state.config.window_size,
        poll_interval_secs: state.config.poll_interval_secs,
        readings: latest.as_ref().map(|v| v.len()),
        summary: latest.as_ref().map(|v| v.summary.clone()),
    })
}
