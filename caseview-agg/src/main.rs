//! caseview-agg - Case aggregation microservice
//!
//! Joins reports, incidents, evidence, AI results and investigators from the
//! reporting API into per-user case lists, and drives remote AI analysis jobs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use caseview_agg::client::{CaseSource, HttpCaseSource, MockCaseSource};
use caseview_agg::config::{parse_scan_mode, ConfigOverrides, ServiceConfig};
use caseview_agg::services::Fetcher;
use caseview_agg::AppState;
use caseview_common::events::EventBus;
use caseview_common::IdNormalizer;
use clap::Parser;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for caseview-agg
#[derive(Parser, Debug)]
#[command(name = "caseview-agg")]
#[command(about = "Case aggregation and analysis tracking service")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CASEVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the reporting API
    #[arg(long)]
    api_base_url: Option<String>,

    /// Bearer token for the reporting API
    #[arg(long)]
    api_token: Option<String>,

    /// Address to bind
    #[arg(long)]
    bind_address: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream request timeout in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Maximum concurrent upstream requests per fan-out
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Upstream requests per second (0 disables rate limiting)
    #[arg(long)]
    rate_limit: Option<u32>,

    /// Last-resort identifier scan: keyed or anywhere
    #[arg(long)]
    id_scan_mode: Option<String>,

    /// Log level or filter directive
    #[arg(long)]
    log_level: Option<String>,

    /// Serve built-in sample data instead of calling the reporting API
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(caseview_common::config::default_config_path);
    let toml_config = caseview_common::config::load_or_default(config_path.as_deref())
        .context("Failed to load configuration file")?;

    let overrides = ConfigOverrides {
        api_base_url: args.api_base_url,
        api_token: args.api_token,
        bind_address: args.bind_address,
        port: args.port,
        request_timeout_secs: args.request_timeout_secs,
        max_in_flight: args.max_in_flight,
        rate_limit_per_second: args.rate_limit,
        id_scan_mode: args
            .id_scan_mode
            .as_deref()
            .map(parse_scan_mode)
            .transpose()
            .context("Invalid --id-scan-mode")?,
        log_level: args.log_level,
    };
    let config = ServiceConfig::resolve(overrides, &toml_config).context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("caseview_agg={0},caseview_common={0},tower_http={0}", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting caseview-agg");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let source: Arc<dyn CaseSource> = if args.demo {
        info!("Demo mode: serving built-in sample data");
        Arc::new(MockCaseSource::with_sample_data().await)
    } else {
        info!(
            api_base_url = %config.api_base_url,
            rate_limit = config.rate_limit_per_second,
            "Upstream reporting API"
        );
        Arc::new(
            HttpCaseSource::new(config.http_source_config())
                .context("Failed to build upstream client")?,
        )
    };

    let event_bus = EventBus::new(100);
    let state = AppState::new(
        source,
        IdNormalizer::new(config.id_scan_mode),
        Fetcher::new(config.max_in_flight),
        event_bus,
    );

    let app = caseview_agg::build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("caseview-agg stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
