//! Dega Ads — campaign management, ad recommendation, and credit ledger
//! service for the Dega social platform.
//!
//! Main entry point that wires the stores together and starts the server.

use clap::Parser;
use dega_analytics::ActivityLogger;
use dega_api::{AdsServer, ProfileRegistry};
use dega_campaigns::CampaignStore;
use dega_core::config::AppConfig;
use dega_core::types::{ActivitySink, NotificationDispatch, NullDispatch, NullSink};
use dega_delivery::{ExposureRecorder, ExposureStore, RecommendationEngine};
use dega_ledger::CreditLedger;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dega-ads")]
#[command(about = "Ad recommendation and credit ledger service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "DEGA_ADS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "DEGA_ADS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "DEGA_ADS__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Skip the ClickHouse analytics writer (API-only mode)
    #[arg(long, default_value_t = false)]
    api_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dega_ads=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Dega Ads starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );

    // Analytics sink: ClickHouse batch writer, or a no-op when unavailable.
    // The ads service must keep serving even if analytics is down.
    let sink: Arc<dyn ActivitySink> = if cli.api_only {
        info!("Running in API-only mode (no analytics writer)");
        Arc::new(NullSink)
    } else {
        match ActivityLogger::new(&config.clickhouse).await {
            Ok(logger) => Arc::new(logger),
            Err(e) => {
                error!(error = %e, "Failed to connect to ClickHouse, analytics disabled");
                Arc::new(NullSink)
            }
        }
    };

    // Notification fan-out is owned by the main platform; this service only
    // emits. Until the platform bus integration lands, drop them here.
    let dispatch: Arc<dyn NotificationDispatch> = Arc::new(NullDispatch);

    // Core stores
    let campaigns = Arc::new(CampaignStore::new());
    let ledger = Arc::new(CreditLedger::new());
    let exposure = Arc::new(ExposureStore::new());
    let profiles = Arc::new(ProfileRegistry::new());

    let engine = Arc::new(RecommendationEngine::new(
        Arc::clone(&campaigns),
        Arc::clone(&exposure),
        config.delivery.clone(),
    ));
    let recorder = Arc::new(ExposureRecorder::new(
        Arc::clone(&campaigns),
        Arc::clone(&ledger),
        Arc::clone(&exposure),
        Arc::clone(&sink),
        Arc::clone(&dispatch),
    ));

    // Start API server
    let server = AdsServer::new(
        config.clone(),
        campaigns,
        ledger,
        engine,
        recorder,
        profiles,
        dispatch,
    );

    // Start metrics exporter
    if let Err(e) = server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Dega Ads is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    server.start_http().await?;

    Ok(())
}
