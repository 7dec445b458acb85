//! API server — wires the ads routes, auth middleware, and the metrics
//! exporter.

use crate::admin;
use crate::auth;
use crate::profiles::ProfileRegistry;
use crate::rest::{self, AppState};
use axum::routing::{delete, get, post, put};
use axum::Router;
use dega_campaigns::CampaignStore;
use dega_core::config::AppConfig;
use dega_core::types::NotificationDispatch;
use dega_delivery::{ExposureRecorder, RecommendationEngine};
use dega_ledger::CreditLedger;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct AdsServer {
    config: AppConfig,
    state: AppState,
}

impl AdsServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        campaigns: Arc<CampaignStore>,
        ledger: Arc<CreditLedger>,
        engine: Arc<RecommendationEngine>,
        recorder: Arc<ExposureRecorder>,
        profiles: Arc<ProfileRegistry>,
        dispatch: Arc<dyn NotificationDispatch>,
    ) -> Self {
        let state = AppState {
            campaigns,
            ledger,
            engine,
            recorder,
            profiles,
            dispatch,
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = Router::new()
            // Auth
            .route("/api/v1/auth/login", post(rest::handle_login))
            // Ad delivery
            .route("/api/v1/ads/recommendations", post(rest::recommendations))
            .route("/api/v1/ads/impressions", post(rest::impression))
            .route("/api/v1/ads/clicks", post(rest::click))
            // Campaign management
            .route("/api/v1/ads/campaigns", post(rest::create_campaign))
            .route("/api/v1/ads/campaigns", get(rest::list_campaigns))
            .route("/api/v1/ads/campaigns/:id", get(rest::get_campaign))
            .route("/api/v1/ads/campaigns/:id", put(rest::update_campaign))
            .route("/api/v1/ads/campaigns/:id", delete(rest::delete_campaign))
            .route("/api/v1/ads/campaigns/:id/submit", post(rest::submit_campaign))
            .route("/api/v1/ads/campaigns/:id/toggle", post(rest::toggle_campaign))
            // Credits
            .route("/api/v1/ads/balance/:advertiser_id", get(rest::balance))
            .route("/api/v1/ads/credits/purchase", post(rest::purchase_credits))
            .route(
                "/api/v1/ads/transactions/:advertiser_id",
                get(rest::transactions),
            )
            // Profile sync
            .route("/api/v1/ads/profiles", put(rest::upsert_profile))
            // Operator surface
            .route("/admin/campaigns", get(admin::list_all_campaigns))
            .route("/admin/campaigns/:id/approve", post(admin::approve_campaign))
            .route("/admin/campaigns/:id/reject", post(admin::reject_campaign))
            .route("/admin/revenue", get(admin::revenue_report))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(axum::middleware::from_fn(auth::auth_middleware))
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
