//! REST handlers for the public ads API — recommendations, impressions,
//! clicks, campaign management, credits, and transaction history.

use crate::auth::{self, Capability, Role};
use crate::profiles::ProfileRegistry;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use dega_campaigns::{Campaign, CampaignStore, CreateCampaignRequest, UpdateCampaignRequest};
use dega_core::types::{ActivityMeta, NotificationDispatch, UserAdProfile};
use dega_core::AdError;
use dega_delivery::{ExposureRecorder, RecommendationEngine};
use dega_ledger::{AdvertiserBalance, CreditLedger, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub campaigns: Arc<CampaignStore>,
    pub ledger: Arc<CreditLedger>,
    pub engine: Arc<RecommendationEngine>,
    pub recorder: Arc<ExposureRecorder>,
    pub profiles: Arc<ProfileRegistry>,
    pub dispatch: Arc<dyn NotificationDispatch>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a domain error onto its HTTP classification.
pub fn to_http(err: AdError) -> ApiError {
    let (status, code) = match &err {
        AdError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        AdError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        AdError::InsufficientFunds { .. } => (StatusCode::PAYMENT_REQUIRED, "insufficient_funds"),
        AdError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        AdError::InvalidTransition(_) => (StatusCode::BAD_REQUEST, "invalid_transition"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}

/// 403 unless the caller's role carries the capability.
pub fn require(role: Role, capability: Capability) -> Result<(), ApiError> {
    if role.can(capability) {
        Ok(())
    } else {
        Err(to_http(AdError::Forbidden(format!(
            "role {role:?} lacks {capability:?}"
        ))))
    }
}

// ─── Auth ──────────────────────────────────────────────────────────────────

pub async fn handle_login(
    Json(req): Json<auth::LoginRequest>,
) -> Result<Json<auth::LoginResponse>, ApiError> {
    match auth::authenticate(&req) {
        Ok(resp) => Ok(Json(resp)),
        Err(msg) => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "auth_failed".to_string(),
                message: msg,
            }),
        )),
    }
}

// ─── Recommendations ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub location: Option<String>,
}

pub async fn recommendations(
    State(state): State<AppState>,
    Json(req): Json<RecommendationRequest>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    let profile = state
        .profiles
        .get(req.user_id)
        .ok_or_else(|| to_http(AdError::NotFound(format!("user {}", req.user_id))))?;
    let results = state.engine.recommend(&profile, Utc::now());
    metrics::counter!("ads.recommendations.served").increment(results.len() as u64);
    Ok(Json(results))
}

// ─── Impressions & Clicks ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExposureRequest {
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub meta: ActivityMeta,
}

#[derive(Debug, Serialize)]
pub struct ImpressionResponse {
    pub remaining_balance: u64,
}

pub async fn impression(
    State(state): State<AppState>,
    Json(req): Json<ExposureRequest>,
) -> Result<Json<ImpressionResponse>, ApiError> {
    match state
        .recorder
        .record_impression(req.campaign_id, req.user_id, &req.meta)
    {
        Ok(remaining_balance) => {
            metrics::counter!("ads.impressions.recorded").increment(1);
            Ok(Json(ImpressionResponse { remaining_balance }))
        }
        Err(e) => {
            if matches!(e, AdError::InsufficientFunds { .. }) {
                metrics::counter!("ads.impressions.payment_required").increment(1);
                warn!(campaign_id = %req.campaign_id, "Impression rejected, advertiser out of credit");
            }
            Err(to_http(e))
        }
    }
}

pub async fn click(
    State(state): State<AppState>,
    Json(req): Json<ExposureRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .recorder
        .record_click(req.campaign_id, req.user_id, &req.meta)
        .map_err(to_http)?;
    metrics::counter!("ads.clicks.recorded").increment(1);
    Ok(Json(serde_json::json!({})))
}

// ─── Credits & Transactions ────────────────────────────────────────────────

pub async fn balance(
    State(state): State<AppState>,
    Path(advertiser_id): Path<Uuid>,
) -> Json<AdvertiserBalance> {
    Json(state.ledger.balance_of(advertiser_id))
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub advertiser_id: Uuid,
    pub amount: u64,
    pub payment_method: String,
    pub package: String,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub balance: u64,
    pub amount_added: u64,
}

pub async fn purchase_credits(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    require(role, Capability::ManageOwnCampaigns)?;
    let updated = state
        .ledger
        .purchase(
            req.advertiser_id,
            req.amount,
            req.payment_method,
            req.package,
        )
        .map_err(to_http)?;
    metrics::counter!("ads.credits.purchased").increment(req.amount);
    Ok(Json(PurchaseResponse {
        balance: updated.balance,
        amount_added: req.amount,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default = "default_tx_limit")]
    pub limit: usize,
}

fn default_tx_limit() -> usize {
    50
}

pub async fn transactions(
    State(state): State<AppState>,
    Path(advertiser_id): Path<Uuid>,
    Query(query): Query<TransactionsQuery>,
) -> Json<Vec<Transaction>> {
    Json(state.ledger.transactions(advertiser_id, query.limit))
}

// ─── Campaign management ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCampaignBody {
    pub advertiser_id: Uuid,
    #[serde(flatten)]
    pub campaign: CreateCampaignRequest,
}

pub async fn create_campaign(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Json(body): Json<CreateCampaignBody>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    require(role, Capability::ManageOwnCampaigns)?;
    let auto_approve = role.can(Capability::AutoApprove);
    let campaign = state
        .campaigns
        .create(body.advertiser_id, body.campaign, auto_approve)
        .map_err(to_http)?;
    metrics::counter!("ads.campaigns.created").increment(1);
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state.campaigns.get(id).map(Json).map_err(to_http)
}

#[derive(Debug, Deserialize)]
pub struct AdvertiserQuery {
    pub advertiser_id: Uuid,
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<AdvertiserQuery>,
) -> Json<Vec<Campaign>> {
    Json(state.campaigns.list_by_advertiser(query.advertiser_id))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCampaignBody {
    pub advertiser_id: Uuid,
    #[serde(flatten)]
    pub update: UpdateCampaignRequest,
}

pub async fn update_campaign(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateCampaignBody>,
) -> Result<Json<Campaign>, ApiError> {
    require(role, Capability::ManageOwnCampaigns)?;
    state
        .campaigns
        .update(id, body.advertiser_id, body.update)
        .map(Json)
        .map_err(to_http)
}

pub async fn submit_campaign(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
    Query(query): Query<AdvertiserQuery>,
) -> Result<Json<Campaign>, ApiError> {
    require(role, Capability::ManageOwnCampaigns)?;
    state
        .campaigns
        .submit(id, query.advertiser_id)
        .map(Json)
        .map_err(to_http)
}

pub async fn toggle_campaign(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
    Query(query): Query<AdvertiserQuery>,
) -> Result<Json<Campaign>, ApiError> {
    require(role, Capability::ManageOwnCampaigns)?;
    state
        .campaigns
        .toggle(id, query.advertiser_id)
        .map(Json)
        .map_err(to_http)
}

pub async fn delete_campaign(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
    Query(query): Query<AdvertiserQuery>,
) -> Result<StatusCode, ApiError> {
    require(role, Capability::ManageOwnCampaigns)?;
    state
        .campaigns
        .delete(id, query.advertiser_id)
        .map_err(to_http)?;
    metrics::counter!("ads.campaigns.deleted").increment(1);
    Ok(StatusCode::NO_CONTENT)
}

// ─── Profiles ──────────────────────────────────────────────────────────────

/// Sync a user's ad profile from the main profile service.
pub async fn upsert_profile(
    State(state): State<AppState>,
    Json(profile): Json<UserAdProfile>,
) -> StatusCode {
    state.profiles.upsert(profile);
    StatusCode::NO_CONTENT
}

// ─── Operational ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
