//! Operator endpoints — campaign moderation and the revenue report.
//! All handlers require the `AdministerAds` capability.

use crate::auth::{Capability, Role};
use crate::rest::{require, to_http, ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use dega_campaigns::{Campaign, CampaignState, RevenueReport};
use dega_core::types::AdNotification;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListAllQuery {
    #[serde(default)]
    pub state: Option<CampaignState>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_size")]
    pub limit: usize,
}

fn default_page_size() -> usize {
    50
}

pub async fn list_all_campaigns(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Query(query): Query<ListAllQuery>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    require(role, Capability::AdministerAds)?;
    Ok(Json(
        state
            .campaigns
            .list_all(query.state, query.offset, query.limit),
    ))
}

pub async fn approve_campaign(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    require(role, Capability::AdministerAds)?;
    let campaign = state.campaigns.approve(id).map_err(to_http)?;
    info!(campaign_id = %id, "Campaign approved by operator");
    metrics::counter!("ads.campaigns.approved").increment(1);
    state.dispatch.dispatch(AdNotification::CampaignApproved {
        campaign_id: campaign.id,
        advertiser_id: campaign.advertiser_id,
    });
    Ok(Json(campaign))
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

pub async fn reject_campaign(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<Campaign>, ApiError> {
    require(role, Capability::AdministerAds)?;
    let campaign = state.campaigns.reject(id, &req.reason).map_err(to_http)?;
    info!(campaign_id = %id, reason = %req.reason, "Campaign rejected by operator");
    metrics::counter!("ads.campaigns.rejected").increment(1);
    state.dispatch.dispatch(AdNotification::CampaignRejected {
        campaign_id: campaign.id,
        advertiser_id: campaign.advertiser_id,
        reason: req.reason,
    });
    Ok(Json(campaign))
}

pub async fn revenue_report(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
) -> Result<Json<RevenueReport>, ApiError> {
    require(role, Capability::AdministerAds)?;
    Ok(Json(state.campaigns.revenue_report()))
}
