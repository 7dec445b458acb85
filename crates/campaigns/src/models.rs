//! Campaign domain types — creatives, targeting, lifecycle states, metrics.

use chrono::{DateTime, Utc};
use dega_core::types::Gender;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Campaign ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub name: String,
    pub creative: Creative,
    pub state: CampaignState,
    /// Set when rejected; cleared on approval or re-submission.
    pub rejection_reason: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub targeting: Targeting,
    pub priority: PriorityTier,
    /// Maximum times a single user may be shown this campaign.
    pub per_user_cap: u32,
    /// Credits charged per recorded impression.
    pub cost_per_impression: u64,
    pub credits_spent: u64,
    pub metrics: CampaignMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Whether the campaign may be served right now: active and inside
    /// its validity window.
    pub fn deliverable(&self, now: DateTime<Utc>) -> bool {
        self.state == CampaignState::Active && self.starts_at <= now && now <= self.ends_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creative {
    pub image_url: String,
    pub link_url: String,
    pub cta_text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Draft,
    PendingApproval,
    Active,
    Paused,
    Finished,
    OutOfCredit,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Basic,
    Premium,
    Featured,
}

impl PriorityTier {
    /// Flat score bonus this tier contributes during ranking.
    pub fn score_bonus(&self) -> i64 {
        match self {
            PriorityTier::Basic => 0,
            PriorityTier::Premium => 20,
            PriorityTier::Featured => 50,
        }
    }
}

impl Default for PriorityTier {
    fn default() -> Self {
        PriorityTier::Basic
    }
}

// ─── Targeting ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetGender {
    All,
    Male,
    Female,
}

impl Default for TargetGender {
    fn default() -> Self {
        TargetGender::All
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Targeting {
    #[serde(default)]
    pub age_min: Option<u32>,
    #[serde(default)]
    pub age_max: Option<u32>,
    #[serde(default)]
    pub gender: TargetGender,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub geo_region: Option<String>,
    /// Campaign is shown regardless of geographic personalization; the
    /// only kind served to users who opted out of personalized ads.
    #[serde(default = "default_global")]
    pub global: bool,
}

fn default_global() -> bool {
    true
}

impl Default for Targeting {
    fn default() -> Self {
        Self {
            age_min: None,
            age_max: None,
            gender: TargetGender::All,
            interests: Vec::new(),
            geo_region: None,
            global: default_global(),
        }
    }
}

impl Targeting {
    /// Unknown age matches every range.
    pub fn matches_age(&self, age: Option<u32>) -> bool {
        let Some(age) = age else { return true };
        if let Some(min) = self.age_min {
            if age < min {
                return false;
            }
        }
        if let Some(max) = self.age_max {
            if age > max {
                return false;
            }
        }
        true
    }

    /// Unknown gender matches every rule; `All` matches everyone.
    pub fn matches_gender(&self, gender: Option<Gender>) -> bool {
        let Some(gender) = gender else { return true };
        match self.gender {
            TargetGender::All => true,
            TargetGender::Male => gender == Gender::Male,
            TargetGender::Female => gender == Gender::Female,
        }
    }
}

// ─── Metrics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignMetrics {
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
    pub unique_users: u64,
}

impl CampaignMetrics {
    pub fn recompute_ctr(&mut self) {
        self.ctr = if self.impressions > 0 {
            self.clicks as f64 / self.impressions as f64
        } else {
            0.0
        };
    }
}

// ─── API Request types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub creative: Creative,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub targeting: Targeting,
    #[serde(default)]
    pub priority: PriorityTier,
    #[serde(default = "default_per_user_cap")]
    pub per_user_cap: u32,
    #[serde(default = "default_cost_per_impression")]
    pub cost_per_impression: u64,
}

fn default_per_user_cap() -> u32 {
    5
}
fn default_cost_per_impression() -> u64 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub creative: Option<Creative>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub targeting: Option<Targeting>,
    pub priority: Option<PriorityTier>,
    pub per_user_cap: Option<u32>,
    pub cost_per_impression: Option<u64>,
}
