//! In-memory campaign store backed by DashMap.
//!
//! Owns the lifecycle state machine: draft → pending_approval → active ⇄
//! paused, rejection/approval, and the automatic out_of_credit transition
//! driven by the exposure recorder. Production: replace with the document
//! store behind the same API surface.

use crate::models::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dega_core::types::Gender;
use dega_core::{AdError, AdResult};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

pub struct CampaignStore {
    campaigns: DashMap<Uuid, Campaign>,
}

impl CampaignStore {
    pub fn new() -> Self {
        info!("Campaign store initialized (in-memory, development mode)");
        Self {
            campaigns: DashMap::new(),
        }
    }

    // ─── CRUD ──────────────────────────────────────────────────────────────

    /// Create a campaign for an advertiser. Privileged advertiser roles are
    /// auto-approved and start directly in `Active`; everyone else starts
    /// in `Draft`.
    pub fn create(
        &self,
        advertiser_id: Uuid,
        req: CreateCampaignRequest,
        auto_approve: bool,
    ) -> AdResult<Campaign> {
        if req.ends_at <= req.starts_at {
            return Err(AdError::InvalidArgument(
                "campaign end must be after start".into(),
            ));
        }
        if req.per_user_cap == 0 {
            return Err(AdError::InvalidArgument(
                "per-user exposure cap must be at least 1".into(),
            ));
        }
        if req.cost_per_impression == 0 {
            return Err(AdError::InvalidArgument(
                "cost per impression must be at least 1 credit".into(),
            ));
        }

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            advertiser_id,
            name: req.name,
            creative: req.creative,
            state: if auto_approve {
                CampaignState::Active
            } else {
                CampaignState::Draft
            },
            rejection_reason: None,
            starts_at: req.starts_at,
            ends_at: req.ends_at,
            targeting: req.targeting,
            priority: req.priority,
            per_user_cap: req.per_user_cap,
            cost_per_impression: req.cost_per_impression,
            credits_spent: 0,
            metrics: CampaignMetrics::default(),
            created_at: now,
            updated_at: now,
        };
        info!(campaign_id = %campaign.id, advertiser_id = %advertiser_id, state = ?campaign.state, "Campaign created");
        self.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    pub fn get(&self, id: Uuid) -> AdResult<Campaign> {
        self.campaigns
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| AdError::NotFound(format!("campaign {id}")))
    }

    pub fn list_by_advertiser(&self, advertiser_id: Uuid) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| r.value().advertiser_id == advertiser_id)
            .map(|r| r.value().clone())
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns
    }

    /// Edit a campaign. Active and finished campaigns cannot be edited;
    /// editing a rejected campaign re-submits it for approval and clears
    /// the rejection reason.
    pub fn update(
        &self,
        id: Uuid,
        advertiser_id: Uuid,
        req: UpdateCampaignRequest,
    ) -> AdResult<Campaign> {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| AdError::NotFound(format!("campaign {id}")))?;
        let c = entry.value_mut();
        if c.advertiser_id != advertiser_id {
            return Err(AdError::Forbidden(
                "cannot edit another advertiser's campaign".into(),
            ));
        }
        match c.state {
            CampaignState::Active => {
                return Err(AdError::InvalidTransition(
                    "active campaigns cannot be edited; pause it first".into(),
                ))
            }
            CampaignState::Finished => {
                return Err(AdError::InvalidTransition(
                    "finished campaigns cannot be edited".into(),
                ))
            }
            _ => {}
        }

        if let Some(name) = req.name {
            c.name = name;
        }
        if let Some(creative) = req.creative {
            c.creative = creative;
        }
        if let Some(starts_at) = req.starts_at {
            c.starts_at = starts_at;
        }
        if let Some(ends_at) = req.ends_at {
            c.ends_at = ends_at;
        }
        if let Some(targeting) = req.targeting {
            c.targeting = targeting;
        }
        if let Some(priority) = req.priority {
            c.priority = priority;
        }
        if let Some(cap) = req.per_user_cap {
            c.per_user_cap = cap;
        }
        if let Some(cpi) = req.cost_per_impression {
            c.cost_per_impression = cpi;
        }
        if c.ends_at <= c.starts_at {
            return Err(AdError::InvalidArgument(
                "campaign end must be after start".into(),
            ));
        }
        if c.state == CampaignState::Rejected {
            c.state = CampaignState::PendingApproval;
            c.rejection_reason = None;
        }
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    /// Deletion is permitted only from draft or rejected states.
    pub fn delete(&self, id: Uuid, advertiser_id: Uuid) -> AdResult<()> {
        let entry = self
            .campaigns
            .get(&id)
            .ok_or_else(|| AdError::NotFound(format!("campaign {id}")))?;
        if entry.value().advertiser_id != advertiser_id {
            return Err(AdError::Forbidden(
                "cannot delete another advertiser's campaign".into(),
            ));
        }
        match entry.value().state {
            CampaignState::Draft | CampaignState::Rejected => {}
            state => {
                return Err(AdError::InvalidTransition(format!(
                    "cannot delete a campaign in state {state:?}"
                )))
            }
        }
        drop(entry);
        self.campaigns.remove(&id);
        info!(campaign_id = %id, "Campaign deleted");
        Ok(())
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    /// Submit a draft for review.
    pub fn submit(&self, id: Uuid, advertiser_id: Uuid) -> AdResult<Campaign> {
        self.transition(id, |c| {
            if c.advertiser_id != advertiser_id {
                return Err(AdError::Forbidden(
                    "cannot submit another advertiser's campaign".into(),
                ));
            }
            if c.state != CampaignState::Draft {
                return Err(AdError::InvalidTransition(format!(
                    "only drafts can be submitted, campaign is {:?}",
                    c.state
                )));
            }
            c.state = CampaignState::PendingApproval;
            Ok(())
        })
    }

    /// Operator approval: moves the campaign to `Active` from any state
    /// and clears any rejection reason. Also the explicit reopen path for
    /// `OutOfCredit` campaigns after a top-up.
    pub fn approve(&self, id: Uuid) -> AdResult<Campaign> {
        self.transition(id, |c| {
            c.state = CampaignState::Active;
            c.rejection_reason = None;
            Ok(())
        })
    }

    /// Operator rejection with a mandatory reason. Only campaigns under
    /// review or already live can be rejected.
    pub fn reject(&self, id: Uuid, reason: &str) -> AdResult<Campaign> {
        if reason.trim().is_empty() {
            return Err(AdError::InvalidArgument(
                "a rejection reason is required".into(),
            ));
        }
        self.transition(id, |c| {
            match c.state {
                CampaignState::PendingApproval | CampaignState::Active => {}
                state => {
                    return Err(AdError::InvalidTransition(format!(
                        "cannot reject a campaign in state {state:?}"
                    )))
                }
            }
            c.state = CampaignState::Rejected;
            c.rejection_reason = Some(reason.trim().to_string());
            Ok(())
        })
    }

    /// Advertiser pause/resume toggle. Valid only between `Active` and
    /// `Paused`; every other state is an invalid transition.
    pub fn toggle(&self, id: Uuid, advertiser_id: Uuid) -> AdResult<Campaign> {
        self.transition(id, |c| {
            if c.advertiser_id != advertiser_id {
                return Err(AdError::Forbidden(
                    "cannot toggle another advertiser's campaign".into(),
                ));
            }
            c.state = match c.state {
                CampaignState::Active => CampaignState::Paused,
                CampaignState::Paused => CampaignState::Active,
                state => {
                    return Err(AdError::InvalidTransition(format!(
                        "cannot toggle a campaign in state {state:?}"
                    )))
                }
            };
            Ok(())
        })
    }

    /// Automatic transition when the advertiser's balance can no longer
    /// cover an impression. Does not auto-resume on top-up; an operator
    /// reopens it via `approve`.
    pub fn mark_out_of_credit(&self, id: Uuid) -> AdResult<Campaign> {
        self.transition(id, |c| {
            if c.state == CampaignState::Active {
                c.state = CampaignState::OutOfCredit;
            }
            Ok(())
        })
    }

    fn transition<F>(&self, id: Uuid, apply: F) -> AdResult<Campaign>
    where
        F: FnOnce(&mut Campaign) -> AdResult<()>,
    {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| AdError::NotFound(format!("campaign {id}")))?;
        let c = entry.value_mut();
        let from = c.state;
        apply(c)?;
        if c.state != from {
            c.updated_at = Utc::now();
            info!(campaign_id = %id, from = ?from, to = ?c.state, "Campaign state changed");
        }
        Ok(c.clone())
    }

    // ─── Delivery queries ──────────────────────────────────────────────────

    /// Candidate campaigns a user with the given demographics may see right
    /// now. Ordered by priority tier descending, then creation time
    /// descending, and capped for bounded in-memory scoring.
    pub fn candidates(
        &self,
        age: Option<u32>,
        gender: Option<Gender>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<Campaign> {
        let mut candidates: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| {
                let c = r.value();
                c.deliverable(now)
                    && c.targeting.matches_age(age)
                    && c.targeting.matches_gender(gender)
            })
            .map(|r| r.value().clone())
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        candidates.truncate(limit);
        candidates
    }

    // ─── Metrics ───────────────────────────────────────────────────────────

    /// Record a billed impression on the campaign counters.
    pub fn record_impression(&self, id: Uuid, cost: u64, first_time_viewer: bool) -> AdResult<()> {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| AdError::NotFound(format!("campaign {id}")))?;
        let c = entry.value_mut();
        c.metrics.impressions += 1;
        if first_time_viewer {
            c.metrics.unique_users += 1;
        }
        c.credits_spent += cost;
        c.metrics.recompute_ctr();
        Ok(())
    }

    pub fn record_click(&self, id: Uuid) -> AdResult<()> {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| AdError::NotFound(format!("campaign {id}")))?;
        let c = entry.value_mut();
        c.metrics.clicks += 1;
        c.metrics.recompute_ctr();
        Ok(())
    }

    // ─── Admin ─────────────────────────────────────────────────────────────

    /// All campaigns, newest first, optionally filtered by state, paginated.
    pub fn list_all(
        &self,
        state: Option<CampaignState>,
        offset: usize,
        limit: usize,
    ) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| state.map_or(true, |s| r.value().state == s))
            .map(|r| r.value().clone())
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns.into_iter().skip(offset).take(limit).collect()
    }

    /// Aggregate spend/engagement across all campaigns, broken down by tier.
    pub fn revenue_report(&self) -> RevenueReport {
        let mut report = RevenueReport::default();
        for entry in self.campaigns.iter() {
            let c = entry.value();
            report.campaigns += 1;
            report.total_credits_spent += c.credits_spent;
            report.total_impressions += c.metrics.impressions;
            report.total_clicks += c.metrics.clicks;
            let tier = report.by_tier.entry(c.priority).or_default();
            tier.campaigns += 1;
            tier.credits_spent += c.credits_spent;
        }
        report
    }
}

impl Default for CampaignStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RevenueReport {
    pub campaigns: u64,
    pub total_credits_spent: u64,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub by_tier: BTreeMap<PriorityTier, TierRevenue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TierRevenue {
    pub campaigns: u64,
    pub credits_spent: u64,
}
