//! Recommendation engine — filters and ranks the campaigns a user is
//! eligible to see right now.

use crate::exposure::ExposureStore;
use chrono::{DateTime, Duration, Utc};
use dega_campaigns::{Campaign, CampaignStore};
use dega_core::config::DeliveryConfig;
use dega_core::types::UserAdProfile;
use std::sync::Arc;
use tracing::debug;

pub struct RecommendationEngine {
    campaigns: Arc<CampaignStore>,
    exposure: Arc<ExposureStore>,
    config: DeliveryConfig,
}

impl RecommendationEngine {
    pub fn new(
        campaigns: Arc<CampaignStore>,
        exposure: Arc<ExposureStore>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            campaigns,
            exposure,
            config,
        }
    }

    /// Up to `max_recommendations` campaigns for this user, best first.
    /// An empty candidate pool is an empty result, not an error.
    pub fn recommend(&self, profile: &UserAdProfile, now: DateTime<Utc>) -> Vec<Campaign> {
        let age = profile.age_at(now);
        let candidates =
            self.campaigns
                .candidates(age, profile.gender, now, self.config.candidate_limit);
        let repeat_window = Duration::seconds(self.config.repeat_window_secs);

        let mut scored: Vec<(i64, Campaign)> = candidates
            .into_iter()
            .filter_map(|campaign| {
                let seen = self.exposure.get(profile.user_id, campaign.id);
                if let Some(record) = seen {
                    // Per-user cap reached: never show again.
                    if record.times_seen >= campaign.per_user_cap {
                        return None;
                    }
                    // Shown too recently: a view exactly at the window edge
                    // still counts as too recent.
                    if now - record.last_seen <= repeat_window {
                        return None;
                    }
                }
                let times_seen = seen.map(|r| r.times_seen).unwrap_or(0);
                let score = score_campaign(profile, &campaign, times_seen);
                Some((score, campaign))
            })
            .collect();

        // Stable: ties keep the priority/recency order of the candidate query.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let mut ranked: Vec<Campaign> = scored.into_iter().map(|(_, c)| c).collect();
        if profile.personalized_ads_opt_out {
            ranked.retain(|c| c.targeting.global);
        }
        ranked.truncate(self.config.max_recommendations);

        debug!(user_id = %profile.user_id, results = ranked.len(), "Recommendations computed");
        ranked
    }
}

/// Priority bonus, freshness penalty per prior view, interest-overlap bonus.
fn score_campaign(profile: &UserAdProfile, campaign: &Campaign, times_seen: u32) -> i64 {
    let overlap = campaign
        .targeting
        .interests
        .iter()
        .filter(|tag| profile.interests.iter().any(|i| i == *tag))
        .count() as i64;
    campaign.priority.score_bonus() - 10 * times_seen as i64 + 5 * overlap
}
