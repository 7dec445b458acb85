//! Per-user exposure history and the billed impression/click recorder.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dega_campaigns::CampaignStore;
use dega_core::types::{
    ActivityEvent, ActivityKind, ActivityMeta, ActivitySink, AdNotification, NotificationDispatch,
};
use dega_core::{AdError, AdResult};
use dega_ledger::CreditLedger;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

// ─── Exposure History ──────────────────────────────────────────────────────

/// How often and when a user has seen one campaign.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExposureRecord {
    pub times_seen: u32,
    pub last_seen: DateTime<Utc>,
}

/// Per (user, campaign) view history. The increment is a single DashMap
/// upsert under the shard lock, so two concurrent impressions for the same
/// pair never lose an update or produce two entries.
pub struct ExposureStore {
    records: DashMap<(Uuid, Uuid), ExposureRecord>,
}

impl ExposureStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn get(&self, user_id: Uuid, campaign_id: Uuid) -> Option<ExposureRecord> {
        self.records.get(&(user_id, campaign_id)).map(|r| *r.value())
    }

    /// Atomic increment-or-insert. Returns the updated record and whether
    /// this was the user's first exposure to the campaign.
    pub fn record(&self, user_id: Uuid, campaign_id: Uuid) -> (ExposureRecord, bool) {
        let now = Utc::now();
        let mut first = false;
        let record = *self
            .records
            .entry((user_id, campaign_id))
            .and_modify(|r| {
                r.times_seen += 1;
                r.last_seen = now;
            })
            .or_insert_with(|| {
                first = true;
                ExposureRecord {
                    times_seen: 1,
                    last_seen: now,
                }
            })
            .value();
        (record, first)
    }
}

impl Default for ExposureStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Exposure Recorder ─────────────────────────────────────────────────────

/// Records impressions and clicks. Impressions bill the advertiser through
/// the credit ledger; clicks are analytics-only.
pub struct ExposureRecorder {
    campaigns: Arc<CampaignStore>,
    ledger: Arc<CreditLedger>,
    exposure: Arc<ExposureStore>,
    sink: Arc<dyn ActivitySink>,
    dispatch: Arc<dyn NotificationDispatch>,
}

impl ExposureRecorder {
    pub fn new(
        campaigns: Arc<CampaignStore>,
        ledger: Arc<CreditLedger>,
        exposure: Arc<ExposureStore>,
        sink: Arc<dyn ActivitySink>,
        dispatch: Arc<dyn NotificationDispatch>,
    ) -> Self {
        Self {
            campaigns,
            ledger,
            exposure,
            sink,
            dispatch,
        }
    }

    /// Register one impression. Fails with `NotFound` for a missing or
    /// non-deliverable campaign and with `InsufficientFunds` when the
    /// advertiser cannot cover the cost (the campaign then auto-pauses to
    /// `OutOfCredit`). Returns the advertiser's remaining balance.
    ///
    /// The campaign state is not re-checked between the deliverability
    /// check and the debit; a campaign paused mid-request is still billed
    /// for the impression that was actually served. The in-lock ledger
    /// re-validation bounds the race to a correctly rejected debit.
    pub fn record_impression(
        &self,
        campaign_id: Uuid,
        user_id: Uuid,
        meta: &ActivityMeta,
    ) -> AdResult<u64> {
        let campaign = self.campaigns.get(campaign_id)?;
        let now = Utc::now();
        if !campaign.deliverable(now) {
            return Err(AdError::NotFound(format!(
                "campaign {campaign_id} is not currently active"
            )));
        }

        let cost = campaign.cost_per_impression;
        let balance = self.ledger.balance_of(campaign.advertiser_id);
        if balance.balance < cost {
            return Err(self.out_of_credit(&campaign, balance.balance, cost));
        }

        // Analytics first; its failures are the sink's own problem and must
        // never abort the billing path.
        self.sink.record(ActivityEvent::new(
            ActivityKind::View,
            campaign_id,
            user_id,
            campaign.advertiser_id,
            meta,
        ));

        let (_, first_time) = self.exposure.record(user_id, campaign_id);

        let updated = match self
            .ledger
            .deduct(campaign.advertiser_id, cost, campaign_id, 1)
        {
            Ok(updated) => updated,
            // Pre-check raced a concurrent spend; same auto-pause path.
            Err(AdError::InsufficientFunds { balance, required }) => {
                return Err(self.out_of_credit(&campaign, balance, required));
            }
            Err(e) => return Err(e),
        };

        // The debit is final and the ad was actually shown; a campaign
        // deleted mid-request loses its metric update, not the billing
        // result.
        if let Err(e) = self
            .campaigns
            .record_impression(campaign_id, cost, first_time)
        {
            warn!(campaign_id = %campaign_id, error = %e, "Campaign gone mid-impression, metrics not recorded");
        }

        if updated.low_balance_alert {
            self.dispatch.dispatch(AdNotification::LowBalance {
                advertiser_id: campaign.advertiser_id,
                balance: updated.balance,
                threshold: updated.alert_threshold,
            });
        }

        Ok(updated.balance)
    }

    /// Register one click. No billing impact; fails only when the campaign
    /// does not exist.
    pub fn record_click(
        &self,
        campaign_id: Uuid,
        user_id: Uuid,
        meta: &ActivityMeta,
    ) -> AdResult<()> {
        let campaign = self.campaigns.get(campaign_id)?;

        self.sink.record(ActivityEvent::new(
            ActivityKind::Click,
            campaign_id,
            user_id,
            campaign.advertiser_id,
            meta,
        ));
        self.campaigns.record_click(campaign_id)
    }

    fn out_of_credit(
        &self,
        campaign: &dega_campaigns::Campaign,
        balance: u64,
        required: u64,
    ) -> AdError {
        info!(campaign_id = %campaign.id, advertiser_id = %campaign.advertiser_id, balance, required, "Campaign out of credit, auto-pausing");
        // Best-effort: the campaign may have been deleted mid-request.
        let _ = self.campaigns.mark_out_of_credit(campaign.id);
        self.dispatch.dispatch(AdNotification::CampaignOutOfCredit {
            campaign_id: campaign.id,
            advertiser_id: campaign.advertiser_id,
        });
        AdError::InsufficientFunds { balance, required }
    }
}
