//! Integration test for the full impression/billing flow: recommendation,
//! exposure recording, credit debit, and the out-of-credit auto-pause.

use dega_campaigns::{
    CampaignState, CampaignStore, CreateCampaignRequest, Creative, PriorityTier, Targeting,
};
use dega_core::types::{
    ActivityEvent, ActivityKind, ActivityMeta, ActivitySink, AdNotification, NotificationDispatch,
    UserAdProfile,
};
use dega_core::AdError;
use dega_delivery::{ExposureRecorder, ExposureStore};
use dega_ledger::{CreditLedger, TransactionKind};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<ActivityEvent>>,
}

impl ActivitySink for CollectingSink {
    fn record(&self, event: ActivityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct CollectingDispatch {
    notifications: Mutex<Vec<AdNotification>>,
}

impl NotificationDispatch for CollectingDispatch {
    fn dispatch(&self, notification: AdNotification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

struct Harness {
    campaigns: Arc<CampaignStore>,
    ledger: Arc<CreditLedger>,
    exposure: Arc<ExposureStore>,
    sink: Arc<CollectingSink>,
    dispatch: Arc<CollectingDispatch>,
    recorder: Arc<ExposureRecorder>,
}

fn harness() -> Harness {
    let campaigns = Arc::new(CampaignStore::new());
    let ledger = Arc::new(CreditLedger::new());
    let exposure = Arc::new(ExposureStore::new());
    let sink = Arc::new(CollectingSink::default());
    let dispatch = Arc::new(CollectingDispatch::default());
    let recorder = Arc::new(ExposureRecorder::new(
        Arc::clone(&campaigns),
        Arc::clone(&ledger),
        Arc::clone(&exposure),
        sink.clone() as Arc<dyn ActivitySink>,
        dispatch.clone() as Arc<dyn NotificationDispatch>,
    ));
    Harness {
        campaigns,
        ledger,
        exposure,
        sink,
        dispatch,
        recorder,
    }
}

fn sample_campaign(cost_per_impression: u64) -> CreateCampaignRequest {
    let now = chrono::Utc::now();
    CreateCampaignRequest {
        name: "Winter Sale".into(),
        creative: Creative {
            image_url: "https://cdn.dega.io/ads/winter.png".into(),
            link_url: "https://shop.example.com/winter".into(),
            cta_text: "Shop Now".into(),
        },
        starts_at: now - chrono::Duration::days(1),
        ends_at: now + chrono::Duration::days(30),
        targeting: Targeting::default(),
        priority: PriorityTier::Premium,
        per_user_cap: 100,
        cost_per_impression,
    }
}

#[test]
fn test_impression_debits_and_records_spend_transaction() {
    let h = harness();
    let advertiser = Uuid::new_v4();
    let user = Uuid::new_v4();
    let campaign = h.campaigns.create(advertiser, sample_campaign(2), true).unwrap();
    h.ledger
        .purchase(advertiser, 10, "card".into(), "starter".into())
        .unwrap();

    let remaining = h
        .recorder
        .record_impression(campaign.id, user, &ActivityMeta::default())
        .unwrap();
    assert_eq!(remaining, 8);

    // Exactly one spend transaction with a consistent before/after snapshot
    let spends: Vec<_> = h
        .ledger
        .transactions(advertiser, 10)
        .into_iter()
        .filter(|t| t.kind == TransactionKind::Spend)
        .collect();
    assert_eq!(spends.len(), 1);
    assert_eq!(spends[0].balance_before, 10);
    assert_eq!(spends[0].balance_after, 8);

    // Exposure history, campaign metrics, and the view analytics event
    let record = h.exposure.get(user, campaign.id).unwrap();
    assert_eq!(record.times_seen, 1);
    let campaign = h.campaigns.get(campaign.id).unwrap();
    assert_eq!(campaign.metrics.impressions, 1);
    assert_eq!(campaign.metrics.unique_users, 1);
    assert_eq!(campaign.credits_spent, 2);
    let events = h.sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ActivityKind::View);
}

#[test]
fn test_balance_exhaustion_flips_campaign_out_of_credit() {
    let h = harness();
    let advertiser = Uuid::new_v4();
    let user = Uuid::new_v4();
    let campaign = h.campaigns.create(advertiser, sample_campaign(1), true).unwrap();
    h.ledger
        .purchase(advertiser, 5, "card".into(), "mini".into())
        .unwrap();

    // Five impressions drain the balance to zero
    for expected in (0..5).rev() {
        let remaining = h
            .recorder
            .record_impression(campaign.id, user, &ActivityMeta::default())
            .unwrap();
        assert_eq!(remaining, expected);
    }

    // The sixth fails and auto-pauses the campaign
    let err = h
        .recorder
        .record_impression(campaign.id, user, &ActivityMeta::default())
        .unwrap_err();
    assert!(matches!(err, AdError::InsufficientFunds { .. }));
    assert_eq!(
        h.campaigns.get(campaign.id).unwrap().state,
        CampaignState::OutOfCredit
    );
    assert!(h
        .dispatch
        .notifications
        .lock()
        .unwrap()
        .iter()
        .any(|n| matches!(n, AdNotification::CampaignOutOfCredit { .. })));

    // Balance untouched by the failed attempt
    assert_eq!(h.ledger.balance_of(advertiser).balance, 0);
    assert_eq!(h.campaigns.get(campaign.id).unwrap().metrics.impressions, 5);
}

#[test]
fn test_impression_on_paused_campaign_is_not_found() {
    let h = harness();
    let advertiser = Uuid::new_v4();
    let campaign = h.campaigns.create(advertiser, sample_campaign(1), true).unwrap();
    h.ledger
        .purchase(advertiser, 10, "card".into(), "starter".into())
        .unwrap();
    h.campaigns.toggle(campaign.id, advertiser).unwrap();

    let err = h
        .recorder
        .record_impression(campaign.id, Uuid::new_v4(), &ActivityMeta::default())
        .unwrap_err();
    assert!(matches!(err, AdError::NotFound(_)));

    let err = h
        .recorder
        .record_impression(Uuid::new_v4(), Uuid::new_v4(), &ActivityMeta::default())
        .unwrap_err();
    assert!(matches!(err, AdError::NotFound(_)));
}

#[test]
fn test_click_has_no_billing_impact() {
    let h = harness();
    let advertiser = Uuid::new_v4();
    let user = Uuid::new_v4();
    let campaign = h.campaigns.create(advertiser, sample_campaign(1), true).unwrap();

    // No balance at all: clicks still succeed
    h.recorder
        .record_click(campaign.id, user, &ActivityMeta::default())
        .unwrap();

    assert_eq!(h.ledger.balance_of(advertiser).balance, 0);
    let campaign = h.campaigns.get(campaign.id).unwrap();
    assert_eq!(campaign.metrics.clicks, 1);
    assert_eq!(campaign.credits_spent, 0);
    let events = h.sink.events.lock().unwrap();
    assert_eq!(events[0].kind, ActivityKind::Click);

    let err = h
        .recorder
        .record_click(Uuid::new_v4(), user, &ActivityMeta::default())
        .unwrap_err();
    assert!(matches!(err, AdError::NotFound(_)));
}

/// Sink that pulls the campaign while the impression is still in flight,
/// emulating a moderator removing it mid-request.
struct RemovingSink {
    campaigns: Arc<CampaignStore>,
}

impl ActivitySink for RemovingSink {
    fn record(&self, event: ActivityEvent) {
        self.campaigns
            .reject(event.campaign_id, "pulled during review")
            .unwrap();
        self.campaigns
            .delete(event.campaign_id, event.advertiser_id)
            .unwrap();
    }
}

#[test]
fn test_campaign_removed_mid_impression_keeps_billing_result() {
    let campaigns = Arc::new(CampaignStore::new());
    let ledger = Arc::new(CreditLedger::new());
    let exposure = Arc::new(ExposureStore::new());
    let dispatch = Arc::new(CollectingDispatch::default());
    let sink = Arc::new(RemovingSink {
        campaigns: Arc::clone(&campaigns),
    });
    let recorder = ExposureRecorder::new(
        Arc::clone(&campaigns),
        Arc::clone(&ledger),
        Arc::clone(&exposure),
        sink as Arc<dyn ActivitySink>,
        dispatch as Arc<dyn NotificationDispatch>,
    );

    let advertiser = Uuid::new_v4();
    let user = Uuid::new_v4();
    let campaign = campaigns.create(advertiser, sample_campaign(2), true).unwrap();
    ledger
        .purchase(advertiser, 10, "card".into(), "starter".into())
        .unwrap();

    // The ad was shown and the debit happened, so the caller still gets
    // the billing result even though the campaign vanished underneath.
    let remaining = recorder
        .record_impression(campaign.id, user, &ActivityMeta::default())
        .unwrap();
    assert_eq!(remaining, 8);
    assert!(campaigns.get(campaign.id).is_err());

    let spends: Vec<_> = ledger
        .transactions(advertiser, 10)
        .into_iter()
        .filter(|t| t.kind == TransactionKind::Spend)
        .collect();
    assert_eq!(spends.len(), 1);
    assert_eq!(ledger.balance_of(advertiser).balance, 8);
}

#[test]
fn test_low_balance_alert_dispatched_below_threshold() {
    let h = harness();
    let advertiser = Uuid::new_v4();
    let user = Uuid::new_v4();
    let campaign = h.campaigns.create(advertiser, sample_campaign(2), true).unwrap();
    h.ledger
        .purchase(advertiser, 12, "card".into(), "starter".into())
        .unwrap();

    // 12 -> 10: exactly at the threshold, no alert yet
    h.recorder
        .record_impression(campaign.id, user, &ActivityMeta::default())
        .unwrap();
    assert!(h.dispatch.notifications.lock().unwrap().is_empty());

    // 10 -> 8: under the threshold, the alert carries the new balance
    h.recorder
        .record_impression(campaign.id, user, &ActivityMeta::default())
        .unwrap();
    assert!(h
        .dispatch
        .notifications
        .lock()
        .unwrap()
        .iter()
        .any(|n| matches!(
            n,
            AdNotification::LowBalance {
                balance: 8,
                threshold: 10,
                ..
            }
        )));
}

#[test]
fn test_concurrent_impressions_never_overdraw_or_lose_exposure() {
    let h = harness();
    let advertiser = Uuid::new_v4();
    let user = Uuid::new_v4();
    let campaign = h.campaigns.create(advertiser, sample_campaign(1), true).unwrap();
    h.ledger
        .purchase(advertiser, 20, "card".into(), "starter".into())
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let recorder = Arc::clone(&h.recorder);
            let campaign_id = campaign.id;
            std::thread::spawn(move || {
                let mut ok = 0u64;
                for _ in 0..10 {
                    if recorder
                        .record_impression(campaign_id, user, &ActivityMeta::default())
                        .is_ok()
                    {
                        ok += 1;
                    }
                }
                ok
            })
        })
        .collect();
    let succeeded: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // 40 attempts against 20 credits: exactly 20 can be billed
    assert_eq!(succeeded, 20);
    let balance = h.ledger.balance_of(advertiser);
    assert_eq!(balance.balance, 0);
    assert_eq!(balance.total_spent, 20);

    // One exposure entry; every attempt incremented before the debit, so
    // the count covers at least the billed impressions
    let record = h.exposure.get(user, campaign.id).unwrap();
    assert!(record.times_seen >= 20);
    let campaign = h.campaigns.get(campaign.id).unwrap();
    assert_eq!(campaign.metrics.impressions, 20);
    assert_eq!(campaign.metrics.unique_users, 1);
}
