//! Shared domain types for the ads subsystem — user ad profiles, activity
//! events, and the injected side-channel interfaces (analytics, notifications).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── User Ad Profile ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Read-only view of a user for ad targeting. Sourced from the main profile
/// service; the ads subsystem never writes demographic fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAdProfile {
    pub user_id: Uuid,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[serde(default)]
    pub interests: Vec<String>,
    /// User opted out of personalized (geo-targeted) ads.
    #[serde(default)]
    pub personalized_ads_opt_out: bool,
    pub geo_region: Option<String>,
}

impl UserAdProfile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            birth_date: None,
            gender: None,
            interests: Vec::new(),
            personalized_ads_opt_out: false,
            geo_region: None,
        }
    }

    /// Age in whole years at `now`, if the birth date is known.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<u32> {
        let birth = self.birth_date?;
        let today = now.date_naive();
        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }
}

// ─── Activity Events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    View,
    Click,
}

/// One ad interaction, logged to the analytics backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_id: Uuid,
    pub kind: ActivityKind,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    pub advertiser_id: Uuid,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Client-supplied metadata attached to an impression or click.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityMeta {
    pub device: Option<String>,
    pub browser: Option<String>,
    pub location: Option<String>,
}

impl ActivityEvent {
    pub fn new(
        kind: ActivityKind,
        campaign_id: Uuid,
        user_id: Uuid,
        advertiser_id: Uuid,
        meta: &ActivityMeta,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            campaign_id,
            user_id,
            advertiser_id,
            device: meta.device.clone(),
            browser: meta.browser.clone(),
            location: meta.location.clone(),
            timestamp: Utc::now(),
        }
    }
}

// ─── Side-channel interfaces ────────────────────────────────────────────────

/// Non-blocking analytics recording. Implementations own their failures:
/// a dropped event is logged by the sink, never surfaced to the caller,
/// so the billing path cannot fail on an analytics hiccup.
pub trait ActivitySink: Send + Sync {
    fn record(&self, event: ActivityEvent);
}

/// Sink that discards everything. Used in tests and when the analytics
/// backend is unavailable at startup.
pub struct NullSink;

impl ActivitySink for NullSink {
    fn record(&self, _event: ActivityEvent) {}
}

/// Events the ads subsystem emits toward the platform's notification
/// fan-out. Injected so the core never holds a live transport handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdNotification {
    CampaignOutOfCredit {
        campaign_id: Uuid,
        advertiser_id: Uuid,
    },
    LowBalance {
        advertiser_id: Uuid,
        balance: u64,
        threshold: u64,
    },
    CampaignApproved {
        campaign_id: Uuid,
        advertiser_id: Uuid,
    },
    CampaignRejected {
        campaign_id: Uuid,
        advertiser_id: Uuid,
        reason: String,
    },
}

pub trait NotificationDispatch: Send + Sync {
    fn dispatch(&self, notification: AdNotification);
}

/// Dispatcher that drops notifications on the floor (tests, api-only mode).
pub struct NullDispatch;

impl NotificationDispatch for NullDispatch {
    fn dispatch(&self, _notification: AdNotification) {}
}
