//! Campaign domain — ad campaigns, targeting, lifecycle state machine,
//! and the in-memory campaign store.
//!
//! Data stored in DashMap (development); swap to MongoDB/PostgreSQL for
//! production.

pub mod models;
pub mod store;

pub use models::{
    Campaign, CampaignMetrics, CampaignState, CreateCampaignRequest, Creative, PriorityTier,
    TargetGender, Targeting, UpdateCampaignRequest,
};
pub use store::{CampaignStore, RevenueReport};
