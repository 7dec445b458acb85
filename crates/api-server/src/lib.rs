//! HTTP surface for the ads subsystem — public delivery/ledger endpoints,
//! capability-gated admin endpoints, and operational probes.

pub mod admin;
pub mod auth;
pub mod profiles;
pub mod rest;
pub mod server;

pub use profiles::ProfileRegistry;
pub use rest::AppState;
pub use server::AdsServer;
