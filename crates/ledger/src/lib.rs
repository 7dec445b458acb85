//! Credit ledger — advertiser balances and the append-only transaction
//! history behind DegaCoin ad spend.
//!
//! Balances live in DashMap (development); every mutation happens under the
//! shard lock and appends exactly one transaction record, so the audit trail
//! cannot drift from the balance. Production: swap to the document store's
//! conditional-update primitive behind the same API.

pub mod balance;
pub mod transactions;

pub use balance::{AdvertiserBalance, CreditLedger};
pub use transactions::{Transaction, TransactionDetail, TransactionKind};
