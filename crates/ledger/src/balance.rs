//! Advertiser balance engine. Invariant: for every advertiser,
//! `balance = total_purchased + total_bonuses - total_spent`, and the
//! balance never goes negative, even under concurrent spend attempts.

use crate::transactions::{Transaction, TransactionDetail};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dega_core::{AdError, AdResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Balance below this many credits raises the low-balance alert flag.
const DEFAULT_ALERT_THRESHOLD: u64 = 10;

/// Signed transaction amount for a credit-side mutation. Amounts beyond
/// `i64::MAX` cannot be recorded faithfully and are rejected up front.
fn signed(amount: u64) -> AdResult<i64> {
    i64::try_from(amount).map_err(|_| {
        AdError::InvalidArgument(format!(
            "amount {amount} exceeds the per-transaction maximum"
        ))
    })
}

/// Overflow-checked counter update; the invariant only holds if every
/// addition is rejected before it can wrap.
fn add_checked(current: u64, amount: u64) -> AdResult<u64> {
    current.checked_add(amount).ok_or_else(|| {
        AdError::InvalidArgument(format!("amount {amount} overflows the ledger"))
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertiserBalance {
    pub advertiser_id: Uuid,
    pub balance: u64,
    pub total_purchased: u64,
    pub total_spent: u64,
    pub total_bonuses: u64,
    pub low_balance_alert: bool,
    pub alert_threshold: u64,
    pub last_recharge: Option<DateTime<Utc>>,
    pub last_spend: Option<DateTime<Utc>>,
}

impl AdvertiserBalance {
    fn new(advertiser_id: Uuid) -> Self {
        Self {
            advertiser_id,
            balance: 0,
            total_purchased: 0,
            total_spent: 0,
            total_bonuses: 0,
            low_balance_alert: true,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            last_recharge: None,
            last_spend: None,
        }
    }

    fn refresh_alert(&mut self) {
        self.low_balance_alert = self.balance < self.alert_threshold;
    }
}

/// Thread-safe credit ledger. All mutations run inside the balance shard
/// lock and append exactly one transaction before releasing it.
pub struct CreditLedger {
    balances: DashMap<Uuid, AdvertiserBalance>,
    transactions: DashMap<Uuid, Vec<Transaction>>,
}

impl CreditLedger {
    pub fn new() -> Self {
        info!("Credit ledger initialized (in-memory, development mode)");
        Self {
            balances: DashMap::new(),
            transactions: DashMap::new(),
        }
    }

    /// Idempotent: returns the advertiser's balance, creating a zeroed one
    /// on first access.
    pub fn balance_of(&self, advertiser_id: Uuid) -> AdvertiserBalance {
        self.balances
            .entry(advertiser_id)
            .or_insert_with(|| AdvertiserBalance::new(advertiser_id))
            .value()
            .clone()
    }

    /// Credit purchase: increases balance and the purchased total.
    pub fn purchase(
        &self,
        advertiser_id: Uuid,
        amount: u64,
        payment_method: String,
        package: String,
    ) -> AdResult<AdvertiserBalance> {
        self.credit(
            advertiser_id,
            amount,
            TransactionDetail::Purchase {
                payment_method,
                package,
            },
        )
    }

    /// Promotional/bonus credit: increases balance and the bonus total.
    pub fn grant_bonus(
        &self,
        advertiser_id: Uuid,
        amount: u64,
        reason: String,
    ) -> AdResult<AdvertiserBalance> {
        self.credit(advertiser_id, amount, TransactionDetail::Bonus { reason })
    }

    /// Refund of previously spent credits: increases balance and rolls the
    /// spent total back, keeping the balance invariant intact.
    pub fn refund(
        &self,
        advertiser_id: Uuid,
        amount: u64,
        campaign_id: Option<Uuid>,
        reason: String,
    ) -> AdResult<AdvertiserBalance> {
        if amount == 0 {
            return Err(AdError::InvalidArgument(
                "refund amount must be positive".into(),
            ));
        }
        let amount_signed = signed(amount)?;
        let mut entry = self
            .balances
            .entry(advertiser_id)
            .or_insert_with(|| AdvertiserBalance::new(advertiser_id));
        let b = entry.value_mut();
        if amount > b.total_spent {
            return Err(AdError::InvalidArgument(format!(
                "refund of {amount} exceeds total spent {}",
                b.total_spent
            )));
        }
        let before = b.balance;
        b.balance = add_checked(b.balance, amount)?;
        b.total_spent -= amount;
        b.refresh_alert();
        let snapshot = b.clone();
        self.append(Transaction::new(
            advertiser_id,
            amount_signed,
            before,
            snapshot.balance,
            TransactionDetail::Refund {
                campaign_id,
                reason,
            },
        ));
        Ok(snapshot)
    }

    /// Operator correction. Positive deltas are booked as bonus credit;
    /// negative deltas are booked as spend and must be covered by the
    /// current balance.
    pub fn adjust(
        &self,
        advertiser_id: Uuid,
        delta: i64,
        note: String,
    ) -> AdResult<AdvertiserBalance> {
        if delta == 0 {
            return Err(AdError::InvalidArgument(
                "adjustment delta must be non-zero".into(),
            ));
        }
        let mut entry = self
            .balances
            .entry(advertiser_id)
            .or_insert_with(|| AdvertiserBalance::new(advertiser_id));
        let b = entry.value_mut();
        let before = b.balance;
        if delta > 0 {
            let amount = delta as u64;
            let new_balance = add_checked(b.balance, amount)?;
            b.total_bonuses = add_checked(b.total_bonuses, amount)?;
            b.balance = new_balance;
        } else {
            let amount = delta.unsigned_abs();
            if amount > b.balance {
                return Err(AdError::InsufficientFunds {
                    balance: b.balance,
                    required: amount,
                });
            }
            let new_spent = add_checked(b.total_spent, amount)?;
            b.balance -= amount;
            b.total_spent = new_spent;
        }
        b.refresh_alert();
        let snapshot = b.clone();
        self.append(Transaction::new(
            advertiser_id,
            delta,
            before,
            snapshot.balance,
            TransactionDetail::Adjustment { note },
        ));
        Ok(snapshot)
    }

    /// Deduct ad spend. Re-validates coverage inside the shard lock: the
    /// caller's pre-check may have raced another spend, and the balance
    /// must never go negative regardless.
    pub fn deduct(
        &self,
        advertiser_id: Uuid,
        amount: u64,
        campaign_id: Uuid,
        impressions: u64,
    ) -> AdResult<AdvertiserBalance> {
        if amount == 0 {
            return Err(AdError::InvalidArgument(
                "spend amount must be positive".into(),
            ));
        }
        let amount_signed = signed(amount)?;
        let mut entry = self
            .balances
            .entry(advertiser_id)
            .or_insert_with(|| AdvertiserBalance::new(advertiser_id));
        let b = entry.value_mut();
        if amount > b.balance {
            return Err(AdError::InsufficientFunds {
                balance: b.balance,
                required: amount,
            });
        }
        let before = b.balance;
        let new_spent = add_checked(b.total_spent, amount)?;
        b.balance -= amount;
        b.total_spent = new_spent;
        b.last_spend = Some(Utc::now());
        b.refresh_alert();
        let snapshot = b.clone();
        debug!(advertiser_id = %advertiser_id, amount, balance = snapshot.balance, "Credits deducted");
        self.append(Transaction::new(
            advertiser_id,
            -amount_signed,
            before,
            snapshot.balance,
            TransactionDetail::Spend {
                campaign_id,
                impressions,
            },
        ));
        Ok(snapshot)
    }

    /// Transaction history for an advertiser, newest first.
    pub fn transactions(&self, advertiser_id: Uuid, limit: usize) -> Vec<Transaction> {
        let mut history: Vec<Transaction> = self
            .transactions
            .get(&advertiser_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history.truncate(limit);
        history
    }

    fn credit(
        &self,
        advertiser_id: Uuid,
        amount: u64,
        detail: TransactionDetail,
    ) -> AdResult<AdvertiserBalance> {
        if amount == 0 {
            return Err(AdError::InvalidArgument(
                "credit amount must be positive".into(),
            ));
        }
        let amount_signed = signed(amount)?;
        let mut entry = self
            .balances
            .entry(advertiser_id)
            .or_insert_with(|| AdvertiserBalance::new(advertiser_id));
        let b = entry.value_mut();
        let before = b.balance;
        let new_balance = add_checked(b.balance, amount)?;
        match detail {
            TransactionDetail::Bonus { .. } => {
                b.total_bonuses = add_checked(b.total_bonuses, amount)?
            }
            _ => b.total_purchased = add_checked(b.total_purchased, amount)?,
        }
        b.balance = new_balance;
        b.last_recharge = Some(Utc::now());
        b.refresh_alert();
        let snapshot = b.clone();
        info!(advertiser_id = %advertiser_id, amount, balance = snapshot.balance, "Credits added");
        self.append(Transaction::new(
            advertiser_id,
            amount_signed,
            before,
            snapshot.balance,
            detail,
        ));
        Ok(snapshot)
    }

    fn append(&self, tx: Transaction) {
        self.transactions
            .entry(tx.advertiser_id)
            .or_default()
            .push(tx);
    }
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transactions::TransactionKind;
    use std::sync::Arc;

    fn assert_invariant(b: &AdvertiserBalance) {
        assert_eq!(
            b.balance,
            b.total_purchased + b.total_bonuses - b.total_spent
        );
    }

    #[test]
    fn test_balance_of_is_idempotent() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        let first = ledger.balance_of(advertiser);
        assert_eq!(first.balance, 0);
        assert!(first.low_balance_alert);

        ledger
            .purchase(advertiser, 100, "card".into(), "starter".into())
            .unwrap();
        let second = ledger.balance_of(advertiser);
        assert_eq!(second.balance, 100);
    }

    #[test]
    fn test_purchase_and_bonus_update_counters() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();

        let b = ledger
            .purchase(advertiser, 50, "card".into(), "starter".into())
            .unwrap();
        assert_eq!(b.total_purchased, 50);
        assert!(b.last_recharge.is_some());
        assert!(!b.low_balance_alert);
        assert_invariant(&b);

        let b = ledger
            .grant_bonus(advertiser, 25, "signup promo".into())
            .unwrap();
        assert_eq!(b.balance, 75);
        assert_eq!(b.total_bonuses, 25);
        assert_invariant(&b);
    }

    #[test]
    fn test_zero_amounts_are_rejected() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        assert!(matches!(
            ledger.purchase(advertiser, 0, "card".into(), "starter".into()),
            Err(AdError::InvalidArgument(_))
        ));
        assert!(matches!(
            ledger.deduct(advertiser, 0, Uuid::new_v4(), 1),
            Err(AdError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_oversized_credit_is_rejected_without_mutation() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();

        // Beyond the signed transaction range: rejected outright
        let err = ledger
            .purchase(advertiser, u64::MAX, "card".into(), "whale".into())
            .unwrap_err();
        assert!(matches!(err, AdError::InvalidArgument(_)));
        assert_eq!(ledger.balance_of(advertiser).balance, 0);
        assert!(ledger.transactions(advertiser, 10).is_empty());

        // A sane purchase still goes through afterwards
        let b = ledger
            .purchase(advertiser, 1, "card".into(), "starter".into())
            .unwrap();
        assert_eq!(b.balance, 1);
    }

    #[test]
    fn test_balance_overflow_is_rejected_without_mutation() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        let max = i64::MAX as u64;
        ledger
            .purchase(advertiser, max, "wire".into(), "enterprise".into())
            .unwrap();
        ledger
            .grant_bonus(advertiser, max, "launch promo".into())
            .unwrap();

        // Balance sits at u64::MAX - 1; any further credit must not wrap
        let err = ledger.grant_bonus(advertiser, 2, "promo".into()).unwrap_err();
        assert!(matches!(err, AdError::InvalidArgument(_)));
        let err = ledger.adjust(advertiser, 2, "correction".into()).unwrap_err();
        assert!(matches!(err, AdError::InvalidArgument(_)));

        let b = ledger.balance_of(advertiser);
        assert_eq!(b.balance, u64::MAX - 1);
        assert_eq!(ledger.transactions(advertiser, 10).len(), 2);
        assert_invariant(&b);
    }

    #[test]
    fn test_overdraft_fails_and_leaves_balance_unchanged() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        ledger
            .purchase(advertiser, 5, "card".into(), "starter".into())
            .unwrap();

        let err = ledger.deduct(advertiser, 6, Uuid::new_v4(), 1).unwrap_err();
        assert!(matches!(
            err,
            AdError::InsufficientFunds {
                balance: 5,
                required: 6
            }
        ));

        let b = ledger.balance_of(advertiser);
        assert_eq!(b.balance, 5);
        assert_eq!(b.total_spent, 0);
        // The rejected spend must not leave a transaction behind
        assert_eq!(ledger.transactions(advertiser, 10).len(), 1);
    }

    #[test]
    fn test_spend_pairs_with_exactly_one_transaction() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        let campaign = Uuid::new_v4();
        ledger
            .purchase(advertiser, 10, "card".into(), "starter".into())
            .unwrap();

        ledger.deduct(advertiser, 3, campaign, 1).unwrap();

        let spends: Vec<_> = ledger
            .transactions(advertiser, 10)
            .into_iter()
            .filter(|t| t.kind == TransactionKind::Spend)
            .collect();
        assert_eq!(spends.len(), 1);
        let tx = &spends[0];
        assert_eq!(tx.amount, -3);
        assert_eq!(tx.balance_before, 10);
        assert_eq!(tx.balance_after, 7);
        assert_eq!(
            tx.detail,
            TransactionDetail::Spend {
                campaign_id: campaign,
                impressions: 1
            }
        );
    }

    #[test]
    fn test_low_balance_alert_tracks_threshold() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        let b = ledger
            .purchase(advertiser, 12, "card".into(), "starter".into())
            .unwrap();
        assert!(!b.low_balance_alert);

        let b = ledger.deduct(advertiser, 3, Uuid::new_v4(), 1).unwrap();
        assert_eq!(b.balance, 9);
        assert!(b.low_balance_alert);
    }

    #[test]
    fn test_refund_rolls_back_spend() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        let campaign = Uuid::new_v4();
        ledger
            .purchase(advertiser, 10, "card".into(), "starter".into())
            .unwrap();
        ledger.deduct(advertiser, 4, campaign, 1).unwrap();

        let b = ledger
            .refund(advertiser, 4, Some(campaign), "billing dispute".into())
            .unwrap();
        assert_eq!(b.balance, 10);
        assert_eq!(b.total_spent, 0);
        assert_invariant(&b);

        assert!(matches!(
            ledger.refund(advertiser, 1, None, "nothing left".into()),
            Err(AdError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_adjustment_keeps_invariant() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        let b = ledger
            .adjust(advertiser, 20, "migration correction".into())
            .unwrap();
        assert_eq!(b.balance, 20);
        assert_invariant(&b);

        let b = ledger
            .adjust(advertiser, -5, "duplicate grant".into())
            .unwrap();
        assert_eq!(b.balance, 15);
        assert_invariant(&b);

        assert!(matches!(
            ledger.adjust(advertiser, -100, "too much".into()),
            Err(AdError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_transactions_newest_first_with_limit() {
        let ledger = CreditLedger::new();
        let advertiser = Uuid::new_v4();
        ledger
            .purchase(advertiser, 100, "card".into(), "starter".into())
            .unwrap();
        for _ in 0..5 {
            ledger.deduct(advertiser, 1, Uuid::new_v4(), 1).unwrap();
        }

        let history = ledger.transactions(advertiser, 3);
        assert_eq!(history.len(), 3);
        assert!(history
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(history.iter().all(|t| t.kind == TransactionKind::Spend));
    }

    #[test]
    fn test_balance_never_negative_under_concurrent_spends() {
        let ledger = Arc::new(CreditLedger::new());
        let advertiser = Uuid::new_v4();
        let campaign = Uuid::new_v4();
        ledger
            .purchase(advertiser, 50, "card".into(), "starter".into())
            .unwrap();

        // 8 threads racing for 100 single-credit spends; only 50 can win.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut won = 0u64;
                    for _ in 0..100 {
                        if ledger.deduct(advertiser, 1, campaign, 1).is_ok() {
                            won += 1;
                        }
                    }
                    won
                })
            })
            .collect();
        let total_won: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total_won, 50);
        let b = ledger.balance_of(advertiser);
        assert_eq!(b.balance, 0);
        assert_eq!(b.total_spent, 50);
        assert_invariant(&b);

        let spends = ledger
            .transactions(advertiser, 1000)
            .into_iter()
            .filter(|t| t.kind == TransactionKind::Spend)
            .count();
        assert_eq!(spends, 50);
    }
}
