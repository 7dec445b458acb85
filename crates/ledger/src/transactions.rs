//! Immutable transaction records. Created once per balance mutation,
//! never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Spend,
    Bonus,
    Refund,
    Adjustment,
}

/// Kind-specific metadata carried on a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionDetail {
    Purchase {
        payment_method: String,
        package: String,
    },
    Spend {
        campaign_id: Uuid,
        impressions: u64,
    },
    Bonus {
        reason: String,
    },
    Refund {
        campaign_id: Option<Uuid>,
        reason: String,
    },
    Adjustment {
        note: String,
    },
}

impl TransactionDetail {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionDetail::Purchase { .. } => TransactionKind::Purchase,
            TransactionDetail::Spend { .. } => TransactionKind::Spend,
            TransactionDetail::Bonus { .. } => TransactionKind::Bonus,
            TransactionDetail::Refund { .. } => TransactionKind::Refund,
            TransactionDetail::Adjustment { .. } => TransactionKind::Adjustment,
        }
    }
}

/// One balance-affecting event, with the before/after snapshot taken under
/// the same lock as the mutation itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub kind: TransactionKind,
    /// Signed credit delta: positive for credits in, negative for spend.
    pub amount: i64,
    pub balance_before: u64,
    pub balance_after: u64,
    pub detail: TransactionDetail,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        advertiser_id: Uuid,
        amount: i64,
        balance_before: u64,
        balance_after: u64,
        detail: TransactionDetail,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            advertiser_id,
            kind: detail.kind(),
            amount,
            balance_before,
            balance_after,
            detail,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_determines_kind() {
        let spend = TransactionDetail::Spend {
            campaign_id: Uuid::new_v4(),
            impressions: 1,
        };
        assert_eq!(spend.kind(), TransactionKind::Spend);

        let tx = Transaction::new(Uuid::new_v4(), -3, 10, 7, spend);
        assert_eq!(tx.kind, TransactionKind::Spend);
        assert_eq!(tx.balance_before - 3, tx.balance_after);
    }
}
