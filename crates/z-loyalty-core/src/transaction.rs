//! Transaction types for the loyalty ledger.
//!
//! Every balance change is recorded as an immutable `PointsTransaction`.
//! The ledger is append-only: corrections are new `adjust` transactions,
//! never edits of existing records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, TransactionId};

/// An immutable record of a single points delta on an account.
///
/// Transactions use ULIDs for time-ordered IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The account whose balance was affected.
    pub account_id: AccountId,

    /// Point delta. Positive for earn/positive-adjust, negative for
    /// redeem/negative-adjust.
    pub points: i64,

    /// Kind of transaction.
    pub kind: TransactionKind,

    /// Free-text reason, if any.
    pub reason: Option<String>,

    /// External idempotency key identifying the purchase that triggered an
    /// earn, if any. At most one earn transaction exists per
    /// `(account_id, order_id)` pair.
    pub order_id: Option<String>,

    /// Opaque metadata supplied by callers.
    pub metadata: serde_json::Value,

    /// When the transaction was created. Immutable.
    pub created_at: DateTime<Utc>,
}

impl PointsTransaction {
    /// Create a new earn transaction. The delta is always positive.
    #[must_use]
    pub fn earn(
        account_id: AccountId,
        points: i64,
        reason: Option<String>,
        order_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            points: points.abs(),
            kind: TransactionKind::Earn,
            reason,
            order_id,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Create a new redeem transaction. The delta is always negative.
    #[must_use]
    pub fn redeem(
        account_id: AccountId,
        points: i64,
        reason: Option<String>,
        order_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            points: -points.abs(),
            kind: TransactionKind::Redeem,
            reason,
            order_id,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Create a new manual adjustment transaction. The delta keeps its sign.
    #[must_use]
    pub fn adjust(
        account_id: AccountId,
        delta: i64,
        reason: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            points: delta,
            kind: TransactionKind::Adjust,
            reason,
            order_id: None,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Kind of points transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Points accrued from a purchase or promotion.
    Earn,

    /// Points spent by the customer.
    Redeem,

    /// Manual correction by an operator.
    Adjust,
}

impl TransactionKind {
    /// Get the kind name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Redeem => "redeem",
            Self::Adjust => "adjust",
        }
    }

    /// Stable single-byte tag used in storage keys.
    #[must_use]
    pub const fn as_byte(&self) -> u8 {
        match self {
            Self::Earn => 0,
            Self::Redeem => 1,
            Self::Adjust => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earn_transaction_is_positive() {
        let account_id = AccountId::generate();
        let tx = PointsTransaction::earn(
            account_id,
            500,
            Some("order completed".into()),
            Some("order_1".into()),
            serde_json::Value::Null,
        );

        assert_eq!(tx.points, 500);
        assert_eq!(tx.kind, TransactionKind::Earn);
        assert_eq!(tx.order_id.as_deref(), Some("order_1"));
    }

    #[test]
    fn redeem_transaction_is_negative() {
        let account_id = AccountId::generate();
        let tx = PointsTransaction::redeem(
            account_id,
            300,
            None,
            None,
            serde_json::json!({"channel": "checkout"}),
        );

        assert_eq!(tx.points, -300);
        assert_eq!(tx.kind, TransactionKind::Redeem);
        assert!(tx.order_id.is_none());
    }

    #[test]
    fn adjust_transaction_keeps_sign() {
        let account_id = AccountId::generate();
        let up = PointsTransaction::adjust(account_id, 250, None, serde_json::Value::Null);
        let down = PointsTransaction::adjust(account_id, -250, None, serde_json::Value::Null);

        assert_eq!(up.points, 250);
        assert_eq!(down.points, -250);
        assert_eq!(up.kind, TransactionKind::Adjust);
        assert!(up.order_id.is_none());
    }

    #[test]
    fn kind_byte_tags_are_distinct() {
        assert_ne!(
            TransactionKind::Earn.as_byte(),
            TransactionKind::Redeem.as_byte()
        );
        assert_ne!(
            TransactionKind::Redeem.as_byte(),
            TransactionKind::Adjust.as_byte()
        );
    }
}
