//! Account types for z-loyalty.
//!
//! This module defines the per-customer loyalty account: running balance,
//! lifetime totals, derived tier, and birthday reward state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, CustomerId, Tier};

/// A loyalty account for a customer.
///
/// The account tracks the spendable point balance, the monotone lifetime
/// totals it is derived from, and the discount tier derived from lifetime
/// earnings. One account exists per customer; accounts are created lazily on
/// first reference and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// System-generated account ID.
    pub id: AccountId,

    /// The external customer identity this account belongs to (unique).
    pub customer_id: CustomerId,

    /// Current spendable point balance. Never negative.
    ///
    /// Always equals `total_earned - total_redeemed`.
    pub points_balance: i64,

    /// Lifetime sum of all positive earn transactions. Never decreases.
    pub total_earned: i64,

    /// Lifetime sum of all redemptions. Never decreases.
    pub total_redeemed: i64,

    /// Discount tier derived from `total_earned`. Never regresses.
    pub tier: Tier,

    /// Customer birthday, if known. Only month and day are significant for
    /// reward eligibility.
    pub birthday: Option<NaiveDate>,

    /// Last calendar year a birthday reward was granted, if any.
    pub birthday_reward_sent_year: Option<i32>,

    /// Opaque metadata supplied by callers; never interpreted by the core.
    pub metadata: serde_json::Value,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balances and the base tier.
    #[must_use]
    pub fn new(customer_id: CustomerId) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::generate(),
            customer_id,
            points_balance: 0,
            total_earned: 0,
            total_redeemed: 0,
            tier: Tier::Bronze,
            birthday: None,
            birthday_reward_sent_year: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account has sufficient points for a redemption.
    #[must_use]
    pub fn has_sufficient_points(&self, points: i64) -> bool {
        self.points_balance >= points
    }
}
