//! The points engine: the only component that writes accounts and ledger.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Datelike, NaiveDate, Utc};
use dashmap::DashMap;

use z_loyalty_core::{
    birthday, points_for_amount, Account, CustomerId, LoyaltyError, PointsTransaction, Result,
    Tier, TierInfo, TransactionKind,
};
use z_loyalty_store::{Store, StoreError};

/// Maximum number of transactions returned per page.
pub const MAX_PAGE_SIZE: usize = 100;

/// Optional attributes attached to an award or redemption.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Free-text reason recorded on the transaction.
    pub reason: Option<String>,

    /// External idempotency key identifying the triggering purchase.
    pub order_id: Option<String>,

    /// Opaque metadata recorded on the transaction.
    pub metadata: Option<serde_json::Value>,
}

impl TransactionOptions {
    /// Options carrying only an order ID.
    #[must_use]
    pub fn for_order(order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            ..Self::default()
        }
    }

    fn metadata_value(&self) -> serde_json::Value {
        self.metadata.clone().unwrap_or(serde_json::Value::Null)
    }
}

/// Result of an award operation.
#[derive(Debug, Clone)]
pub struct AwardOutcome {
    /// The account after the operation.
    pub account: Account,

    /// Whether the award moved the account into a higher tier.
    pub tier_upgraded: bool,

    /// Whether an earn transaction for this order already existed; when
    /// true, nothing was mutated.
    pub already_processed: bool,
}

/// Orchestrates awarding, redemption, tier derivation, and the birthday
/// reward gate over an injected store.
///
/// The engine is the single writer for accounts and the ledger. Each
/// customer's mutations are serialized through a lock-table entry, and every
/// balance change is committed together with its transaction in one atomic
/// store write.
pub struct PointsEngine<S: Store> {
    store: Arc<S>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: Store> PointsEngine<S> {
    /// Create a new engine over the given store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// Return the existing account for a customer, creating a zero-balance
    /// bronze account on first reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_or_create_account(&self, customer_id: &CustomerId) -> Result<Account> {
        Ok(self.store.get_or_create_account(customer_id)?)
    }

    /// Award points to a customer.
    ///
    /// When `options.order_id` is set and an earn transaction for that order
    /// already exists, the call is a no-op returning
    /// `already_processed: true` — repeated delivery from the order system
    /// degrades to exactly-once ledger effect.
    ///
    /// # Errors
    ///
    /// - `LoyaltyError::InvalidPoints` if `points` is not positive.
    /// - `LoyaltyError::Storage`/`Serialization` if the store fails.
    pub fn award_points(
        &self,
        customer_id: &CustomerId,
        points: i64,
        options: TransactionOptions,
    ) -> Result<AwardOutcome> {
        if points <= 0 {
            return Err(LoyaltyError::InvalidPoints(format!(
                "award must be a positive number of points, got {points}"
            )));
        }

        let lock = self.customer_lock(customer_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let account = self.store.get_or_create_account(customer_id)?;

        if let Some(order_id) = options.order_id.as_deref() {
            if self
                .store
                .has_order_transaction(&account.id, order_id, TransactionKind::Earn)?
            {
                tracing::debug!(
                    customer_id = %customer_id,
                    order_id,
                    "duplicate award ignored"
                );
                return Ok(AwardOutcome {
                    account,
                    tier_upgraded: false,
                    already_processed: true,
                });
            }
        }

        let transaction = PointsTransaction::earn(
            account.id,
            points,
            options.reason.clone(),
            options.order_id.clone(),
            options.metadata_value(),
        );

        let previous_tier = account.tier;
        let mut updated = account;
        updated.points_balance += points;
        updated.total_earned += points;
        updated.tier = Tier::for_total_earned(updated.total_earned);
        updated.updated_at = Utc::now();
        let tier_upgraded = updated.tier > previous_tier;

        match self.store.commit(&updated, &transaction) {
            Ok(()) => {}
            Err(StoreError::DuplicateOrder { order_id }) => {
                // Another writer recorded this order between our probe and
                // the commit; fold into the idempotent no-op path.
                tracing::debug!(
                    customer_id = %customer_id,
                    order_id = %order_id,
                    "duplicate award ignored at commit"
                );
                let account = self.store.get_or_create_account(customer_id)?;
                return Ok(AwardOutcome {
                    account,
                    tier_upgraded: false,
                    already_processed: true,
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            customer_id = %customer_id,
            points,
            balance = updated.points_balance,
            total_earned = updated.total_earned,
            tier = updated.tier.as_str(),
            tier_upgraded,
            "points awarded"
        );

        Ok(AwardOutcome {
            account: updated,
            tier_upgraded,
            already_processed: false,
        })
    }

    /// Redeem points from a customer's balance.
    ///
    /// Tier is not recomputed: it is driven by lifetime earnings only and
    /// never decreases.
    ///
    /// # Errors
    ///
    /// - `LoyaltyError::InvalidPoints` if `points` is not positive.
    /// - `LoyaltyError::InsufficientPoints` if `points` exceeds the current
    ///   balance; no state changes.
    /// - `LoyaltyError::Storage`/`Serialization` if the store fails.
    pub fn redeem_points(
        &self,
        customer_id: &CustomerId,
        points: i64,
        options: TransactionOptions,
    ) -> Result<Account> {
        if points <= 0 {
            return Err(LoyaltyError::InvalidPoints(format!(
                "redemption must be a positive number of points, got {points}"
            )));
        }

        let lock = self.customer_lock(customer_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let account = self.store.get_or_create_account(customer_id)?;

        if account.points_balance < points {
            tracing::warn!(
                customer_id = %customer_id,
                requested = points,
                balance = account.points_balance,
                "redemption rejected"
            );
            return Err(LoyaltyError::InsufficientPoints {
                balance: account.points_balance,
                requested: points,
            });
        }

        let transaction = PointsTransaction::redeem(
            account.id,
            points,
            options.reason.clone(),
            options.order_id.clone(),
            options.metadata_value(),
        );

        let mut updated = account;
        updated.points_balance -= points;
        updated.total_redeemed += points;
        updated.updated_at = Utc::now();

        self.store.commit(&updated, &transaction)?;

        tracing::info!(
            customer_id = %customer_id,
            points,
            balance = updated.points_balance,
            total_redeemed = updated.total_redeemed,
            "points redeemed"
        );

        Ok(updated)
    }

    /// Apply a signed manual correction to a customer's balance.
    ///
    /// Positive deltas count toward lifetime earnings (and may upgrade the
    /// tier); negative deltas count toward lifetime redemptions and are
    /// bounded by the current balance.
    ///
    /// # Errors
    ///
    /// - `LoyaltyError::InvalidPoints` if `delta` is zero.
    /// - `LoyaltyError::InsufficientPoints` if a negative `delta` exceeds
    ///   the current balance.
    /// - `LoyaltyError::Storage`/`Serialization` if the store fails.
    pub fn adjust_points(
        &self,
        customer_id: &CustomerId,
        delta: i64,
        reason: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Account> {
        if delta == 0 {
            return Err(LoyaltyError::InvalidPoints(
                "adjustment must be non-zero".to_string(),
            ));
        }

        let lock = self.customer_lock(customer_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let account = self.store.get_or_create_account(customer_id)?;

        if delta < 0 && account.points_balance < -delta {
            return Err(LoyaltyError::InsufficientPoints {
                balance: account.points_balance,
                requested: -delta,
            });
        }

        let transaction = PointsTransaction::adjust(
            account.id,
            delta,
            reason,
            metadata.unwrap_or(serde_json::Value::Null),
        );

        let mut updated = account;
        updated.points_balance += delta;
        if delta > 0 {
            updated.total_earned += delta;
            updated.tier = Tier::for_total_earned(updated.total_earned);
        } else {
            updated.total_redeemed += -delta;
        }
        updated.updated_at = Utc::now();

        self.store.commit(&updated, &transaction)?;

        tracing::info!(
            customer_id = %customer_id,
            delta,
            balance = updated.points_balance,
            "points adjusted"
        );

        Ok(updated)
    }

    /// Map lifetime earned points to a tier.
    #[must_use]
    pub fn calculate_tier(total_earned: i64) -> Tier {
        Tier::for_total_earned(total_earned)
    }

    /// Points earned for a purchase amount at a given tier.
    #[must_use]
    pub fn calculate_points_for_amount(amount: f64, tier: Tier) -> i64 {
        points_for_amount(amount, tier)
    }

    /// Tier progress for a customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn tier_info(&self, customer_id: &CustomerId) -> Result<TierInfo> {
        let account = self.store.get_or_create_account(customer_id)?;
        Ok(TierInfo::for_account(&account))
    }

    /// List a customer's transactions, newest first.
    ///
    /// `limit` is capped at [`MAX_PAGE_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn list_transactions(
        &self,
        customer_id: &CustomerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointsTransaction>> {
        let account = self.store.get_or_create_account(customer_id)?;
        let limit = limit.min(MAX_PAGE_SIZE);
        Ok(self
            .store
            .list_transactions_by_account(&account.id, limit, offset)?)
    }

    /// Record a customer's birthday on their account.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn set_birthday(&self, customer_id: &CustomerId, birthday: NaiveDate) -> Result<Account> {
        let lock = self.customer_lock(customer_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.store.get_or_create_account(customer_id)?;
        account.birthday = Some(birthday);
        account.updated_at = Utc::now();
        self.store.put_account(&account)?;
        Ok(account)
    }

    /// Check whether the customer is eligible for a birthday reward today.
    ///
    /// False when no birthday is recorded, outside the birthday month, or
    /// when a reward was already granted this calendar year.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn is_birthday_reward_eligible(&self, customer_id: &CustomerId) -> Result<bool> {
        let account = self.store.get_or_create_account(customer_id)?;
        Ok(birthday::eligible_on(&account, Utc::now().date_naive()))
    }

    /// Mark the birthday reward as granted for the current calendar year.
    ///
    /// Idempotent: setting the same year twice is harmless. Callers should
    /// check eligibility immediately before to avoid issuing the external
    /// reward twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn mark_birthday_reward_sent(&self, customer_id: &CustomerId) -> Result<Account> {
        let lock = self.customer_lock(customer_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.store.get_or_create_account(customer_id)?;
        let year = Utc::now().year();
        account.birthday_reward_sent_year = Some(year);
        account.updated_at = Utc::now();
        self.store.put_account(&account)?;

        tracing::info!(
            customer_id = %customer_id,
            year,
            "birthday reward marked sent"
        );

        Ok(account)
    }

    /// Get or create the lock-table entry serializing this customer's
    /// mutations.
    fn customer_lock(&self, customer_id: &CustomerId) -> Arc<Mutex<()>> {
        self.locks
            .entry(customer_id.as_str().to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z_loyalty_store::MemoryStore;

    fn engine() -> PointsEngine<MemoryStore> {
        PointsEngine::new(Arc::new(MemoryStore::new()))
    }

    fn customer(id: &str) -> CustomerId {
        CustomerId::new(id).unwrap()
    }

    fn assert_balance_invariant(account: &Account) {
        assert_eq!(
            account.points_balance,
            account.total_earned - account.total_redeemed
        );
        assert_eq!(account.tier, Tier::for_total_earned(account.total_earned));
    }

    #[test]
    fn new_customer_starts_at_zero_bronze() {
        let engine = engine();
        let account = engine.get_or_create_account(&customer("cust_1")).unwrap();

        assert_eq!(account.points_balance, 0);
        assert_eq!(account.total_earned, 0);
        assert_eq!(account.tier, Tier::Bronze);
        assert_balance_invariant(&account);
    }

    #[test]
    fn award_updates_balance_and_tier() {
        let engine = engine();
        let cust = customer("cust_1");

        let outcome = engine
            .award_points(&cust, 12_000, TransactionOptions::for_order("order_1"))
            .unwrap();

        assert!(!outcome.already_processed);
        assert!(outcome.tier_upgraded);
        assert_eq!(outcome.account.total_earned, 12_000);
        assert_eq!(outcome.account.points_balance, 12_000);
        assert_eq!(outcome.account.tier, Tier::Silver);
        assert_balance_invariant(&outcome.account);
    }

    #[test]
    fn repeated_award_for_same_order_is_no_op() {
        let engine = engine();
        let cust = customer("cust_1");

        engine
            .award_points(&cust, 12_000, TransactionOptions::for_order("order_1"))
            .unwrap();
        let second = engine
            .award_points(&cust, 12_000, TransactionOptions::for_order("order_1"))
            .unwrap();

        assert!(second.already_processed);
        assert!(!second.tier_upgraded);
        assert_eq!(second.account.points_balance, 12_000);
        assert_eq!(second.account.total_earned, 12_000);

        let transactions = engine.list_transactions(&cust, 10, 0).unwrap();
        assert_eq!(transactions.len(), 1);
    }

    #[test]
    fn awards_without_order_id_are_not_deduplicated() {
        let engine = engine();
        let cust = customer("cust_1");

        engine
            .award_points(&cust, 100, TransactionOptions::default())
            .unwrap();
        let second = engine
            .award_points(&cust, 100, TransactionOptions::default())
            .unwrap();

        assert!(!second.already_processed);
        assert_eq!(second.account.points_balance, 200);
    }

    #[test]
    fn award_rejects_non_positive_points() {
        let engine = engine();
        let cust = customer("cust_1");

        assert!(matches!(
            engine.award_points(&cust, 0, TransactionOptions::default()),
            Err(LoyaltyError::InvalidPoints(_))
        ));
        assert!(matches!(
            engine.award_points(&cust, -50, TransactionOptions::default()),
            Err(LoyaltyError::InvalidPoints(_))
        ));

        // Nothing was written
        let account = engine.get_or_create_account(&cust).unwrap();
        assert_eq!(account.points_balance, 0);
        assert!(engine.list_transactions(&cust, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn redeem_decrements_balance_but_not_tier() {
        let engine = engine();
        let cust = customer("cust_1");

        engine
            .award_points(&cust, 12_000, TransactionOptions::for_order("order_1"))
            .unwrap();
        let account = engine
            .redeem_points(&cust, 5_000, TransactionOptions::default())
            .unwrap();

        assert_eq!(account.points_balance, 7_000);
        assert_eq!(account.total_redeemed, 5_000);
        assert_eq!(account.total_earned, 12_000);
        assert_eq!(account.tier, Tier::Silver);
        assert_balance_invariant(&account);
    }

    #[test]
    fn redeem_rejects_overdraft_without_mutation() {
        let engine = engine();
        let cust = customer("cust_1");

        engine
            .award_points(&cust, 12_000, TransactionOptions::for_order("order_1"))
            .unwrap();
        engine
            .redeem_points(&cust, 5_000, TransactionOptions::default())
            .unwrap();

        let result = engine.redeem_points(&cust, 8_000, TransactionOptions::default());
        assert!(matches!(
            result,
            Err(LoyaltyError::InsufficientPoints {
                balance: 7_000,
                requested: 8_000
            })
        ));

        let account = engine.get_or_create_account(&cust).unwrap();
        assert_eq!(account.points_balance, 7_000);
        assert_eq!(engine.list_transactions(&cust, 10, 0).unwrap().len(), 2);
    }

    #[test]
    fn redeem_rejects_non_positive_points() {
        let engine = engine();
        let cust = customer("cust_1");

        assert!(matches!(
            engine.redeem_points(&cust, 0, TransactionOptions::default()),
            Err(LoyaltyError::InvalidPoints(_))
        ));
    }

    #[test]
    fn tier_tracks_lifetime_earnings_not_balance() {
        let engine = engine();
        let cust = customer("cust_1");

        engine
            .award_points(&cust, 12_000, TransactionOptions::for_order("order_1"))
            .unwrap();
        engine
            .redeem_points(&cust, 5_000, TransactionOptions::default())
            .unwrap();

        let outcome = engine
            .award_points(&cust, 40_000, TransactionOptions::for_order("order_2"))
            .unwrap();

        assert_eq!(outcome.account.total_earned, 52_000);
        assert_eq!(outcome.account.tier, Tier::Gold);
        assert!(outcome.tier_upgraded);
        assert_eq!(outcome.account.points_balance, 47_000);
        assert_balance_invariant(&outcome.account);
    }

    #[test]
    fn adjust_applies_signed_corrections() {
        let engine = engine();
        let cust = customer("cust_1");

        let up = engine
            .adjust_points(&cust, 500, Some("goodwill credit".into()), None)
            .unwrap();
        assert_eq!(up.points_balance, 500);
        assert_eq!(up.total_earned, 500);
        assert_balance_invariant(&up);

        let down = engine
            .adjust_points(&cust, -200, Some("correction".into()), None)
            .unwrap();
        assert_eq!(down.points_balance, 300);
        assert_eq!(down.total_redeemed, 200);
        assert_balance_invariant(&down);

        assert!(matches!(
            engine.adjust_points(&cust, 0, None, None),
            Err(LoyaltyError::InvalidPoints(_))
        ));
        assert!(matches!(
            engine.adjust_points(&cust, -10_000, None, None),
            Err(LoyaltyError::InsufficientPoints { .. })
        ));
    }

    #[test]
    fn adjust_can_upgrade_tier() {
        let engine = engine();
        let cust = customer("cust_1");

        let account = engine.adjust_points(&cust, 10_000, None, None).unwrap();
        assert_eq!(account.tier, Tier::Silver);
    }

    #[test]
    fn tier_and_amount_helpers_delegate_to_policy() {
        assert_eq!(
            PointsEngine::<MemoryStore>::calculate_tier(50_000),
            Tier::Gold
        );
        assert_eq!(
            PointsEngine::<MemoryStore>::calculate_points_for_amount(1000.0, Tier::Gold),
            1500
        );
        assert_eq!(
            PointsEngine::<MemoryStore>::calculate_points_for_amount(1000.0, Tier::Bronze),
            1000
        );
    }

    #[test]
    fn tier_info_reports_progress() {
        let engine = engine();
        let cust = customer("cust_1");

        engine
            .award_points(&cust, 5_000, TransactionOptions::default())
            .unwrap();
        let info = engine.tier_info(&cust).unwrap();

        assert_eq!(info.current_tier, Tier::Bronze);
        assert_eq!(info.next_tier, Some(Tier::Silver));
        assert_eq!(info.points_to_next_tier, 5_000);
    }

    #[test]
    fn list_transactions_caps_page_size() {
        let engine = engine();
        let cust = customer("cust_1");

        engine
            .award_points(&cust, 100, TransactionOptions::default())
            .unwrap();
        let transactions = engine.list_transactions(&cust, 10_000, 0).unwrap();
        assert_eq!(transactions.len(), 1);
    }

    #[test]
    fn birthday_gate_lifecycle() {
        let engine = engine();
        let cust = customer("cust_1");

        // No birthday recorded
        assert!(!engine.is_birthday_reward_eligible(&cust).unwrap());

        // Birthday in the current month (year is irrelevant to the gate)
        let today = Utc::now().date_naive();
        let birthday = NaiveDate::from_ymd_opt(1990, today.month(), 1).unwrap();
        engine.set_birthday(&cust, birthday).unwrap();
        assert!(engine.is_birthday_reward_eligible(&cust).unwrap());

        // Marking consumes eligibility for the year
        let account = engine.mark_birthday_reward_sent(&cust).unwrap();
        assert_eq!(account.birthday_reward_sent_year, Some(today.year()));
        assert!(!engine.is_birthday_reward_eligible(&cust).unwrap());

        // Marking again is harmless
        engine.mark_birthday_reward_sent(&cust).unwrap();
        assert!(!engine.is_birthday_reward_eligible(&cust).unwrap());
    }

    #[test]
    fn balance_invariant_holds_across_mixed_operations() {
        let engine = engine();
        let cust = customer("cust_1");

        engine
            .award_points(&cust, 3_000, TransactionOptions::for_order("o1"))
            .unwrap();
        engine
            .redeem_points(&cust, 1_000, TransactionOptions::default())
            .unwrap();
        engine.adjust_points(&cust, 750, None, None).unwrap();
        engine
            .award_points(&cust, 2_500, TransactionOptions::for_order("o2"))
            .unwrap();
        let account = engine
            .redeem_points(&cust, 2_000, TransactionOptions::default())
            .unwrap();

        assert_eq!(account.total_earned, 6_250);
        assert_eq!(account.total_redeemed, 3_000);
        assert_eq!(account.points_balance, 3_250);
        assert_balance_invariant(&account);
    }
}
