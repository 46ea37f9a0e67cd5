//! Storage layer for z-loyalty.
//!
//! This crate provides persistent storage for loyalty accounts and the
//! append-only points ledger, using `RocksDB` with column families for
//! efficient indexing, plus a `DashMap`-backed in-memory store for tests.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `accounts`: Primary account records, keyed by `customer_id`
//! - `transactions`: Points transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_account`: Index for listing transactions by account
//! - `earn_orders`: Order idempotency markers, keyed by
//!   `account_id || kind || order_id`
//!
//! # Example
//!
//! ```no_run
//! use z_loyalty_store::{AccountStore, RocksStore};
//! use z_loyalty_core::CustomerId;
//!
//! let store = RocksStore::open("/tmp/z-loyalty-db").unwrap();
//!
//! let customer_id = CustomerId::new("cust_1").unwrap();
//! let account = store.get_or_create_account(&customer_id).unwrap();
//! assert_eq!(account.points_balance, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;

use z_loyalty_core::{
    Account, AccountId, CustomerId, PointsTransaction, TransactionId, TransactionKind,
};

/// Repository of loyalty accounts, keyed by customer.
pub trait AccountStore: Send + Sync {
    /// Get an account by customer ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, customer_id: &CustomerId) -> Result<Option<Account>>;

    /// Return the existing account for a customer or atomically create one
    /// with zero balances and the base tier.
    ///
    /// Concurrent first-time calls for the same customer must not create
    /// duplicate accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_account(&self, customer_id: &CustomerId) -> Result<Account>;

    /// Insert or update an account record.
    ///
    /// Balance, lifetime totals, and tier are only ever set through the
    /// points engine; other callers use this for profile fields only.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;
}

/// Append-only ledger of points transactions.
pub trait TransactionLedger: Send + Sync {
    /// Idempotency probe: check whether a transaction of `kind` already
    /// exists for this `(account, order)` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_order_transaction(
        &self,
        account_id: &AccountId,
        order_id: &str,
        kind: TransactionKind,
    ) -> Result<bool>;

    /// Append a new immutable transaction record.
    ///
    /// This also maintains the account index and, for order-keyed
    /// transactions, the order marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn append_transaction(&self, transaction: &PointsTransaction) -> Result<()>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<PointsTransaction>>;

    /// List transactions for an account, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_account(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointsTransaction>>;
}

/// The combined storage trait the points engine is injected with.
///
/// Adds the compound commit that makes partial application (transaction
/// written but account not updated, or vice versa) unrepresentable.
pub trait Store: AccountStore + TransactionLedger {
    /// Write the updated account and a new transaction as a single atomic
    /// unit, together with the account index entry and, for an order-keyed
    /// transaction, its order marker.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateOrder` if the order marker already exists;
    ///   nothing is written.
    /// - `StoreError::Database`/`StoreError::Serialization` if the
    ///   underlying write fails.
    fn commit(&self, account: &Account, transaction: &PointsTransaction) -> Result<()>;
}
