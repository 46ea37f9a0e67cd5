//! In-memory storage implementation.
//!
//! A `DashMap`-backed store with the same semantics as the `RocksDB`
//! implementation, for tests and development environments.

use dashmap::{DashMap, DashSet};

use z_loyalty_core::{
    Account, AccountId, CustomerId, PointsTransaction, TransactionId, TransactionKind,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::{AccountStore, Store, TransactionLedger};

/// In-memory storage implementation.
///
/// Reads return clones and never hold a lock across calls. Order markers use
/// the same key encoding as the `RocksDB` store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<String, Account>,
    transactions: DashMap<TransactionId, PointsTransaction>,
    index: DashMap<AccountId, Vec<TransactionId>>,
    order_markers: DashSet<Vec<u8>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions in the ledger (across all accounts).
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Stage a transaction into the ledger maps. The caller has already
    /// claimed the order marker, if any.
    fn insert_transaction(&self, transaction: &PointsTransaction) {
        self.index
            .entry(transaction.account_id)
            .or_default()
            .push(transaction.id);
        self.transactions.insert(transaction.id, transaction.clone());
    }

    /// Claim the order marker for a transaction, failing on duplicates.
    fn claim_order_marker(&self, transaction: &PointsTransaction) -> Result<()> {
        if let Some(order_id) = transaction.order_id.as_deref() {
            let key = keys::order_key(&transaction.account_id, transaction.kind, order_id);
            if !self.order_markers.insert(key) {
                return Err(StoreError::DuplicateOrder {
                    order_id: order_id.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl AccountStore for MemoryStore {
    fn get_account(&self, customer_id: &CustomerId) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .get(customer_id.as_str())
            .map(|entry| entry.value().clone()))
    }

    fn get_or_create_account(&self, customer_id: &CustomerId) -> Result<Account> {
        // The entry API holds the shard lock, so concurrent first-time calls
        // cannot both insert.
        let entry = self
            .accounts
            .entry(customer_id.as_str().to_string())
            .or_insert_with(|| Account::new(customer_id.clone()));
        Ok(entry.value().clone())
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        self.accounts
            .insert(account.customer_id.as_str().to_string(), account.clone());
        Ok(())
    }
}

impl TransactionLedger for MemoryStore {
    fn has_order_transaction(
        &self,
        account_id: &AccountId,
        order_id: &str,
        kind: TransactionKind,
    ) -> Result<bool> {
        let key = keys::order_key(account_id, kind, order_id);
        Ok(self.order_markers.contains(&key))
    }

    fn append_transaction(&self, transaction: &PointsTransaction) -> Result<()> {
        self.claim_order_marker(transaction)?;
        self.insert_transaction(transaction);
        Ok(())
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<PointsTransaction>> {
        Ok(self
            .transactions
            .get(transaction_id)
            .map(|entry| entry.value().clone()))
    }

    fn list_transactions_by_account(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointsTransaction>> {
        let mut ids = self
            .index
            .get(account_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        // ULIDs sort chronologically; newest first.
        ids.sort_unstable_by(|a, b| b.to_bytes().cmp(&a.to_bytes()));

        Ok(ids
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| self.transactions.get(&id).map(|entry| entry.value().clone()))
            .collect())
    }
}

impl Store for MemoryStore {
    fn commit(&self, account: &Account, transaction: &PointsTransaction) -> Result<()> {
        self.claim_order_marker(transaction)?;
        self.insert_transaction(transaction);
        self.accounts
            .insert(account.customer_id.as_str().to_string(), account.clone());
        Ok(())
    }
}
