//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the storage
//! traits.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use z_loyalty_core::{
    Account, AccountId, CustomerId, PointsTransaction, TransactionId, TransactionKind,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AccountStore, Store, TransactionLedger};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes first-time account creation so concurrent get-or-create
    /// calls for the same customer cannot both insert.
    create_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            create_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Build the order marker key for a transaction, if it carries one.
    fn order_marker(transaction: &PointsTransaction) -> Option<(String, Vec<u8>)> {
        transaction.order_id.as_deref().map(|order_id| {
            (
                order_id.to_string(),
                keys::order_key(&transaction.account_id, transaction.kind, order_id),
            )
        })
    }

    /// Fail with `DuplicateOrder` if the marker key is already present.
    fn check_order_marker(&self, order_id: &str, marker: &[u8]) -> Result<()> {
        let cf_orders = self.cf(cf::EARN_ORDERS)?;
        let exists = self
            .db
            .get_cf(&cf_orders, marker)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();

        if exists {
            return Err(StoreError::DuplicateOrder {
                order_id: order_id.to_string(),
            });
        }
        Ok(())
    }

    /// Stage a transaction, its account index entry, and its order marker
    /// into a write batch.
    fn stage_transaction(
        &self,
        batch: &mut WriteBatch,
        transaction: &PointsTransaction,
        marker: Option<&[u8]>,
    ) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_index = self.cf(cf::TRANSACTIONS_BY_ACCOUNT)?;

        let tx_key = keys::transaction_key(&transaction.id);
        let index_key = keys::account_transaction_key(&transaction.account_id, &transaction.id);
        let value = Self::serialize(transaction)?;

        batch.put_cf(&cf_tx, &tx_key, &value);
        batch.put_cf(&cf_index, &index_key, []); // Index entry (empty value)

        if let Some(marker) = marker {
            let cf_orders = self.cf(cf::EARN_ORDERS)?;
            batch.put_cf(&cf_orders, marker, []); // Marker entry (empty value)
        }

        Ok(())
    }
}

impl AccountStore for RocksStore {
    fn get_account(&self, customer_id: &CustomerId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(customer_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn get_or_create_account(&self, customer_id: &CustomerId) -> Result<Account> {
        if let Some(account) = self.get_account(customer_id)? {
            return Ok(account);
        }

        // Double-checked under the creation lock: a concurrent caller may
        // have inserted between the probe above and acquiring the lock.
        let _guard = self
            .create_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(account) = self.get_account(customer_id)? {
            return Ok(account);
        }

        let account = Account::new(customer_id.clone());
        self.put_account(&account)?;
        Ok(account)
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.customer_id);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}

impl TransactionLedger for RocksStore {
    fn has_order_transaction(
        &self,
        account_id: &AccountId,
        order_id: &str,
        kind: TransactionKind,
    ) -> Result<bool> {
        let cf = self.cf(cf::EARN_ORDERS)?;
        let key = keys::order_key(account_id, kind, order_id);

        let exists = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();

        Ok(exists)
    }

    fn append_transaction(&self, transaction: &PointsTransaction) -> Result<()> {
        let marker = Self::order_marker(transaction);
        if let Some((order_id, key)) = &marker {
            self.check_order_marker(order_id, key)?;
        }

        let mut batch = WriteBatch::default();
        self.stage_transaction(
            &mut batch,
            transaction,
            marker.as_ref().map(|(_, key)| key.as_slice()),
        )?;

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<PointsTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        let key = keys::transaction_key(transaction_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions_by_account(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointsTransaction>> {
        let cf_index = self.cf(cf::TRANSACTIONS_BY_ACCOUNT)?;
        let prefix = keys::account_transactions_prefix(account_id);

        let iter = self.db.iterator_cf(
            &cf_index,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // Collect all matching keys first (ULIDs are naturally time-ordered,
        // so the prefix range is already oldest-first).
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            all_keys.push(key.to_vec());
        }

        // Reverse to get newest first
        all_keys.reverse();

        let mut transactions = Vec::new();
        let mut skipped = 0;

        for key in all_keys {
            if skipped < offset {
                skipped += 1;
                continue;
            }

            if transactions.len() >= limit {
                break;
            }

            let tx_id = keys::extract_transaction_id_from_index_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }
}

impl Store for RocksStore {
    fn commit(&self, account: &Account, transaction: &PointsTransaction) -> Result<()> {
        let marker = Self::order_marker(transaction);
        if let Some((order_id, key)) = &marker {
            self.check_order_marker(order_id, key)?;
        }

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let account_key = keys::account_key(&account.customer_id);
        let account_value = Self::serialize(account)?;

        // Write atomically
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, &account_key, &account_value);
        self.stage_transaction(
            &mut batch,
            transaction,
            marker.as_ref().map(|(_, key)| key.as_slice()),
        )?;

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn customer(id: &str) -> CustomerId {
        CustomerId::new(id).unwrap()
    }

    #[test]
    fn account_get_or_create_and_update() {
        let (store, _dir) = create_test_store();
        let customer_id = customer("cust_1");

        // Missing until first reference
        assert!(store.get_account(&customer_id).unwrap().is_none());

        let account = store.get_or_create_account(&customer_id).unwrap();
        assert_eq!(account.points_balance, 0);

        // Second call returns the same account, not a new one
        let again = store.get_or_create_account(&customer_id).unwrap();
        assert_eq!(again.id, account.id);

        // Update round-trip
        let mut updated = account.clone();
        updated.points_balance = 500;
        updated.total_earned = 500;
        store.put_account(&updated).unwrap();

        let retrieved = store.get_account(&customer_id).unwrap().unwrap();
        assert_eq!(retrieved.points_balance, 500);
        assert_eq!(retrieved.id, account.id);
    }

    #[test]
    fn transaction_append_and_list() {
        let (store, _dir) = create_test_store();
        let customer_id = customer("cust_1");
        let account = store.get_or_create_account(&customer_id).unwrap();

        // ULIDs are generated at creation time; a short delay keeps the
        // ordering distinct.
        let tx1 = PointsTransaction::earn(
            account.id,
            500,
            Some("first".into()),
            None,
            serde_json::Value::Null,
        );
        store.append_transaction(&tx1).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));

        let tx2 = PointsTransaction::earn(
            account.id,
            700,
            Some("second".into()),
            None,
            serde_json::Value::Null,
        );
        store.append_transaction(&tx2).unwrap();

        let retrieved = store.get_transaction(&tx1.id).unwrap().unwrap();
        assert_eq!(retrieved.points, 500);

        // Newest first
        let transactions = store
            .list_transactions_by_account(&account.id, 10, 0)
            .unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].reason.as_deref(), Some("second"));
        assert_eq!(transactions[1].reason.as_deref(), Some("first"));

        // Pagination
        let page1 = store
            .list_transactions_by_account(&account.id, 1, 0)
            .unwrap();
        let page2 = store
            .list_transactions_by_account(&account.id, 1, 1)
            .unwrap();
        assert_eq!(page1.len(), 1);
        assert_eq!(page2.len(), 1);
        assert_eq!(page1[0].reason.as_deref(), Some("second"));
        assert_eq!(page2[0].reason.as_deref(), Some("first"));
    }

    #[test]
    fn commit_writes_account_and_transaction_atomically() {
        let (store, _dir) = create_test_store();
        let customer_id = customer("cust_1");
        let mut account = store.get_or_create_account(&customer_id).unwrap();

        let tx = PointsTransaction::earn(
            account.id,
            1200,
            None,
            Some("order_1".into()),
            serde_json::Value::Null,
        );
        account.points_balance += 1200;
        account.total_earned += 1200;

        store.commit(&account, &tx).unwrap();

        let stored = store.get_account(&customer_id).unwrap().unwrap();
        assert_eq!(stored.points_balance, 1200);

        let listed = store
            .list_transactions_by_account(&account.id, 10, 0)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].order_id.as_deref(), Some("order_1"));

        assert!(store
            .has_order_transaction(&account.id, "order_1", TransactionKind::Earn)
            .unwrap());
    }

    #[test]
    fn commit_rejects_duplicate_order() {
        let (store, _dir) = create_test_store();
        let customer_id = customer("cust_1");
        let mut account = store.get_or_create_account(&customer_id).unwrap();

        let tx = PointsTransaction::earn(
            account.id,
            1000,
            None,
            Some("order_1".into()),
            serde_json::Value::Null,
        );
        account.points_balance += 1000;
        account.total_earned += 1000;
        store.commit(&account, &tx).unwrap();

        // Second commit with the same order marker must fail without writing
        let dup = PointsTransaction::earn(
            account.id,
            1000,
            None,
            Some("order_1".into()),
            serde_json::Value::Null,
        );
        let mut double = account.clone();
        double.points_balance += 1000;
        double.total_earned += 1000;

        let result = store.commit(&double, &dup);
        assert!(matches!(result, Err(StoreError::DuplicateOrder { .. })));

        let stored = store.get_account(&customer_id).unwrap().unwrap();
        assert_eq!(stored.points_balance, 1000);
        assert_eq!(
            store
                .list_transactions_by_account(&account.id, 10, 0)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn reopen_preserves_state() {
        let dir = TempDir::new().unwrap();
        let customer_id = customer("cust_1");
        let account_id;

        {
            let store = RocksStore::open(dir.path()).unwrap();
            let mut account = store.get_or_create_account(&customer_id).unwrap();
            account_id = account.id;

            let tx = PointsTransaction::earn(
                account.id,
                800,
                None,
                Some("order_9".into()),
                serde_json::Value::Null,
            );
            account.points_balance += 800;
            account.total_earned += 800;
            store.commit(&account, &tx).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        let account = store.get_account(&customer_id).unwrap().unwrap();
        assert_eq!(account.points_balance, 800);
        assert_eq!(account.id, account_id);

        assert!(store
            .has_order_transaction(&account_id, "order_9", TransactionKind::Earn)
            .unwrap());
        assert_eq!(
            store
                .list_transactions_by_account(&account_id, 10, 0)
                .unwrap()
                .len(),
            1
        );
    }
}
