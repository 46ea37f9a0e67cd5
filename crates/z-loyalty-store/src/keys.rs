//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in
//! column families.

use z_loyalty_core::{AccountId, CustomerId, TransactionId, TransactionKind};

/// Create an account key from a customer ID.
#[must_use]
pub fn account_key(customer_id: &CustomerId) -> Vec<u8> {
    customer_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create an account-transaction index key.
///
/// Format: `account_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for an account will be sorted
/// by time.
#[must_use]
pub fn account_transaction_key(account_id: &AccountId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for an account.
#[must_use]
pub fn account_transactions_prefix(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Extract the transaction ID from an account-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_index_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create an order idempotency marker key.
///
/// Format: `account_id (16 bytes) || kind (1 byte) || order_id`
///
/// At most one transaction may exist per `(account, kind, order)` triple.
#[must_use]
pub fn order_key(account_id: &AccountId, kind: TransactionKind, order_id: &str) -> Vec<u8> {
    let order_bytes = order_id.as_bytes();
    let mut key = Vec::with_capacity(17 + order_bytes.len());
    key.extend_from_slice(account_id.as_bytes());
    key.push(kind.as_byte());
    key.extend_from_slice(order_bytes);
    key
}
