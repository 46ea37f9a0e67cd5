//! Error types for z-loyalty.

use crate::ids::IdError;

/// Result type for z-loyalty operations.
pub type Result<T> = std::result::Result<T, LoyaltyError>;

/// Errors that can occur in z-loyalty operations.
#[derive(Debug, thiserror::Error)]
pub enum LoyaltyError {
    /// Redemption requested exceeds the current balance. Recoverable; no
    /// state changes occur.
    #[error("insufficient points: balance={balance}, requested={requested}")]
    InsufficientPoints {
        /// Current spendable balance.
        balance: i64,
        /// Points requested for redemption.
        requested: i64,
    },

    /// Account not found. Defensive only: entry points get-or-create, so
    /// this signals a caller bypassing the normal path.
    #[error("account not found: {customer_id}")]
    AccountNotFound {
        /// The customer ID that was not found.
        customer_id: String,
    },

    /// Invalid points value (zero or negative where a positive delta is
    /// required), rejected before reaching the ledger.
    #[error("invalid points value: {0}")]
    InvalidPoints(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
