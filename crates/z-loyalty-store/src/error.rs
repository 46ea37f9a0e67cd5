//! Error types for z-loyalty storage.

use z_loyalty_core::LoyaltyError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A transaction already exists for this `(account, kind, order)` triple.
    #[error("duplicate order: {order_id}")]
    DuplicateOrder {
        /// The order ID that was duplicated.
        order_id: String,
    },
}

impl From<StoreError> for LoyaltyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(msg) => Self::Storage(msg),
            StoreError::Serialization(msg) => Self::Serialization(msg),
            StoreError::DuplicateOrder { order_id } => {
                Self::Storage(format!("duplicate order marker: {order_id}"))
            }
        }
    }
}
