//! Core types and utilities for z-loyalty.
//!
//! This crate provides the foundational types used throughout the z-loyalty
//! engine:
//!
//! - **Identifiers**: `AccountId`, `TransactionId`, `CustomerId`
//! - **Accounts**: `Account` (balance, lifetime totals, tier, birthday state)
//! - **Ledger**: `PointsTransaction`, `TransactionKind`
//! - **Tier policy**: `Tier`, `TierInfo`, `points_for_amount`
//! - **Birthday gate**: `birthday::eligible_on`
//!
//! # Points Accounting
//!
//! Balances are plain integer points stored as `i64`. The running balance is
//! derived from the append-only ledger: for every account,
//! `points_balance == total_earned - total_redeemed` after every operation,
//! and the tier is a pure function of the monotone `total_earned`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod birthday;
pub mod error;
pub mod ids;
pub mod tier;
pub mod transaction;

pub use account::Account;
pub use error::{LoyaltyError, Result};
pub use ids::{AccountId, CustomerId, IdError, TransactionId, MAX_CUSTOMER_ID_LEN};
pub use tier::{
    points_for_amount, Tier, TierInfo, GOLD_DISCOUNT_PERCENT, GOLD_EARN_MULTIPLIER,
    GOLD_THRESHOLD_POINTS, SILVER_DISCOUNT_PERCENT, SILVER_THRESHOLD_POINTS,
};
pub use transaction::{PointsTransaction, TransactionKind};
