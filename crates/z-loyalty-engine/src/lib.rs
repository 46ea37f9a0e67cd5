//! Points engine for z-loyalty.
//!
//! This crate provides the `PointsEngine`, the single writer over loyalty
//! accounts and the append-only points ledger:
//!
//! - Idempotent point awarding keyed by order ID
//! - Overdraft-checked redemption
//! - Manual adjustments
//! - Tier derivation and progress reporting
//! - The once-per-year birthday reward gate
//!
//! # Concurrency
//!
//! Every mutating operation runs inside a per-customer critical section: the
//! engine serializes the read-check-write sequence for each account through a
//! lock table, and the store commits the account update together with the
//! ledger append as one atomic batch. Reads take no lock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod engine;

pub use engine::{AwardOutcome, PointsEngine, TransactionOptions, MAX_PAGE_SIZE};
