//! Tier policy for z-loyalty.
//!
//! A pure mapping from cumulative lifetime earned points to a discount tier.
//! Tiers are keyed to `total_earned`, which is monotone, so a tier never
//! regresses — redemptions do not affect it.

use serde::{Deserialize, Serialize};

use crate::Account;

// ============================================================================
// Constants
// ============================================================================

/// Lifetime earned points required for the silver tier.
pub const SILVER_THRESHOLD_POINTS: i64 = 10_000;

/// Lifetime earned points required for the gold tier.
pub const GOLD_THRESHOLD_POINTS: i64 = 50_000;

/// Silver tier discount percentage on purchases.
pub const SILVER_DISCOUNT_PERCENT: u8 = 5;

/// Gold tier discount percentage on purchases.
pub const GOLD_DISCOUNT_PERCENT: u8 = 10;

/// Earn multiplier applied to purchase amounts for gold customers.
pub const GOLD_EARN_MULTIPLIER: f64 = 1.5;

/// Discount tier derived from lifetime earned points.
///
/// Ordering follows tier rank, so `Tier::Gold > Tier::Bronze`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Base tier: every account starts here.
    Bronze,

    /// Silver tier: 10,000+ lifetime points, 5% discount.
    Silver,

    /// Gold tier: 50,000+ lifetime points, 10% discount, 1.5x earn rate.
    Gold,
}

impl Tier {
    /// Map lifetime earned points to a tier.
    ///
    /// The tier is the highest threshold less than or equal to
    /// `total_earned`; boundaries are inclusive (10,000 yields silver).
    #[must_use]
    pub const fn for_total_earned(total_earned: i64) -> Self {
        if total_earned >= GOLD_THRESHOLD_POINTS {
            Self::Gold
        } else if total_earned >= SILVER_THRESHOLD_POINTS {
            Self::Silver
        } else {
            Self::Bronze
        }
    }

    /// Lifetime earned points required to reach this tier.
    #[must_use]
    pub const fn threshold(&self) -> i64 {
        match self {
            Self::Bronze => 0,
            Self::Silver => SILVER_THRESHOLD_POINTS,
            Self::Gold => GOLD_THRESHOLD_POINTS,
        }
    }

    /// Discount percentage on purchases for this tier.
    #[must_use]
    pub const fn discount_percent(&self) -> u8 {
        match self {
            Self::Bronze => 0,
            Self::Silver => SILVER_DISCOUNT_PERCENT,
            Self::Gold => GOLD_DISCOUNT_PERCENT,
        }
    }

    /// The tier immediately above this one, or `None` at the top.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Bronze => Some(Self::Silver),
            Self::Silver => Some(Self::Gold),
            Self::Gold => None,
        }
    }

    /// Display benefits associated with this tier. Opaque to the core.
    #[must_use]
    pub const fn benefits(&self) -> &'static [&'static str] {
        match self {
            Self::Bronze => &["points on every purchase"],
            Self::Silver => &["5% member discount", "early sale access"],
            Self::Gold => &[
                "10% member discount",
                "early sale access",
                "1.5x points on every purchase",
                "free shipping",
            ],
        }
    }

    /// Get the tier name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }
}

/// Progress of an account toward the next tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierInfo {
    /// The account's current tier.
    pub current_tier: Tier,

    /// The tier immediately above the current one, absent at the top.
    pub next_tier: Option<Tier>,

    /// Points still needed to reach `next_tier`. Zero at the top tier.
    pub points_to_next_tier: i64,

    /// Percentage of the way to `next_tier`, clamped to 0–100. Always 100 at
    /// the top tier.
    pub progress_percent: f64,
}

impl TierInfo {
    /// Compute tier progress for an account.
    #[must_use]
    pub fn for_account(account: &Account) -> Self {
        Self::for_total_earned(account.total_earned)
    }

    /// Compute tier progress from lifetime earned points.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn for_total_earned(total_earned: i64) -> Self {
        let current_tier = Tier::for_total_earned(total_earned);
        match current_tier.next() {
            Some(next) => {
                let next_threshold = next.threshold();
                Self {
                    current_tier,
                    next_tier: Some(next),
                    points_to_next_tier: (next_threshold - total_earned).max(0),
                    progress_percent: (total_earned as f64 / next_threshold as f64 * 100.0)
                        .clamp(0.0, 100.0),
                }
            }
            None => Self {
                current_tier,
                next_tier: None,
                points_to_next_tier: 0,
                progress_percent: 100.0,
            },
        }
    }
}

/// Points earned for a purchase amount at a given tier.
///
/// The baseline is one point per whole currency unit (`floor(amount)`); gold
/// applies the earn multiplier and floors again. Silver earns at the baseline
/// rate. The result is never negative.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn points_for_amount(amount: f64, tier: Tier) -> i64 {
    let base = amount.floor();
    let earned = match tier {
        Tier::Gold => (base * GOLD_EARN_MULTIPLIER).floor(),
        Tier::Bronze | Tier::Silver => base,
    };
    (earned as i64).max(0)
}
