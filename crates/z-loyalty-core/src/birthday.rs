//! Birthday reward eligibility.
//!
//! A customer is eligible for the birthday reward at most once per calendar
//! year, during the month of their recorded birthday.

use chrono::{Datelike, NaiveDate};

use crate::Account;

/// Check whether an account is eligible for a birthday reward on `today`.
///
/// Returns `false` when no birthday is recorded, when `today` falls outside
/// the birthday month, or when a reward was already granted this calendar
/// year.
#[must_use]
pub fn eligible_on(account: &Account, today: NaiveDate) -> bool {
    let Some(birthday) = account.birthday else {
        return false;
    };
    if birthday.month() != today.month() {
        return false;
    }
    account.birthday_reward_sent_year != Some(today.year())
}
