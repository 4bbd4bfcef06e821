//! Core business logic - framework-agnostic student, billing and reporting operations.
//!
//! Write operations publish a [`events::ChangeEvent`] after they commit; read-side
//! projections (solvency, reports, dashboard) always re-derive from the store.

pub mod charge;
pub mod dashboard;
pub mod enrollment;
pub mod events;
pub mod payment;
pub mod report;
pub mod roster;
pub mod settings;
pub mod solvency;
pub mod student;

use crate::errors::{Error, Result};

/// Rounds a monetary value to cents.
#[must_use]
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Accepts only finite amounts that are still positive once rounded to cents.
pub(crate) fn validate_positive_amount(amount: f64) -> Result<f64> {
    if !amount.is_finite() {
        return Err(Error::InvalidAmount { amount });
    }
    let rounded = round_money(amount);
    if rounded <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(rounded)
}

/// Accepts only calendar months 1 through 12.
pub(crate) fn validate_month(month: u32) -> Result<i32> {
    match month {
        1..=12 => Ok(i32::try_from(month).unwrap_or(1)),
        _ => Err(Error::InvalidInput {
            message: format!("month must be between 1 and 12, got {month}"),
        }),
    }
}
