//! Unified error type for the ledger.
//!
//! Validation errors are raised before any write reaches the store, so a failed
//! operation never leaves partial state behind.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Every failure the ledger can report.
#[derive(Debug, Error)]
pub enum Error {
    /// A payment was submitted without a student.
    #[error("No student selected")]
    NoStudentSelected,

    /// The student already has an enrollment for the academic year.
    #[error("Student {student_id} is already enrolled for {academic_year}")]
    DuplicateEnrollment {
        /// Student that was being enrolled
        student_id: i64,
        /// Academic year of the existing enrollment
        academic_year: i32,
    },

    /// The tendered amount is larger than what is still owed.
    #[error("Payment of {tendered:.2} exceeds the remaining balance of {remaining:.2}")]
    ExceedsBalance {
        /// Amount offered by the payer
        tendered: f64,
        /// Amount still owed
        remaining: f64,
    },

    /// Nothing is owed anymore.
    #[error("Balance is already settled")]
    AlreadySettled,

    /// The backing store could not complete the request.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] DbErr),

    /// A monetary amount was zero, negative or not a finite number.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// Input failed a boundary check.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Human-readable reason
        message: String,
    },

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of row that was looked up
        entity: &'static str,
        /// Primary key that was looked up
        id: i64,
    },

    /// Payment currency differs from the currency of the balance it settles.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        /// Currency of the charge or enrollment
        expected: String,
        /// Currency tendered
        actual: String,
    },

    /// The row changed between read and write.
    #[error("{entity} {id} was modified concurrently, reload and retry")]
    ConcurrentModification {
        /// Kind of row that changed
        entity: &'static str,
        /// Primary key of the row
        id: i64,
    },

    /// The same payment is already being processed.
    #[error("A payment for this balance is already in progress")]
    PaymentInFlight,

    /// Configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable reason
        message: String,
    },

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable lookup failure.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    /// Returns true when the store rejected a write because of a unique index.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(err)
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
