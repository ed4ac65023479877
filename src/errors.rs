//! Unified error type for the token tracker.
//!
//! Validation verdicts are plain values (see [`crate::core::validation`]); this enum only
//! covers failures a caller cannot render as a verdict, plus [`Error::Rejected`] which
//! wraps a negative verdict when a write operation refuses to proceed.

use crate::core::validation::Violation;
use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// Any error reported by the database layer
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// An input struct failed boundary validation
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Field-level validation messages
        message: String,
    },

    /// A money or token amount was zero, negative or not finite
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// A meter reading was negative or not finite
    #[error("Invalid meter reading: {reading}")]
    InvalidReading {
        /// The rejected reading
        reading: f64,
    },

    /// No purchase with the given id
    #[error("Purchase not found: {id}")]
    PurchaseNotFound {
        /// Purchase id that was looked up
        id: i64,
    },

    /// No contribution with the given id
    #[error("Contribution not found: {id}")]
    ContributionNotFound {
        /// Contribution id that was looked up
        id: i64,
    },

    /// No meter reading with the given id
    #[error("Meter reading not found: {id}")]
    MeterReadingNotFound {
        /// Meter reading id that was looked up
        id: i64,
    },

    /// The acting user may not perform this operation
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Why the operation is not allowed
        message: String,
    },

    /// The purchase already has a contribution and only an admin may change it
    #[error("Purchase {id} is settled and can only be changed by an admin")]
    PurchaseLocked {
        /// Id of the settled purchase
        id: i64,
    },

    /// A validator returned a negative verdict
    #[error("Rejected: {0}")]
    Rejected(Violation),
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidInput {
            message: errors.to_string(),
        }
    }
}

impl From<Violation> for Error {
    fn from(violation: Violation) -> Self {
        Self::Rejected(violation)
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
