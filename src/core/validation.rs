//! Verdicts and violations shared by the validators.
//!
//! Validators never fail for business-rule reasons: they return a [`Verdict`] (or a
//! [`crate::core::sequence::SequenceCheck`]) that carries `valid`, the violation and
//! the context a caller needs to render a message. Only storage failures travel as
//! [`crate::errors::Error`].

use sea_orm::prelude::DateTimeUtc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of record a meter reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A token purchase
    Purchase,
    /// A user contribution against a purchase
    Contribution,
    /// An independent meter reading
    MeterReading,
}

/// Identifies one stored record; used to skip the record being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Table the record lives in
    pub kind: RecordKind,
    /// Primary key
    pub id: i64,
}

impl RecordRef {
    /// Reference to a purchase.
    #[must_use]
    pub const fn purchase(id: i64) -> Self {
        Self {
            kind: RecordKind::Purchase,
            id,
        }
    }

    /// Reference to an independent meter reading.
    #[must_use]
    pub const fn meter_reading(id: i64) -> Self {
        Self {
            kind: RecordKind::MeterReading,
            id,
        }
    }
}

/// A meter reading outside its allowed bounds.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RangeViolation {
    /// Reading is lower than the preceding reading (or negative)
    #[error("Meter reading {reading} is below the minimum of {minimum}")]
    BelowMinimum {
        /// Candidate reading
        reading: f64,
        /// Lowest acceptable reading
        minimum: f64,
    },

    /// Reading is higher than the following reading or the available tokens allow
    #[error("Meter reading {reading} is above the maximum of {maximum}")]
    AboveMaximum {
        /// Candidate reading
        reading: f64,
        /// Highest acceptable reading
        maximum: f64,
    },

    /// Reading is NaN or infinite
    #[error("Meter reading {reading} is not a finite number")]
    NotFinite {
        /// Candidate reading
        reading: f64,
    },

    /// A contribution claims more tokens than its purchase provided
    #[error("{tokens_consumed} tokens consumed exceeds the {available} tokens purchased")]
    ExceedsPurchase {
        /// Tokens claimed by the contribution
        tokens_consumed: f64,
        /// Tokens in the purchase
        available: f64,
    },
}

/// A purchase or contribution entered out of settlement order.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceViolation {
    /// An older purchase has no contribution yet
    #[error(
        "Purchase {blocking_purchase_id} from {blocking_purchase_date} must be contributed to before a newer purchase is recorded"
    )]
    UnsettledPurchase {
        /// Oldest unsettled purchase
        blocking_purchase_id: i64,
        /// Its purchase date
        blocking_purchase_date: DateTimeUtc,
    },

    /// Contributions go to the oldest unsettled purchase first
    #[error(
        "Purchase {expected_purchase_id} from {expected_purchase_date} must be contributed to before purchase {purchase_id}"
    )]
    ContributionOutOfOrder {
        /// Purchase the contribution was aimed at
        purchase_id: i64,
        /// Purchase that has to be settled first
        expected_purchase_id: i64,
        /// Its purchase date
        expected_purchase_date: DateTimeUtc,
    },

    /// The purchase already has its contribution
    #[error("Purchase {purchase_id} already has a contribution")]
    AlreadySettled {
        /// Settled purchase
        purchase_id: i64,
    },
}

/// Any negative validation outcome.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    /// Meter reading out of monotonic bounds
    #[error(transparent)]
    Range(#[from] RangeViolation),
    /// Purchase or contribution out of settlement order
    #[error(transparent)]
    Sequence(#[from] SequenceViolation),
}

/// Outcome of a meter reading validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// Whether the reading was accepted
    pub valid: bool,
    /// Why it was rejected
    pub error: Option<Violation>,
    /// The bound the reading violated, as a hint for the caller
    pub suggested_minimum: Option<f64>,
    /// Reading of the closest preceding record
    pub last_reading: Option<f64>,
}

impl Verdict {
    /// An accepted reading.
    #[must_use]
    pub const fn accept(last_reading: Option<f64>) -> Self {
        Self {
            valid: true,
            error: None,
            suggested_minimum: None,
            last_reading,
        }
    }

    /// A rejected reading with the bound it violated.
    #[must_use]
    pub fn reject(
        violation: impl Into<Violation>,
        suggested_minimum: Option<f64>,
        last_reading: Option<f64>,
    ) -> Self {
        Self {
            valid: false,
            error: Some(violation.into()),
            suggested_minimum,
            last_reading,
        }
    }

    /// Converts the verdict into a `Result` for callers that stop on rejection.
    ///
    /// A verdict marked invalid always carries its violation.
    pub fn into_result(self) -> Result<(), Violation> {
        self.error.map_or(Ok(()), Err)
    }
}
