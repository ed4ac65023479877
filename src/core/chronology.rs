//! Chronology validation for meter readings.
//!
//! Meter readings are cumulative, so every reading must sit between the reading of the
//! record before it and the reading of the record after it. When the previous record is
//! a purchase, the meter cannot have advanced by more than the tokens that purchase
//! provided; a new most-recent purchase may additionally count its own tokens.
//!
//! [`evaluate`] is the pure rule; [`validate_reading`] fetches the neighbouring records
//! through a [`ChronologySource`] and applies it.

use crate::{
    core::{
        records::{ChronologyRecord, ChronologySource},
        validation::{RangeViolation, RecordKind, RecordRef, Verdict},
    },
    errors::Result,
};
use sea_orm::prelude::DateTimeUtc;
use serde::Serialize;
use tracing::{debug, warn};

/// A meter reading about to be stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingCandidate {
    /// Cumulative meter value
    pub reading: f64,
    /// Date the reading belongs to
    pub date: DateTimeUtc,
    /// What kind of record carries the reading
    pub kind: RecordKind,
    /// Tokens bought with this record (purchases only, otherwise `0.0`)
    pub total_tokens: f64,
    /// Stored record to ignore, used when editing
    pub exclude: Option<RecordRef>,
}

impl ReadingCandidate {
    /// Reading for a purchase of `total_tokens`.
    #[must_use]
    pub const fn purchase(reading: f64, date: DateTimeUtc, total_tokens: f64) -> Self {
        Self {
            reading,
            date,
            kind: RecordKind::Purchase,
            total_tokens,
            exclude: None,
        }
    }

    /// Reading attached to a contribution.
    #[must_use]
    pub const fn contribution(reading: f64, date: DateTimeUtc) -> Self {
        Self {
            reading,
            date,
            kind: RecordKind::Contribution,
            total_tokens: 0.0,
            exclude: None,
        }
    }

    /// Independent meter reading.
    #[must_use]
    pub const fn meter_reading(reading: f64, date: DateTimeUtc) -> Self {
        Self {
            reading,
            date,
            kind: RecordKind::MeterReading,
            total_tokens: 0.0,
            exclude: None,
        }
    }

    /// A stored record re-checked in place, ignoring itself.
    #[must_use]
    pub fn stored(record: &ChronologyRecord) -> Self {
        Self {
            reading: record.reading,
            date: record.date,
            kind: record.record.kind,
            total_tokens: record.total_tokens.unwrap_or(0.0),
            exclude: Some(record.record),
        }
    }

    /// Ignore a stored record while validating (the record being edited).
    #[must_use]
    pub const fn excluding(mut self, record: RecordRef) -> Self {
        self.exclude = Some(record);
        self
    }
}

/// The stored records around a candidate's date.
///
/// `prior` and `next` may be purchases or independent meter readings. The purchase
/// slots are filled separately because a purchase's tokens cap the meter even when
/// meter readings were taken in between.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Neighbours {
    /// Latest record of any kind before the candidate
    pub prior: Option<ChronologyRecord>,
    /// Earliest record of any kind after the candidate
    pub next: Option<ChronologyRecord>,
    /// Latest purchase before the candidate
    pub previous_purchase: Option<ChronologyRecord>,
    /// Earliest purchase after the candidate
    pub next_purchase: Option<ChronologyRecord>,
    /// `next_purchase` is the most recent purchase overall
    pub next_purchase_is_latest: bool,
}

impl Neighbours {
    /// Neighbours made of two adjacent records. Purchases among them also fill the
    /// purchase slots; the following purchase is not treated as the latest one.
    #[must_use]
    pub fn between(prior: Option<ChronologyRecord>, next: Option<ChronologyRecord>) -> Self {
        let is_purchase = |record: &&ChronologyRecord| record.record.kind == RecordKind::Purchase;
        Self {
            previous_purchase: prior.as_ref().filter(is_purchase).cloned(),
            next_purchase: next.as_ref().filter(is_purchase).cloned(),
            next_purchase_is_latest: false,
            prior,
            next,
        }
    }
}

/// Inclusive range a candidate reading must fall in. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ReadingBounds {
    /// Lowest acceptable reading
    pub minimum: Option<f64>,
    /// Highest acceptable reading
    pub maximum: Option<f64>,
}

impl ReadingBounds {
    /// Whether `reading` lies within the bounds.
    #[must_use]
    pub fn contains(&self, reading: f64) -> bool {
        self.minimum.is_none_or(|min| reading >= min)
            && self.maximum.is_none_or(|max| reading <= max)
    }
}

fn combine(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

/// Computes the bounds for `candidate` given its neighbours.
///
/// * minimum: the prior reading, and for a purchase also the lowest reading from which
///   its own tokens still reach the next purchase's reading
/// * maximum: the next reading, and the previous purchase's reading plus its tokens
///   (plus the candidate's tokens when the candidate becomes the latest purchase)
#[must_use]
pub fn compute_bounds(candidate: &ReadingCandidate, neighbours: &Neighbours) -> ReadingBounds {
    let is_purchase = candidate.kind == RecordKind::Purchase;

    let successor_floor = neighbours
        .next_purchase
        .as_ref()
        .filter(|_| is_purchase)
        .map(|next| {
            let own_tokens = if neighbours.next_purchase_is_latest {
                next.total_tokens.unwrap_or(0.0)
            } else {
                0.0
            };
            next.reading - candidate.total_tokens - own_tokens
        });
    let minimum = combine(
        neighbours.prior.as_ref().map(|record| record.reading),
        successor_floor,
        f64::max,
    );

    let capacity = neighbours.previous_purchase.as_ref().and_then(|previous| {
        previous.total_tokens.map(|tokens| {
            let relax = if is_purchase && neighbours.next_purchase.is_none() {
                candidate.total_tokens
            } else {
                0.0
            };
            previous.reading + tokens + relax
        })
    });
    let maximum = combine(
        neighbours.next.as_ref().map(|record| record.reading),
        capacity,
        f64::min,
    );

    ReadingBounds { minimum, maximum }
}

/// Checks `candidate` against its neighbouring records.
#[must_use]
pub fn evaluate(candidate: &ReadingCandidate, neighbours: &Neighbours) -> Verdict {
    let reading = candidate.reading;
    let last_reading = neighbours.prior.as_ref().map(|record| record.reading);

    if !reading.is_finite() {
        return Verdict::reject(RangeViolation::NotFinite { reading }, None, last_reading);
    }
    if reading < 0.0 {
        return Verdict::reject(
            RangeViolation::BelowMinimum {
                reading,
                minimum: 0.0,
            },
            Some(0.0),
            last_reading,
        );
    }

    let bounds = compute_bounds(candidate, neighbours);
    if let Some(minimum) = bounds.minimum.filter(|min| reading < *min) {
        return Verdict::reject(
            RangeViolation::BelowMinimum { reading, minimum },
            Some(minimum),
            last_reading,
        );
    }
    if let Some(maximum) = bounds.maximum.filter(|max| reading > *max) {
        return Verdict::reject(
            RangeViolation::AboveMaximum { reading, maximum },
            Some(maximum),
            last_reading,
        );
    }

    Verdict::accept(last_reading)
}

/// Fetches the records around `date`, ignoring `exclude`.
pub async fn load_neighbours<S>(
    source: &S,
    date: DateTimeUtc,
    exclude: Option<RecordRef>,
) -> Result<Neighbours>
where
    S: ChronologySource,
{
    let prior = source.nearest_before(date, exclude).await?;
    let next = source.nearest_after(date, exclude).await?;
    let previous_purchase = source.previous_purchase(date, exclude).await?;
    let next_purchase = source.next_purchase(date, exclude).await?;
    let next_purchase_is_latest = match &next_purchase {
        Some(purchase) => source
            .next_purchase(purchase.date, exclude)
            .await?
            .is_none(),
        None => false,
    };

    Ok(Neighbours {
        prior,
        next,
        previous_purchase,
        next_purchase,
        next_purchase_is_latest,
    })
}

/// Validates a candidate reading against the stored records around its date.
///
/// # Arguments
///
/// * `source` - Where the neighbouring purchases and meter readings are read from
/// * `candidate` - The reading about to be stored, with the record to ignore when editing
///
/// # Returns
///
/// A [`Verdict`]; a reading outside its bounds is an invalid verdict, not an error.
///
/// # Errors
///
/// Returns an error only if the record lookup fails.
pub async fn validate_reading<S>(source: &S, candidate: &ReadingCandidate) -> Result<Verdict>
where
    S: ChronologySource,
{
    let neighbours = load_neighbours(source, candidate.date, candidate.exclude).await?;

    let verdict = evaluate(candidate, &neighbours);
    if let Some(violation) = &verdict.error {
        warn!(
            "Rejected {:?} reading {} on {}: {violation}",
            candidate.kind, candidate.reading, candidate.date
        );
    } else {
        debug!(
            "Accepted {:?} reading {} on {}",
            candidate.kind, candidate.reading, candidate.date
        );
    }
    Ok(verdict)
}
