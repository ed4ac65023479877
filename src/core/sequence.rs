//! Settlement ordering for purchases and contributions.
//!
//! Every purchase has to be settled (contributed to) before a newer purchase can be
//! recorded, and contributions are entered oldest unsettled purchase first.

use crate::{
    core::{
        records::SettlementSource,
        validation::{SequenceViolation, Violation},
    },
    entities::token_purchase,
    errors::Result,
};
use sea_orm::prelude::DateTimeUtc;
use serde::Serialize;
use tracing::warn;

/// Outcome of a sequencing check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceCheck {
    /// Whether the operation may proceed
    pub valid: bool,
    /// The purchase that has to be settled first
    pub blocking_purchase: Option<token_purchase::Model>,
    /// Why the operation was refused
    pub error: Option<Violation>,
}

impl SequenceCheck {
    const fn allowed() -> Self {
        Self {
            valid: true,
            blocking_purchase: None,
            error: None,
        }
    }

    fn blocked(violation: SequenceViolation, blocking_purchase: Option<token_purchase::Model>) -> Self {
        Self {
            valid: false,
            blocking_purchase,
            error: Some(violation.into()),
        }
    }

    /// Converts the check into a `Result` for callers that stop on rejection.
    pub fn into_result(self) -> std::result::Result<(), Violation> {
        self.error.map_or(Ok(()), Err)
    }
}

/// Decides whether a purchase may be recorded given the oldest unsettled purchase
/// dated before it.
#[must_use]
pub fn check_purchase_sequence(oldest_unsettled: Option<token_purchase::Model>) -> SequenceCheck {
    match oldest_unsettled {
        None => SequenceCheck::allowed(),
        Some(blocking) => SequenceCheck::blocked(
            SequenceViolation::UnsettledPurchase {
                blocking_purchase_id: blocking.id,
                blocking_purchase_date: blocking.purchase_date,
            },
            Some(blocking),
        ),
    }
}

/// Decides whether `purchase` may receive a contribution.
///
/// `oldest_unsettled` is the oldest purchase without a contribution overall.
#[must_use]
pub fn check_contribution_order(
    purchase: &token_purchase::Model,
    already_settled: bool,
    oldest_unsettled: Option<token_purchase::Model>,
) -> SequenceCheck {
    if already_settled {
        return SequenceCheck::blocked(
            SequenceViolation::AlreadySettled {
                purchase_id: purchase.id,
            },
            None,
        );
    }

    match oldest_unsettled {
        Some(expected) if expected.id != purchase.id => SequenceCheck::blocked(
            SequenceViolation::ContributionOutOfOrder {
                purchase_id: purchase.id,
                expected_purchase_id: expected.id,
                expected_purchase_date: expected.purchase_date,
            },
            Some(expected),
        ),
        _ => SequenceCheck::allowed(),
    }
}

/// Checks whether a purchase dated `candidate_date` may be recorded now.
///
/// # Arguments
///
/// * `source` - Where unsettled purchases are looked up
/// * `candidate_date` - Date of the purchase about to be recorded
///
/// # Returns
///
/// A [`SequenceCheck`] naming the earliest purchase before `candidate_date` that still
/// lacks a contribution, if there is one.
pub async fn can_record_purchase<S>(source: &S, candidate_date: DateTimeUtc) -> Result<SequenceCheck>
where
    S: SettlementSource,
{
    let oldest = source.oldest_unsettled_before(Some(candidate_date)).await?;
    let check = check_purchase_sequence(oldest);
    if let Some(violation) = &check.error {
        warn!("Purchase dated {candidate_date} blocked: {violation}");
    }
    Ok(check)
}

/// Checks whether `purchase` may receive its contribution now.
pub async fn can_contribute_to<S>(source: &S, purchase: &token_purchase::Model) -> Result<SequenceCheck>
where
    S: SettlementSource,
{
    let settled = source.is_settled(purchase.id).await?;
    let oldest = if settled {
        None
    } else {
        source.oldest_unsettled_before(None).await?
    };
    let check = check_contribution_order(purchase, settled, oldest);
    if let Some(violation) = &check.error {
        warn!("Contribution to purchase {} blocked: {violation}", purchase.id);
    }
    Ok(check)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::records::DbRecords;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_empty_history_allows_purchase() -> Result<()> {
        let db = setup_test_db().await?;
        let check = can_record_purchase(&DbRecords::new(&db), day(2024, 1, 1)).await?;
        assert!(check.valid);
        assert!(check.blocking_purchase.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_oldest_unsettled_purchase_blocks() -> Result<()> {
        let db = setup_test_db().await?;
        let jan_1 = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        insert_purchase(&db, day(2024, 1, 5), 100.0, 50.0, 60.0).await?;
        insert_purchase(&db, day(2024, 1, 10), 100.0, 50.0, 120.0).await?;

        let check = can_record_purchase(&DbRecords::new(&db), day(2024, 1, 15)).await?;
        assert!(!check.valid);
        assert_eq!(check.blocking_purchase.as_ref().map(|p| p.id), Some(jan_1.id));
        assert_eq!(
            check.error,
            Some(Violation::Sequence(SequenceViolation::UnsettledPurchase {
                blocking_purchase_id: jan_1.id,
                blocking_purchase_date: day(2024, 1, 1),
            }))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_settled_history_allows_purchase() -> Result<()> {
        let db = setup_test_db().await?;
        let first = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        insert_contribution(&db, first.id, "alice", 80.0, 80.0, 40.0).await?;

        let check = can_record_purchase(&DbRecords::new(&db), day(2024, 1, 15)).await?;
        assert!(check.valid);
        Ok(())
    }

    #[tokio::test]
    async fn test_backdated_purchase_before_unsettled_is_allowed() -> Result<()> {
        let db = setup_test_db().await?;
        insert_purchase(&db, day(2024, 1, 10), 100.0, 50.0, 0.0).await?;

        // Only purchases strictly before the candidate date can block it
        let check = can_record_purchase(&DbRecords::new(&db), day(2024, 1, 10)).await?;
        assert!(check.valid);
        let check = can_record_purchase(&DbRecords::new(&db), day(2024, 1, 5)).await?;
        assert!(check.valid);
        Ok(())
    }

    #[tokio::test]
    async fn test_contribution_order() -> Result<()> {
        let db = setup_test_db().await?;
        let first = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        let second = insert_purchase(&db, day(2024, 1, 5), 100.0, 50.0, 60.0).await?;
        let records = DbRecords::new(&db);

        let check = can_contribute_to(&records, &second).await?;
        assert!(!check.valid);
        assert_eq!(check.blocking_purchase.unwrap().id, first.id);

        assert!(can_contribute_to(&records, &first).await?.valid);

        insert_contribution(&db, first.id, "alice", 60.0, 60.0, 30.0).await?;
        let check = can_contribute_to(&records, &first).await?;
        assert_eq!(
            check.into_result(),
            Err(Violation::Sequence(SequenceViolation::AlreadySettled {
                purchase_id: first.id
            }))
        );
        assert!(can_contribute_to(&records, &second).await?.valid);
        Ok(())
    }
}
