//! Contribution business logic - Settling purchases with per-user contributions.
//!
//! A contribution records how many tokens of one purchase a user consumed and what
//! they paid. Contributions are entered oldest unsettled purchase first, one per
//! purchase, and their meter reading must fall within the tokens the purchase provided.
//! After creation only admins may change or remove them.

use crate::{
    core::{
        chronology::{self, Neighbours, ReadingCandidate},
        permissions::{self, Actor},
        records::{ChronologyRecord, ChronologySource, DbRecords},
        sequence,
        validation::{RangeViolation, Verdict},
    },
    entities::{TokenPurchase, UserContribution, token_purchase, user_contribution},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

/// A new contribution as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ContributionInput {
    /// Purchase being settled
    pub purchase_id: i64,
    /// User who consumed the tokens
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    /// Meter reading at contribution time
    #[validate(range(min = 0.0))]
    pub meter_reading: f64,
    /// Tokens consumed
    #[validate(range(exclusive_min = 0.0))]
    pub tokens_consumed: f64,
    /// Amount paid
    #[validate(range(exclusive_min = 0.0))]
    pub contribution_amount: f64,
}

/// Editable fields of an existing contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ContributionUpdate {
    /// Meter reading at contribution time
    #[validate(range(min = 0.0))]
    pub meter_reading: f64,
    /// Tokens consumed
    #[validate(range(exclusive_min = 0.0))]
    pub tokens_consumed: f64,
    /// Amount paid
    #[validate(range(exclusive_min = 0.0))]
    pub contribution_amount: f64,
}

fn check_figures(meter_reading: f64, tokens_consumed: f64, contribution_amount: f64) -> Result<()> {
    for amount in [tokens_consumed, contribution_amount] {
        if !amount.is_finite() {
            return Err(Error::InvalidAmount { amount });
        }
    }
    if !meter_reading.is_finite() {
        return Err(Error::InvalidReading {
            reading: meter_reading,
        });
    }
    Ok(())
}

/// Checks a contribution's figures against its purchase.
///
/// The reading must lie between the purchase reading and the purchase reading plus its
/// tokens, and no later than the next recorded reading (`next`). The tokens consumed
/// cannot exceed the tokens purchased.
#[must_use]
pub fn evaluate_contribution(
    purchase: &token_purchase::Model,
    next: Option<&ChronologyRecord>,
    meter_reading: f64,
    tokens_consumed: f64,
) -> Verdict {
    if tokens_consumed > purchase.total_tokens {
        return Verdict::reject(
            RangeViolation::ExceedsPurchase {
                tokens_consumed,
                available: purchase.total_tokens,
            },
            Some(purchase.total_tokens),
            Some(purchase.meter_reading),
        );
    }

    let candidate = ReadingCandidate::contribution(meter_reading, purchase.purchase_date);
    let neighbours = Neighbours::between(Some(ChronologyRecord::from(purchase)), next.cloned());
    chronology::evaluate(&candidate, &neighbours)
}

async fn check_against_purchase<C>(
    txn: &C,
    purchase: &token_purchase::Model,
    meter_reading: f64,
    tokens_consumed: f64,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let next = DbRecords::new(txn)
        .nearest_after(purchase.purchase_date, None)
        .await?;
    let verdict = evaluate_contribution(purchase, next.as_ref(), meter_reading, tokens_consumed);
    if let Some(violation) = &verdict.error {
        warn!("Contribution to purchase {} rejected: {violation}", purchase.id);
    }
    verdict.into_result()?;
    Ok(())
}

/// Records the contribution that settles a purchase.
///
/// Non-admins can only contribute on their own behalf.
pub async fn create_contribution(
    db: &DatabaseConnection,
    input: ContributionInput,
    actor: &Actor,
) -> Result<user_contribution::Model> {
    check_figures(
        input.meter_reading,
        input.tokens_consumed,
        input.contribution_amount,
    )?;
    input.validate()?;
    if !actor.acts_for(&input.user_id) {
        return Err(Error::Forbidden {
            message: format!("{} cannot contribute on behalf of {}", actor.user_id, input.user_id),
        });
    }

    let txn = db.begin().await?;
    let purchase = TokenPurchase::find_by_id(input.purchase_id)
        .one(&txn)
        .await?
        .ok_or(Error::PurchaseNotFound {
            id: input.purchase_id,
        })?;

    sequence::can_contribute_to(&DbRecords::new(&txn), &purchase)
        .await?
        .into_result()?;
    check_against_purchase(&txn, &purchase, input.meter_reading, input.tokens_consumed).await?;

    let now = Utc::now();
    let contribution = user_contribution::ActiveModel {
        purchase_id: Set(input.purchase_id),
        user_id: Set(input.user_id),
        meter_reading: Set(input.meter_reading),
        tokens_consumed: Set(input.tokens_consumed),
        contribution_amount: Set(input.contribution_amount),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
        "Created contribution_id {} for purchase_id {}: user_id={}, tokens={}, amount={:.2}",
        contribution.id,
        contribution.purchase_id,
        contribution.user_id,
        contribution.tokens_consumed,
        contribution.contribution_amount
    );
    Ok(contribution)
}

/// Changes the figures of a contribution. Admin only.
pub async fn update_contribution(
    db: &DatabaseConnection,
    contribution_id: i64,
    update: ContributionUpdate,
    actor: &Actor,
) -> Result<user_contribution::Model> {
    check_figures(
        update.meter_reading,
        update.tokens_consumed,
        update.contribution_amount,
    )?;
    update.validate()?;

    let txn = db.begin().await?;
    let contribution = UserContribution::find_by_id(contribution_id)
        .one(&txn)
        .await?
        .ok_or(Error::ContributionNotFound {
            id: contribution_id,
        })?;
    permissions::ensure_can_modify_contribution(actor, &contribution)?;

    let purchase = TokenPurchase::find_by_id(contribution.purchase_id)
        .one(&txn)
        .await?
        .ok_or(Error::PurchaseNotFound {
            id: contribution.purchase_id,
        })?;
    check_against_purchase(&txn, &purchase, update.meter_reading, update.tokens_consumed).await?;

    let mut active_model: user_contribution::ActiveModel = contribution.into();
    active_model.meter_reading = Set(update.meter_reading);
    active_model.tokens_consumed = Set(update.tokens_consumed);
    active_model.contribution_amount = Set(update.contribution_amount);
    active_model.updated_at = Set(Utc::now());
    let updated = active_model.update(&txn).await?;

    txn.commit().await?;

    info!("Updated contribution_id {} by {}", updated.id, actor.user_id);
    Ok(updated)
}

/// Deletes a contribution, leaving its purchase unsettled again. Admin only.
pub async fn delete_contribution(
    db: &DatabaseConnection,
    contribution_id: i64,
    actor: &Actor,
) -> Result<()> {
    let contribution = UserContribution::find_by_id(contribution_id)
        .one(db)
        .await?
        .ok_or(Error::ContributionNotFound {
            id: contribution_id,
        })?;
    permissions::ensure_can_modify_contribution(actor, &contribution)?;

    contribution.delete(db).await?;
    info!("Deleted contribution_id {contribution_id} by {}", actor.user_id);
    Ok(())
}

/// Retrieves a contribution by its unique ID.
pub async fn get_contribution_by_id(
    db: &DatabaseConnection,
    contribution_id: i64,
) -> Result<Option<user_contribution::Model>> {
    UserContribution::find_by_id(contribution_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves the contribution that settled a purchase, if any.
pub async fn get_contribution_for_purchase(
    db: &DatabaseConnection,
    purchase_id: i64,
) -> Result<Option<user_contribution::Model>> {
    UserContribution::find()
        .filter(user_contribution::Column::PurchaseId.eq(purchase_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a user's contributions, newest first.
pub async fn list_contributions_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<user_contribution::Model>> {
    UserContribution::find()
        .filter(user_contribution::Column::UserId.eq(user_id))
        .order_by_desc(user_contribution::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::validation::{SequenceViolation, Violation};
    use crate::test_utils::*;

    fn input(purchase_id: i64, user: &str, reading: f64, tokens: f64, amount: f64) -> ContributionInput {
        ContributionInput {
            purchase_id,
            user_id: user.to_string(),
            meter_reading: reading,
            tokens_consumed: tokens,
            contribution_amount: amount,
        }
    }

    #[test]
    fn test_evaluate_contribution_window() {
        let purchase = purchase_model(1, day(2024, 1, 1), 100.0, 50.0, 200.0);

        assert!(evaluate_contribution(&purchase, None, 200.0, 10.0).valid);
        assert!(evaluate_contribution(&purchase, None, 300.0, 100.0).valid);
        assert!(!evaluate_contribution(&purchase, None, 199.0, 10.0).valid);

        let verdict = evaluate_contribution(&purchase, None, 301.0, 10.0);
        assert_eq!(verdict.suggested_minimum, Some(300.0));
    }

    #[test]
    fn test_evaluate_contribution_tokens_reconcile() {
        let purchase = purchase_model(1, day(2024, 1, 1), 100.0, 50.0, 200.0);
        let verdict = evaluate_contribution(&purchase, None, 250.0, 100.5);
        assert_eq!(
            verdict.error,
            Some(Violation::Range(RangeViolation::ExceedsPurchase {
                tokens_consumed: 100.5,
                available: 100.0
            }))
        );
    }

    #[tokio::test]
    async fn test_create_contribution() -> Result<()> {
        let db = setup_test_db().await?;
        let purchase = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;

        let contribution =
            create_contribution(&db, input(purchase.id, "alice", 40.0, 40.0, 18.0), &Actor::user("alice"))
                .await?;
        assert_eq!(contribution.purchase_id, purchase.id);
        assert_eq!(contribution.user_id, "alice");
        assert_eq!(
            get_contribution_for_purchase(&db, purchase.id).await?,
            Some(contribution)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_create_contribution_only_once_per_purchase() -> Result<()> {
        let db = setup_test_db().await?;
        let purchase = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        let actor = Actor::user("alice");

        create_contribution(&db, input(purchase.id, "alice", 40.0, 40.0, 18.0), &actor).await?;
        let result =
            create_contribution(&db, input(purchase.id, "alice", 50.0, 10.0, 5.0), &actor).await;
        assert!(matches!(
            result,
            Err(Error::Rejected(Violation::Sequence(
                SequenceViolation::AlreadySettled { .. }
            )))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_contribution_out_of_order() -> Result<()> {
        let db = setup_test_db().await?;
        let first = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        let second = insert_purchase(&db, day(2024, 1, 5), 100.0, 50.0, 60.0).await?;
        let actor = Actor::user("alice");

        let result =
            create_contribution(&db, input(second.id, "alice", 90.0, 30.0, 15.0), &actor).await;
        match result {
            Err(Error::Rejected(Violation::Sequence(SequenceViolation::ContributionOutOfOrder {
                expected_purchase_id,
                ..
            }))) => assert_eq!(expected_purchase_id, first.id),
            other => panic!("expected ordering rejection, got {other:?}"),
        }

        // The first purchase is capped by the second purchase's reading
        let result =
            create_contribution(&db, input(first.id, "alice", 61.0, 61.0, 30.0), &actor).await;
        assert!(matches!(
            result,
            Err(Error::Rejected(Violation::Range(RangeViolation::AboveMaximum {
                maximum: 60.0,
                ..
            })))
        ));

        create_contribution(&db, input(first.id, "alice", 60.0, 60.0, 30.0), &actor).await?;
        create_contribution(&db, input(second.id, "alice", 90.0, 30.0, 15.0), &actor).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_contribution_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let actor = Actor::user("alice");

        let result = create_contribution(&db, input(1, "alice", 10.0, 0.0, 5.0), &actor).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = create_contribution(&db, input(1, "", 10.0, 5.0, 5.0), &actor).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = create_contribution(&db, input(1, "alice", 10.0, 5.0, f64::NAN), &actor).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = create_contribution(&db, input(999, "alice", 10.0, 5.0, 5.0), &actor).await;
        assert!(matches!(result, Err(Error::PurchaseNotFound { id: 999 })));

        let result = create_contribution(&db, input(1, "bob", 10.0, 5.0, 5.0), &actor).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete_are_admin_only() -> Result<()> {
        let db = setup_test_db().await?;
        let purchase = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        let contribution = insert_contribution(&db, purchase.id, "alice", 40.0, 40.0, 18.0).await?;
        let update = ContributionUpdate {
            meter_reading: 45.0,
            tokens_consumed: 45.0,
            contribution_amount: 22.5,
        };

        let result =
            update_contribution(&db, contribution.id, update.clone(), &Actor::user("alice")).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));

        let updated =
            update_contribution(&db, contribution.id, update, &Actor::admin("root")).await?;
        assert_eq!(updated.tokens_consumed, 45.0);
        assert_eq!(updated.contribution_amount, 22.5);

        let result = delete_contribution(&db, contribution.id, &Actor::user("alice")).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));

        delete_contribution(&db, contribution.id, &Actor::admin("root")).await?;
        assert!(get_contribution_by_id(&db, contribution.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_contributions_for_user() -> Result<()> {
        let db = setup_test_db().await?;
        let first = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        let second = insert_purchase(&db, day(2024, 1, 5), 100.0, 50.0, 60.0).await?;
        insert_contribution(&db, first.id, "alice", 60.0, 60.0, 30.0).await?;
        insert_contribution(&db, second.id, "bob", 100.0, 40.0, 20.0).await?;

        let alice = list_contributions_for_user(&db, "alice").await?;
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].purchase_id, first.id);
        assert!(list_contributions_for_user(&db, "carol").await?.is_empty());
        Ok(())
    }
}
