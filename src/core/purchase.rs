//! Purchase business logic - Recording, editing and removing token purchases.
//!
//! Every write runs inside a database transaction: the settlement order and meter
//! reading chronology are checked against the same snapshot that the insert or update
//! is applied to. Rejections surface as [`Error::Rejected`] carrying the violation.

use crate::{
    core::{
        chronology::{self, ReadingCandidate},
        permissions::{self, Actor},
        records::{ChronologySource, DbRecords, SettlementSource},
        sequence,
        validation::RecordRef,
    },
    entities::{TokenPurchase, UserContribution, token_purchase, user_contribution},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Fields of a purchase as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PurchaseInput {
    /// When the tokens were bought
    pub purchase_date: DateTimeUtc,
    /// Tokens bought
    #[validate(range(exclusive_min = 0.0))]
    pub total_tokens: f64,
    /// Amount paid
    #[validate(range(exclusive_min = 0.0))]
    pub total_payment: f64,
    /// Meter reading at purchase time
    #[validate(range(min = 0.0))]
    pub meter_reading: f64,
    /// Bought under urgency at a premium rate
    #[serde(default)]
    pub is_emergency: bool,
}

impl PurchaseInput {
    fn check(&self) -> Result<()> {
        for amount in [self.total_tokens, self.total_payment] {
            if !amount.is_finite() {
                return Err(Error::InvalidAmount { amount });
            }
        }
        if !self.meter_reading.is_finite() {
            return Err(Error::InvalidReading {
                reading: self.meter_reading,
            });
        }
        self.validate()?;
        Ok(())
    }

    const fn candidate(&self) -> ReadingCandidate {
        ReadingCandidate::purchase(self.meter_reading, self.purchase_date, self.total_tokens)
    }
}

/// Records a new purchase.
///
/// Rejected when an older purchase is still unsettled, when the meter reading does not
/// fit between its neighbours, or when its tokens cannot reach the next purchase's reading.
///
/// # Arguments
///
/// * `db` - Database connection
/// * `input` - The purchase as submitted
/// * `actor` - The user recording it; stored as the creator
///
/// # Returns
///
/// The stored purchase.
///
/// # Errors
///
/// * [`Error::InvalidInput`], [`Error::InvalidAmount`] or [`Error::InvalidReading`] for bad input
/// * [`Error::Rejected`] carrying the sequence or range violation
/// * [`Error::Database`] if a query fails
pub async fn create_purchase(
    db: &DatabaseConnection,
    input: PurchaseInput,
    actor: &Actor,
) -> Result<token_purchase::Model> {
    input.check()?;

    let txn = db.begin().await?;
    let records = DbRecords::new(&txn);

    sequence::can_record_purchase(&records, input.purchase_date)
        .await?
        .into_result()?;
    chronology::validate_reading(&records, &input.candidate())
        .await?
        .into_result()?;

    let now = Utc::now();
    let purchase = token_purchase::ActiveModel {
        purchase_date: Set(input.purchase_date),
        total_tokens: Set(input.total_tokens),
        total_payment: Set(input.total_payment),
        meter_reading: Set(input.meter_reading),
        is_emergency: Set(input.is_emergency),
        creator_id: Set(actor.user_id.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
        "Created purchase_id {} by {}: {} tokens for {:.2}, reading {}, emergency={}",
        purchase.id,
        purchase.creator_id,
        purchase.total_tokens,
        purchase.total_payment,
        purchase.meter_reading,
        purchase.is_emergency
    );
    Ok(purchase)
}

/// Replaces the fields of an existing purchase.
///
/// The purchase itself is ignored while re-checking the meter reading chronology.
pub async fn update_purchase(
    db: &DatabaseConnection,
    purchase_id: i64,
    input: PurchaseInput,
    actor: &Actor,
) -> Result<token_purchase::Model> {
    input.check()?;

    let txn = db.begin().await?;
    let purchase = TokenPurchase::find_by_id(purchase_id)
        .one(&txn)
        .await?
        .ok_or(Error::PurchaseNotFound { id: purchase_id })?;

    let records = DbRecords::new(&txn);
    let settled = records.is_settled(purchase_id).await?;
    permissions::ensure_can_modify_purchase(actor, &purchase, settled)?;

    let candidate = input
        .candidate()
        .excluding(RecordRef::purchase(purchase_id));
    chronology::validate_reading(&records, &candidate)
        .await?
        .into_result()?;

    let mut active_model: token_purchase::ActiveModel = purchase.into();
    active_model.purchase_date = Set(input.purchase_date);
    active_model.total_tokens = Set(input.total_tokens);
    active_model.total_payment = Set(input.total_payment);
    active_model.meter_reading = Set(input.meter_reading);
    active_model.is_emergency = Set(input.is_emergency);
    active_model.updated_at = Set(Utc::now());
    let updated = active_model.update(&txn).await?;

    txn.commit().await?;

    info!("Updated purchase_id {} by {}", updated.id, actor.user_id);
    Ok(updated)
}

/// Deletes a purchase. An admin deleting a settled purchase removes its contribution too.
///
/// Rejected when a later reading would no longer fit without the deleted purchase's tokens.
pub async fn delete_purchase(db: &DatabaseConnection, purchase_id: i64, actor: &Actor) -> Result<()> {
    let txn = db.begin().await?;
    let purchase = TokenPurchase::find_by_id(purchase_id)
        .one(&txn)
        .await?
        .ok_or(Error::PurchaseNotFound { id: purchase_id })?;

    let settled = DbRecords::new(&txn).is_settled(purchase_id).await?;
    permissions::ensure_can_modify_purchase(actor, &purchase, settled)?;

    if settled {
        UserContribution::delete_many()
            .filter(user_contribution::Column::PurchaseId.eq(purchase_id))
            .exec(&txn)
            .await?;
    }
    let purchase_date = purchase.purchase_date;
    purchase.delete(&txn).await?;

    // The records that followed now sit against an earlier purchase's capacity
    let records = DbRecords::new(&txn);
    let mut followers = [
        records.nearest_after(purchase_date, None).await?,
        records.next_purchase(purchase_date, None).await?,
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();
    followers.dedup();
    for follower in &followers {
        chronology::validate_reading(&records, &ReadingCandidate::stored(follower))
            .await?
            .into_result()?;
    }

    txn.commit().await?;

    info!("Deleted purchase_id {purchase_id} by {}", actor.user_id);
    Ok(())
}

/// Retrieves a purchase by its unique ID.
pub async fn get_purchase_by_id(
    db: &DatabaseConnection,
    purchase_id: i64,
) -> Result<Option<token_purchase::Model>> {
    TokenPurchase::find_by_id(purchase_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a purchase together with its contribution, if any.
pub async fn get_purchase_with_contribution(
    db: &DatabaseConnection,
    purchase_id: i64,
) -> Result<Option<(token_purchase::Model, Option<user_contribution::Model>)>> {
    TokenPurchase::find_by_id(purchase_id)
        .find_also_related(UserContribution)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves all purchases, newest first.
pub async fn list_purchases(db: &DatabaseConnection) -> Result<Vec<token_purchase::Model>> {
    TokenPurchase::find()
        .order_by_desc(token_purchase::Column::PurchaseDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Oldest purchase still waiting for its contribution.
pub async fn next_purchase_to_settle(
    db: &DatabaseConnection,
) -> Result<Option<token_purchase::Model>> {
    DbRecords::new(db).oldest_unsettled_before(None).await
}
