//! Meter reading business logic - Independent readings between purchases.
//!
//! Readings anchor the chronology on dates without a purchase, so they are held to
//! the same bounds as purchases (without the most-recent relaxation).

use crate::{
    core::{
        chronology::{self, ReadingCandidate},
        permissions::{self, Actor},
        records::DbRecords,
        validation::RecordRef,
    },
    entities::{MeterReading, meter_reading},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// A meter reading as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MeterReadingInput {
    /// User taking the reading
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    /// Cumulative meter value
    #[validate(range(min = 0.0))]
    pub reading: f64,
    /// When the reading was taken
    pub reading_date: DateTimeUtc,
    /// Free-form notes
    #[validate(length(max = 500))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl MeterReadingInput {
    fn check(&self, actor: &Actor) -> Result<()> {
        if !self.reading.is_finite() {
            return Err(Error::InvalidReading {
                reading: self.reading,
            });
        }
        self.validate()?;
        if !actor.acts_for(&self.user_id) {
            return Err(Error::Forbidden {
                message: format!(
                    "{} cannot record readings on behalf of {}",
                    actor.user_id, self.user_id
                ),
            });
        }
        Ok(())
    }
}

/// Records a meter reading after checking it against its neighbours.
pub async fn create_meter_reading(
    db: &DatabaseConnection,
    input: MeterReadingInput,
    actor: &Actor,
) -> Result<meter_reading::Model> {
    input.check(actor)?;

    let txn = db.begin().await?;
    let candidate = ReadingCandidate::meter_reading(input.reading, input.reading_date);
    chronology::validate_reading(&DbRecords::new(&txn), &candidate)
        .await?
        .into_result()?;

    let reading = meter_reading::ActiveModel {
        user_id: Set(input.user_id),
        reading: Set(input.reading),
        reading_date: Set(input.reading_date),
        notes: Set(input.notes),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
        "Created meter_reading_id {} by {}: {} on {}",
        reading.id, reading.user_id, reading.reading, reading.reading_date
    );
    Ok(reading)
}

/// Replaces an existing meter reading. Author or admin only.
pub async fn update_meter_reading(
    db: &DatabaseConnection,
    reading_id: i64,
    input: MeterReadingInput,
    actor: &Actor,
) -> Result<meter_reading::Model> {
    input.check(actor)?;

    let txn = db.begin().await?;
    let existing = MeterReading::find_by_id(reading_id)
        .one(&txn)
        .await?
        .ok_or(Error::MeterReadingNotFound { id: reading_id })?;
    permissions::ensure_can_modify_meter_reading(actor, &existing)?;

    let candidate = ReadingCandidate::meter_reading(input.reading, input.reading_date)
        .excluding(RecordRef::meter_reading(reading_id));
    chronology::validate_reading(&DbRecords::new(&txn), &candidate)
        .await?
        .into_result()?;

    let mut active_model: meter_reading::ActiveModel = existing.into();
    active_model.user_id = Set(input.user_id);
    active_model.reading = Set(input.reading);
    active_model.reading_date = Set(input.reading_date);
    active_model.notes = Set(input.notes);
    let updated = active_model.update(&txn).await?;

    txn.commit().await?;

    info!("Updated meter_reading_id {} by {}", updated.id, actor.user_id);
    Ok(updated)
}

/// Deletes a meter reading. Author or admin only.
pub async fn delete_meter_reading(
    db: &DatabaseConnection,
    reading_id: i64,
    actor: &Actor,
) -> Result<()> {
    let reading = MeterReading::find_by_id(reading_id)
        .one(db)
        .await?
        .ok_or(Error::MeterReadingNotFound { id: reading_id })?;
    permissions::ensure_can_modify_meter_reading(actor, &reading)?;

    reading.delete(db).await?;
    info!("Deleted meter_reading_id {reading_id} by {}", actor.user_id);
    Ok(())
}

/// Retrieves a meter reading by its unique ID.
pub async fn get_meter_reading_by_id(
    db: &DatabaseConnection,
    reading_id: i64,
) -> Result<Option<meter_reading::Model>> {
    MeterReading::find_by_id(reading_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves all meter readings, oldest first.
pub async fn list_meter_readings(db: &DatabaseConnection) -> Result<Vec<meter_reading::Model>> {
    MeterReading::find()
        .order_by_asc(meter_reading::Column::ReadingDate)
        .all(db)
        .await
        .map_err(Into::into)
}
