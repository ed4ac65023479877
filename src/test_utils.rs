//! Shared test utilities for the token tracker.
//!
//! Helpers here insert records directly, bypassing validation, so tests can build any
//! history (including inconsistent ones) before exercising a validator.
#![allow(clippy::expect_used)]

use crate::{
    entities::{meter_reading, token_purchase, user_contribution},
    errors::Result,
};
use chrono::{TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, prelude::DateTimeUtc};

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Midnight UTC on the given day.
pub fn day(year: i32, month: u32, day: u32) -> DateTimeUtc {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid test date")
}

/// An unsaved purchase model, created by `"test_user"`.
pub fn purchase_model(
    id: i64,
    date: DateTimeUtc,
    total_tokens: f64,
    total_payment: f64,
    meter_reading: f64,
) -> token_purchase::Model {
    token_purchase::Model {
        id,
        purchase_date: date,
        total_tokens,
        total_payment,
        meter_reading,
        is_emergency: false,
        creator_id: "test_user".to_string(),
        created_at: date,
        updated_at: date,
    }
}

/// An unsaved contribution model.
pub fn contribution_model(
    id: i64,
    purchase_id: i64,
    user_id: &str,
    tokens_consumed: f64,
    contribution_amount: f64,
) -> user_contribution::Model {
    let now = Utc::now();
    user_contribution::Model {
        id,
        purchase_id,
        user_id: user_id.to_string(),
        meter_reading: 0.0,
        tokens_consumed,
        contribution_amount,
        created_at: now,
        updated_at: now,
    }
}

/// Inserts a regular purchase created by `"test_user"`.
pub async fn insert_purchase(
    db: &DatabaseConnection,
    date: DateTimeUtc,
    total_tokens: f64,
    total_payment: f64,
    meter_reading: f64,
) -> Result<token_purchase::Model> {
    let now = Utc::now();
    token_purchase::ActiveModel {
        purchase_date: Set(date),
        total_tokens: Set(total_tokens),
        total_payment: Set(total_payment),
        meter_reading: Set(meter_reading),
        is_emergency: Set(false),
        creator_id: Set("test_user".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts the contribution settling `purchase_id`.
pub async fn insert_contribution(
    db: &DatabaseConnection,
    purchase_id: i64,
    user_id: &str,
    meter_reading: f64,
    tokens_consumed: f64,
    contribution_amount: f64,
) -> Result<user_contribution::Model> {
    let now = Utc::now();
    user_contribution::ActiveModel {
        purchase_id: Set(purchase_id),
        user_id: Set(user_id.to_string()),
        meter_reading: Set(meter_reading),
        tokens_consumed: Set(tokens_consumed),
        contribution_amount: Set(contribution_amount),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts an independent meter reading taken by `"test_user"`.
pub async fn insert_meter_reading(
    db: &DatabaseConnection,
    date: DateTimeUtc,
    reading: f64,
) -> Result<meter_reading::Model> {
    meter_reading::ActiveModel {
        user_id: Set("test_user".to_string()),
        reading: Set(reading),
        reading_date: Set(date),
        notes: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}
