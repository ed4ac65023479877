//! Meter reading entity - Independent periodic readings of the cumulative meter.
//! Used as a chronology anchor for dates where no purchase exists.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Meter reading database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "meter_readings")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who took the reading
    pub user_id: String,
    /// Cumulative meter value
    pub reading: f64,
    /// When the reading was taken
    pub reading_date: DateTimeUtc,
    /// Free-form notes
    pub notes: Option<String>,
    /// When the record was created
    pub created_at: DateTimeUtc,
}

/// `MeterReading` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
