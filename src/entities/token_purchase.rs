//! Token purchase entity - A bulk acquisition of electricity tokens.
//!
//! Each purchase records how many tokens were bought, what was paid, the meter reading
//! at the time of purchase and whether it was an emergency (premium-rate) purchase.
//! A purchase is settled once its single contribution exists.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Token purchase database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "token_purchases")]
pub struct Model {
    /// Unique identifier for the purchase
    #[sea_orm(primary_key)]
    pub id: i64,
    /// When the tokens were bought
    pub purchase_date: DateTimeUtc,
    /// Number of tokens (kWh) bought
    pub total_tokens: f64,
    /// Amount paid for the whole purchase
    pub total_payment: f64,
    /// Cumulative meter reading at the time of purchase
    pub meter_reading: f64,
    /// Whether this purchase was made under urgency at a premium rate
    pub is_emergency: bool,
    /// User who recorded the purchase
    pub creator_id: String,
    /// When the record was created
    pub created_at: DateTimeUtc,
    /// When the record was last modified
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Price paid per token, or `0.0` for a purchase without tokens.
    #[must_use]
    pub fn price_per_token(&self) -> f64 {
        crate::core::cost::price_per_token(self.total_payment, self.total_tokens)
    }
}

/// Defines relationships between `TokenPurchase` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One purchase has (at most) one contribution
    #[sea_orm(has_one = "super::user_contribution::Entity")]
    Contribution,
}

impl Related<super::user_contribution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contribution.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
