//! User contribution entity - A user's settlement against one purchase.
//!
//! Records the tokens the user consumed from the purchase and what they paid for them.
//! `purchase_id` is unique: every purchase is settled by exactly one contribution.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User contribution database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_contributions")]
pub struct Model {
    /// Unique identifier for the contribution
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ID of the purchase this contribution settles
    #[sea_orm(unique)]
    pub purchase_id: i64,
    /// User who consumed the tokens
    pub user_id: String,
    /// Meter reading when the contribution was taken
    pub meter_reading: f64,
    /// Tokens the user consumed out of the purchase
    pub tokens_consumed: f64,
    /// Amount the user paid
    pub contribution_amount: f64,
    /// When the record was created
    pub created_at: DateTimeUtc,
    /// When the record was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `UserContribution` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each contribution belongs to one purchase
    #[sea_orm(
        belongs_to = "super::token_purchase::Entity",
        from = "Column::PurchaseId",
        to = "super::token_purchase::Column::Id"
    )]
    Purchase,
}

impl Related<super::token_purchase::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Purchase.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
