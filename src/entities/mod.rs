//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod meter_reading;
pub mod token_purchase;
pub mod user_contribution;

// Re-export specific types to avoid conflicts
pub use meter_reading::{
    Column as MeterReadingColumn, Entity as MeterReading, Model as MeterReadingModel,
};
pub use token_purchase::{
    Column as TokenPurchaseColumn, Entity as TokenPurchase, Model as TokenPurchaseModel,
};
pub use user_contribution::{
    Column as UserContributionColumn, Entity as UserContribution, Model as UserContributionModel,
};
