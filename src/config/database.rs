//! Database configuration module for the token tracker.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated with `Schema::create_table_from_entity`, so the schema always
//! matches the entity definitions (including the unique `purchase_id` on contributions).

use crate::entities::{MeterReading, TokenPurchase, UserContribution};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

/// Database used when neither `DATABASE_URL` nor the config file name one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/token_tracker.sqlite?mode=rwc";

/// Resolves the database URL.
///
/// `DATABASE_URL` in the environment wins, then the configured URL, then
/// [`DEFAULT_DATABASE_URL`].
#[must_use]
pub fn get_database_url(configured: Option<&str>) -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| configured.map(ToString::to_string))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database and makes sure all tables exist.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database at {database_url}");
    let db = Database::connect(database_url).await?;
    create_tables(&db).await?;
    info!("Database ready");
    Ok(db)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables that do not exist yet.
///
/// Purchases are created before contributions because contributions reference them.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, TokenPurchase).await?;
    create_table(db, &schema, UserContribution).await?;
    create_table(db, &schema, MeterReading).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MeterReadingModel, TokenPurchaseModel, UserContributionModel};
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _: Vec<TokenPurchaseModel> = TokenPurchase::find().limit(1).all(&db).await?;
        let _: Vec<UserContributionModel> = UserContribution::find().limit(1).all(&db).await?;
        let _: Vec<MeterReadingModel> = MeterReading::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_connection_in_memory() -> Result<()> {
        let db = create_connection("sqlite::memory:").await?;
        let purchases: Vec<TokenPurchaseModel> = TokenPurchase::find().all(&db).await?;
        assert!(purchases.is_empty());
        Ok(())
    }
}
