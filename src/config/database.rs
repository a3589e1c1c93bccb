//! Database configuration module for the token ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`
//! so the schema always matches the Rust structs. Creation is idempotent (`IF NOT EXISTS`),
//! which lets the maintenance binary call it on every run.

use crate::entities::{
    AdPricingTier, Advertisement, Forecast, Reward, ServiceListing, TokenBalance,
    TokenTransaction, UserEarnings, token_transaction,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema, sea_query::Index};

/// Default database location when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/builders_tokens.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    tracing::debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
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

/// Creates all tables and indexes used by the ledger, redemption and rewards modules.
///
/// Balances are created before transactions because the transaction log references them.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table(db, &schema, TokenBalance).await?;
    create_table(db, &schema, TokenTransaction).await?;
    create_table(db, &schema, Advertisement).await?;
    create_table(db, &schema, ServiceListing).await?;
    create_table(db, &schema, Forecast).await?;
    create_table(db, &schema, AdPricingTier).await?;
    create_table(db, &schema, UserEarnings).await?;
    create_table(db, &schema, Reward).await?;

    // Deduplicates retried requests: one key per user
    let idempotency_index = Index::create()
        .name("idx_token_transactions_user_idempotency")
        .table(TokenTransaction)
        .col(token_transaction::Column::UserId)
        .col(token_transaction::Column::IdempotencyKey)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&idempotency_index)).await?;

    Ok(())
}
