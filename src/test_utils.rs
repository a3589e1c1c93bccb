//! Shared test utilities for the token ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        ledger::{self, LedgerEntry, TransactionType},
        listings,
    },
    entities,
    errors::Result,
};
use sea_orm::{ConnectOptions, DatabaseConnection};
use std::path::Path;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Opens a file-backed `SQLite` database with a pool of `max_connections`.
///
/// In-memory databases are limited to a single connection, so tests that need
/// statements from different connections to overlap use this instead. Writers
/// wait on each other through sqlx's default busy timeout.
pub async fn setup_pooled_test_db(path: &Path, max_connections: u32) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(max_connections)
        .min_connections(1)
        .sqlx_logging(false);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Credits `amount` purchase tokens to `user_id`.
pub async fn fund_user(db: &DatabaseConnection, user_id: &str, amount: i64) -> Result<i64> {
    let receipt = ledger::credit(
        db,
        LedgerEntry::new(user_id, amount, TransactionType::Purchase, "Test top-up"),
    )
    .await?;
    Ok(receipt.new_balance)
}

/// Creates a draft ad owned by `user_id`.
///
/// # Defaults
/// * `destination_url`: `"https://example.com"`
pub async fn create_test_ad(
    db: &DatabaseConnection,
    user_id: &str,
    title: &str,
) -> Result<entities::advertisement::Model> {
    listings::create_advertisement(db, user_id, title, "https://example.com").await
}

/// Creates a draft service listing owned by `user_id`.
///
/// # Defaults
/// * `description`: `"Test service"`
/// * `price_cents`: 5000
pub async fn create_test_service(
    db: &DatabaseConnection,
    user_id: &str,
    title: &str,
) -> Result<entities::service_listing::Model> {
    listings::create_service_listing(db, user_id, title, "Test service", 5000).await
}

/// Creates a draft forecast by `user_id` on `founder_id` with the given stake.
///
/// # Defaults
/// * `target_mrr_cents`: 1,000,000
pub async fn create_test_forecast(
    db: &DatabaseConnection,
    user_id: &str,
    founder_id: &str,
    stake: i64,
) -> Result<entities::forecast::Model> {
    listings::create_forecast(db, user_id, founder_id, 1_000_000, stake).await
}

/// Creates an ad that is already `ACTIVE`, bypassing the ledger.
/// Use this to fill ad slots when testing pricing and expiry.
pub async fn create_active_ad(
    db: &DatabaseConnection,
    user_id: &str,
    ends_at: chrono::DateTime<chrono::Utc>,
) -> Result<entities::advertisement::Model> {
    use sea_orm::{ActiveModelTrait, Set};

    let ad = create_test_ad(db, user_id, "Active ad").await?;
    let mut active: entities::advertisement::ActiveModel = ad.into();
    active.status = Set(listings::ListingStatus::Active.as_str().to_string());
    active.starts_at = Set(Some(ends_at - chrono::Duration::days(30)));
    active.ends_at = Set(Some(ends_at));
    active.update(db).await.map_err(Into::into)
}
