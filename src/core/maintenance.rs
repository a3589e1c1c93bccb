//! Scheduled maintenance jobs.
//!
//! Expires listings whose window has closed and hands out the monthly Pro
//! token allowance. Both jobs are safe to run repeatedly: expiry only touches
//! rows that are still `ACTIVE`, and each Pro grant carries a per-month
//! idempotency key.

use crate::{
    core::{
        ledger::{self, LedgerEntry, TransactionType},
        listings::ListingStatus,
    },
    entities::{Advertisement, Forecast, ServiceListing, advertisement, forecast, service_listing},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{TransactionTrait, prelude::*, sea_query::Expr};
use serde_json::json;
use tracing::{info, warn};

/// Number of records moved to `EXPIRED`, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirySummary {
    /// Advertisements expired
    pub advertisements: u64,
    /// Service listings expired
    pub service_listings: u64,
    /// Forecasts expired
    pub forecasts: u64,
}

impl ExpirySummary {
    /// Total records expired across all tables.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.advertisements + self.service_listings + self.forecasts
    }
}

/// Result of one Pro grant run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProGrantSummary {
    /// Month the grant was for, as `YYYY-MM`
    pub period: String,
    /// Users credited by this run
    pub granted: Vec<String>,
    /// Users that had already received this month's grant
    pub already_granted: Vec<String>,
}

/// Moves every `ACTIVE` record whose `ends_at` is at or before `now` to `EXPIRED`.
pub async fn expire_listings<C>(db: &C, now: DateTime<Utc>) -> Result<ExpirySummary>
where
    C: ConnectionTrait + TransactionTrait,
{
    let active = ListingStatus::Active.as_str();
    let expired = ListingStatus::Expired.as_str();

    let txn = db.begin().await?;

    let advertisements = Advertisement::update_many()
        .col_expr(advertisement::Column::Status, Expr::value(expired))
        .col_expr(advertisement::Column::UpdatedAt, Expr::value(now))
        .filter(advertisement::Column::Status.eq(active))
        .filter(advertisement::Column::EndsAt.lte(now))
        .exec(&txn)
        .await?
        .rows_affected;

    let service_listings = ServiceListing::update_many()
        .col_expr(service_listing::Column::Status, Expr::value(expired))
        .col_expr(service_listing::Column::UpdatedAt, Expr::value(now))
        .filter(service_listing::Column::Status.eq(active))
        .filter(service_listing::Column::EndsAt.lte(now))
        .exec(&txn)
        .await?
        .rows_affected;

    let forecasts = Forecast::update_many()
        .col_expr(forecast::Column::Status, Expr::value(expired))
        .col_expr(forecast::Column::UpdatedAt, Expr::value(now))
        .filter(forecast::Column::Status.eq(active))
        .filter(forecast::Column::EndsAt.lte(now))
        .exec(&txn)
        .await?
        .rows_affected;

    txn.commit().await?;

    let summary = ExpirySummary {
        advertisements,
        service_listings,
        forecasts,
    };
    info!(
        "Expired {} listings ({} ads, {} services, {} forecasts)",
        summary.total(),
        advertisements,
        service_listings,
        forecasts
    );
    Ok(summary)
}

/// Idempotency key for a user's Pro grant in the month containing `now`.
#[must_use]
pub fn pro_grant_key(now: DateTime<Utc>) -> String {
    format!("pro-grant:{}", now.format("%Y-%m"))
}

/// Credits `amount` tokens to each Pro user, at most once per calendar month.
///
/// A user that already has this month's grant is reported in
/// `already_granted` and left untouched.
pub async fn grant_pro_tokens<C>(
    db: &C,
    user_ids: &[String],
    amount: i64,
    now: DateTime<Utc>,
) -> Result<ProGrantSummary>
where
    C: ConnectionTrait + TransactionTrait,
{
    let period = now.format("%Y-%m").to_string();
    let key = pro_grant_key(now);
    let mut summary = ProGrantSummary {
        period: period.clone(),
        ..Default::default()
    };

    for user_id in user_ids {
        let entry = LedgerEntry::new(
            user_id.as_str(),
            amount,
            TransactionType::ProSubscriptionGrant,
            format!("Pro subscription allowance for {period}"),
        )
        .with_metadata(json!({ "period": period }))
        .with_idempotency_key(key.as_str());

        match ledger::credit(db, entry).await {
            Ok(receipt) if receipt.replayed => summary.already_granted.push(user_id.clone()),
            Ok(_) => summary.granted.push(user_id.clone()),
            // Same month, different amount: the user was still granted once
            Err(Error::IdempotencyConflict { .. }) => {
                warn!(
                    "Pro grant for {} in {} already recorded with a different amount",
                    user_id, period
                );
                summary.already_granted.push(user_id.clone());
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "Pro grant for {}: {} credited, {} already granted",
        period,
        summary.granted.len(),
        summary.already_granted.len()
    );
    Ok(summary)
}
