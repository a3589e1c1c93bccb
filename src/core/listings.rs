//! Redeemable records - advertisements, service listings and forecasts.
//!
//! Provides creation, lookup and the shared lifecycle status. Activation is not
//! done here: it always goes through `core::redemption` so it is paired with a
//! ledger debit.

use crate::{
    entities::{
        Advertisement, Forecast, ServiceListing, advertisement, forecast, service_listing,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Condition, QueryOrder, Set, prelude::*};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status shared by every redeemable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    /// Created, not yet paid for
    Draft,
    /// A checkout with the payment provider is open
    PendingPayment,
    /// Paid and live until `ends_at`
    Active,
    /// Past `ends_at`
    Expired,
}

impl ListingStatus {
    /// Canonical string stored in the `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether a record in this status may still be activated.
    #[must_use]
    pub const fn is_redeemable(self) -> bool {
        matches!(self, Self::Draft | Self::PendingPayment)
    }

    /// Status strings from which activation is allowed.
    #[must_use]
    pub fn redeemable_strs() -> [&'static str; 2] {
        [Self::Draft.as_str(), Self::PendingPayment.as_str()]
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "PENDING_PAYMENT" => Ok(Self::PendingPayment),
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(Error::Validation {
                message: format!("unknown listing status '{other}'"),
            }),
        }
    }
}

fn require_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation {
            message: format!("{field} cannot be empty"),
        });
    }
    Ok(trimmed.to_string())
}

/// Creates a draft advertisement.
///
/// # Errors
/// `Validation` if the title is empty or the URL is not http(s).
pub async fn create_advertisement<C>(
    db: &C,
    user_id: &str,
    title: &str,
    destination_url: &str,
) -> Result<advertisement::Model>
where
    C: ConnectionTrait,
{
    let title = require_text(title, "Ad title")?;
    let destination_url = require_text(destination_url, "Destination URL")?;
    if !(destination_url.starts_with("https://") || destination_url.starts_with("http://")) {
        return Err(Error::Validation {
            message: "Destination URL must start with http:// or https://".to_string(),
        });
    }

    let now = Utc::now();
    let ad = advertisement::ActiveModel {
        user_id: Set(user_id.to_string()),
        title: Set(title),
        destination_url: Set(destination_url),
        status: Set(ListingStatus::Draft.as_str().to_string()),
        checkout_session_id: Set(None),
        starts_at: Set(None),
        ends_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    ad.insert(db).await.map_err(Into::into)
}

/// Creates a draft service listing.
pub async fn create_service_listing<C>(
    db: &C,
    user_id: &str,
    title: &str,
    description: &str,
    price_cents: i64,
) -> Result<service_listing::Model>
where
    C: ConnectionTrait,
{
    let title = require_text(title, "Service title")?;
    if price_cents < 0 {
        return Err(Error::InvalidAmount {
            amount: price_cents,
        });
    }

    let now = Utc::now();
    let listing = service_listing::ActiveModel {
        user_id: Set(user_id.to_string()),
        title: Set(title),
        description: Set(description.trim().to_string()),
        price_cents: Set(price_cents),
        status: Set(ListingStatus::Draft.as_str().to_string()),
        checkout_session_id: Set(None),
        starts_at: Set(None),
        ends_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    listing.insert(db).await.map_err(Into::into)
}

/// Drafts a forecast on a founder's MRR with a fixed token stake.
///
/// # Errors
/// - `InvalidAmount` if the stake is not positive or the target is negative
/// - `Validation` if members forecast their own MRR
pub async fn create_forecast<C>(
    db: &C,
    user_id: &str,
    founder_id: &str,
    target_mrr_cents: i64,
    stake: i64,
) -> Result<forecast::Model>
where
    C: ConnectionTrait,
{
    if stake <= 0 {
        return Err(Error::InvalidAmount { amount: stake });
    }
    if target_mrr_cents < 0 {
        return Err(Error::InvalidAmount {
            amount: target_mrr_cents,
        });
    }
    let founder_id = require_text(founder_id, "Founder id")?;
    if founder_id == user_id {
        return Err(Error::Validation {
            message: "You cannot forecast your own MRR".to_string(),
        });
    }

    let now = Utc::now();
    let forecast = forecast::ActiveModel {
        user_id: Set(user_id.to_string()),
        founder_id: Set(founder_id),
        target_mrr_cents: Set(target_mrr_cents),
        stake: Set(stake),
        status: Set(ListingStatus::Draft.as_str().to_string()),
        starts_at: Set(None),
        ends_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    forecast.insert(db).await.map_err(Into::into)
}

/// Finds an advertisement by ID.
pub async fn get_advertisement<C>(db: &C, id: i64) -> Result<Option<advertisement::Model>>
where
    C: ConnectionTrait,
{
    Advertisement::find_by_id(id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a service listing by ID.
pub async fn get_service_listing<C>(db: &C, id: i64) -> Result<Option<service_listing::Model>>
where
    C: ConnectionTrait,
{
    ServiceListing::find_by_id(id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a forecast by ID.
pub async fn get_forecast<C>(db: &C, id: i64) -> Result<Option<forecast::Model>>
where
    C: ConnectionTrait,
{
    Forecast::find_by_id(id).one(db).await.map_err(Into::into)
}

fn live_ad_condition(now: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(advertisement::Column::Status.eq(ListingStatus::Active.as_str()))
        .add(
            Condition::any()
                .add(advertisement::Column::EndsAt.is_null())
                .add(advertisement::Column::EndsAt.gt(now)),
        )
}

/// Ads currently occupying a slot, soonest-ending first.
pub async fn list_active_advertisements<C>(
    db: &C,
    now: DateTime<Utc>,
) -> Result<Vec<advertisement::Model>>
where
    C: ConnectionTrait,
{
    Advertisement::find()
        .filter(live_ad_condition(now))
        .order_by_asc(advertisement::Column::EndsAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Number of ads currently occupying a slot.
pub async fn count_active_advertisements<C>(db: &C, now: DateTime<Utc>) -> Result<u64>
where
    C: ConnectionTrait,
{
    Advertisement::find()
        .filter(live_ad_condition(now))
        .count(db)
        .await
        .map_err(Into::into)
}
