//! Ad slot pricing escalator.
//!
//! The price of an ad slot is `base_price * 2^tier`. The tier is a single,
//! database-wide counter that only ever goes up: it is raised to
//! `active_ads / slot_capacity` whenever that is higher than the stored tier.
//!
//! The tier lives in a versioned singleton row. Writers compare-and-swap on the
//! `version` column so two activations racing near a tier boundary cannot lose
//! each other's update.

use crate::{
    config::economy::EconomyConfig,
    core::listings::count_active_advertisements,
    entities::{AdPricingTier, ad_pricing_tier},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Set, prelude::*, sea_query::Expr};
use tracing::{debug, info};

/// Primary key of the singleton tier row
pub const PRICING_ROW_ID: i32 = 1;

const MAX_CAS_ATTEMPTS: usize = 3;

/// Price of an ad slot at `tier`.
///
/// # Errors
/// `Config` if the price overflows an `i64`.
pub fn ad_price(base_price: i64, tier: u32) -> Result<i64> {
    2_i64
        .checked_pow(tier)
        .and_then(|multiplier| base_price.checked_mul(multiplier))
        .ok_or_else(|| Error::Config {
            message: format!("ad price overflows at tier {tier} (base {base_price})"),
        })
}

/// Tier implied by the number of live ads, capped at `max_tier`.
#[must_use]
pub fn target_tier(active_ads: u64, slot_capacity: u64, max_tier: u32) -> u32 {
    if slot_capacity == 0 {
        return 0;
    }
    u32::try_from(active_ads / slot_capacity)
        .unwrap_or(u32::MAX)
        .min(max_tier)
}

fn tier_from_row(row: &ad_pricing_tier::Model) -> u32 {
    u32::try_from(row.current_tier).unwrap_or(0)
}

/// Reads the singleton tier row, if it has been created.
pub async fn get_pricing_tier<C>(db: &C) -> Result<Option<ad_pricing_tier::Model>>
where
    C: ConnectionTrait,
{
    AdPricingTier::find_by_id(PRICING_ROW_ID)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Current tier; 0 before the row exists.
pub async fn current_tier<C>(db: &C) -> Result<u32>
where
    C: ConnectionTrait,
{
    Ok(get_pricing_tier(db)
        .await?
        .as_ref()
        .map_or(0, tier_from_row))
}

/// Token price of an ad slot right now.
pub async fn current_ad_price<C>(db: &C, config: &EconomyConfig) -> Result<i64>
where
    C: ConnectionTrait,
{
    let tier = current_tier(db).await?.min(config.ad_pricing.max_tier);
    ad_price(config.ad_pricing.base_price, tier)
}

async fn ensure_tier_row<C>(db: &C) -> Result<ad_pricing_tier::Model>
where
    C: ConnectionTrait,
{
    if let Some(row) = get_pricing_tier(db).await? {
        return Ok(row);
    }

    let row = ad_pricing_tier::ActiveModel {
        id: Set(PRICING_ROW_ID),
        current_tier: Set(0),
        version: Set(0),
        updated_at: Set(Utc::now()),
    };
    AdPricingTier::insert(row).exec_without_returning(db).await?;

    get_pricing_tier(db).await?.ok_or(Error::NotFound {
        entity: "ad pricing tier",
        id: PRICING_ROW_ID.to_string(),
    })
}

/// Writes `new_tier` only if the row is still at `expected_version`.
///
/// Returns `false` when another writer got there first.
pub async fn compare_and_set_tier<C>(db: &C, expected_version: i64, new_tier: u32) -> Result<bool>
where
    C: ConnectionTrait,
{
    let new_tier = i32::try_from(new_tier).map_err(|_| Error::Config {
        message: format!("tier {new_tier} is out of range"),
    })?;

    let result = AdPricingTier::update_many()
        .col_expr(ad_pricing_tier::Column::CurrentTier, Expr::value(new_tier))
        .col_expr(
            ad_pricing_tier::Column::Version,
            Expr::col(ad_pricing_tier::Column::Version).add(1),
        )
        .col_expr(ad_pricing_tier::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(ad_pricing_tier::Column::Id.eq(PRICING_ROW_ID))
        .filter(ad_pricing_tier::Column::Version.eq(expected_version))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Raises the tier to at least `target`. Never lowers it.
///
/// Returns the tier after the call.
///
/// # Errors
/// `ConcurrentModification` if the compare-and-swap keeps losing.
pub async fn raise_tier_to<C>(db: &C, target: u32) -> Result<u32>
where
    C: ConnectionTrait,
{
    for _ in 0..MAX_CAS_ATTEMPTS {
        let row = ensure_tier_row(db).await?;
        let current = tier_from_row(&row);
        if current >= target {
            return Ok(current);
        }

        if compare_and_set_tier(db, row.version, target).await? {
            info!("Ad pricing tier raised from {} to {}", current, target);
            return Ok(target);
        }
        debug!(
            "Ad pricing tier changed underneath us at version {}, re-reading",
            row.version
        );
    }

    Err(Error::ConcurrentModification {
        resource: "ad pricing tier",
    })
}

/// Re-evaluates the tier against the current number of live ads.
pub async fn advance_tier_if_saturated<C>(
    db: &C,
    config: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<u32>
where
    C: ConnectionTrait,
{
    let active_ads = count_active_advertisements(db, now).await?;
    let target = target_tier(
        active_ads,
        config.ad_pricing.slot_capacity,
        config.ad_pricing.max_tier,
    );
    raise_tier_to(db, target).await
}

/// Startup initialisation: creates the tier row if needed and catches the tier
/// up with however many times capacity is already exceeded.
pub async fn seed_pricing_tier<C>(
    db: &C,
    config: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<u32>
where
    C: ConnectionTrait,
{
    ensure_tier_row(db).await?;
    let tier = advance_tier_if_saturated(db, config, now).await?;
    info!(
        "Ad pricing tier seeded at {} ({} tokens per slot)",
        tier,
        ad_price(config.ad_pricing.base_price, tier.min(config.ad_pricing.max_tier))?
    );
    Ok(tier)
}
