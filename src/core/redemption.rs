//! Redemption workflow - activating a paid feature with tokens.
//!
//! Ads, service listings and forecasts share one workflow: load, check owner
//! and status, price, spend, then flip the record to `ACTIVE`. Each record type
//! plugs in through the [`Redeemable`] trait, and callers pick the record with
//! the [`RedemptionTarget`] tagged union.
//!
//! The whole workflow runs in one database transaction. If the status update
//! fails after the spend succeeded, the spend is rolled back with it; a member
//! can never pay without being activated.

use crate::{
    config::economy::EconomyConfig,
    core::{
        ledger::{self, LedgerEntry, TransactionType},
        listings::ListingStatus,
        pricing,
    },
    entities::{
        Advertisement, Forecast, ServiceListing, advertisement, forecast, service_listing,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ConnectionTrait, EntityTrait, QueryFilter, Select, TransactionTrait, UpdateMany,
    prelude::ColumnTrait, sea_query::Expr,
};
use serde_json::json;
use tracing::info;

/// The record a member wants to redeem tokens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedemptionTarget {
    /// An ad slot
    Advertisement(i64),
    /// A marketplace listing
    ServiceListing(i64),
    /// A stake on a founder's MRR
    Forecast(i64),
}

impl RedemptionTarget {
    /// ID of the targeted record.
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Advertisement(id) | Self::ServiceListing(id) | Self::Forecast(id) => id,
        }
    }

    /// Entity name used in errors and transaction metadata.
    #[must_use]
    pub const fn entity_name(self) -> &'static str {
        match self {
            Self::Advertisement(_) => advertisement::Model::ENTITY_NAME,
            Self::ServiceListing(_) => service_listing::Model::ENTITY_NAME,
            Self::Forecast(_) => forecast::Model::ENTITY_NAME,
        }
    }
}

/// How a record's token cost is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostRule {
    /// A known number of tokens
    Fixed(i64),
    /// The current ad slot price; activation also re-evaluates the tier
    AdSlotTier,
}

/// The window a record stays active for once redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationWindow {
    /// Start of the window
    pub starts_at: DateTime<Utc>,
    /// End of the window
    pub ends_at: DateTime<Utc>,
}

impl ActivationWindow {
    /// A window of `days` starting at `now`.
    ///
    /// # Errors
    /// `Config` if the end date cannot be represented.
    pub fn starting(now: DateTime<Utc>, days: i64) -> Result<Self> {
        let ends_at = Duration::try_days(days)
            .and_then(|length| now.checked_add_signed(length))
            .ok_or_else(|| Error::Config {
                message: format!("an activation window of {days} days is out of range"),
            })?;
        Ok(Self {
            starts_at: now,
            ends_at,
        })
    }
}

/// Outcome of a successful redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionReceipt {
    /// The activated record
    pub target: RedemptionTarget,
    /// Ledger transaction that paid for it
    pub transaction_id: i64,
    /// Tokens debited
    pub tokens_spent: i64,
    /// Balance after the debit
    pub new_balance: i64,
    /// Activation window
    pub window: ActivationWindow,
}

/// A record that can be activated by spending tokens.
pub trait Redeemable: Sized {
    /// `SeaORM` entity whose model is `Self`
    type Entity: EntityTrait<Model = Self>;

    /// Entity name used in errors and metadata
    const ENTITY_NAME: &'static str;
    /// Ledger transaction type recorded for the spend
    const TRANSACTION_TYPE: TransactionType;

    /// Query that loads the record by ID.
    fn find_query(id: i64) -> Select<Self::Entity>;
    /// Record ID.
    fn record_id(&self) -> i64;
    /// Owning member.
    fn owner_id(&self) -> &str;
    /// Raw status string.
    fn status(&self) -> &str;
    /// Cost of activating this record.
    fn cost_rule(&self, config: &EconomyConfig) -> CostRule;
    /// Length of the activation window.
    fn duration_days(config: &EconomyConfig) -> i64;
    /// Description written to the ledger.
    fn description(&self) -> String;
    /// Conditional update moving the record to `ACTIVE`; matches nothing unless
    /// the record is still redeemable.
    fn activation(&self, window: ActivationWindow) -> UpdateMany<Self::Entity>;
    /// Update recording an open checkout, or `None` if the record can only be paid with tokens.
    fn pending_payment(&self, checkout_session_id: &str) -> Option<UpdateMany<Self::Entity>>;
}

impl Redeemable for advertisement::Model {
    type Entity = Advertisement;
    const ENTITY_NAME: &'static str = "advertisement";
    const TRANSACTION_TYPE: TransactionType = TransactionType::AdRedemption;

    fn find_query(id: i64) -> Select<Advertisement> {
        Advertisement::find_by_id(id)
    }

    fn record_id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn cost_rule(&self, _config: &EconomyConfig) -> CostRule {
        CostRule::AdSlotTier
    }

    fn duration_days(config: &EconomyConfig) -> i64 {
        config.durations.advertisement_days
    }

    fn description(&self) -> String {
        format!("Sidebar ad: {}", self.title)
    }

    fn activation(&self, window: ActivationWindow) -> UpdateMany<Advertisement> {
        Advertisement::update_many()
            .col_expr(
                advertisement::Column::Status,
                Expr::value(ListingStatus::Active.as_str()),
            )
            .col_expr(
                advertisement::Column::StartsAt,
                Expr::value(window.starts_at),
            )
            .col_expr(advertisement::Column::EndsAt, Expr::value(window.ends_at))
            .col_expr(
                advertisement::Column::CheckoutSessionId,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                advertisement::Column::UpdatedAt,
                Expr::value(window.starts_at),
            )
            .filter(advertisement::Column::Id.eq(self.id))
            .filter(advertisement::Column::Status.is_in(ListingStatus::redeemable_strs()))
    }

    fn pending_payment(&self, checkout_session_id: &str) -> Option<UpdateMany<Advertisement>> {
        Some(
            Advertisement::update_many()
                .col_expr(
                    advertisement::Column::Status,
                    Expr::value(ListingStatus::PendingPayment.as_str()),
                )
                .col_expr(
                    advertisement::Column::CheckoutSessionId,
                    Expr::value(checkout_session_id),
                )
                .col_expr(advertisement::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(advertisement::Column::Id.eq(self.id))
                .filter(advertisement::Column::Status.is_in(ListingStatus::redeemable_strs())),
        )
    }
}

impl Redeemable for service_listing::Model {
    type Entity = ServiceListing;
    const ENTITY_NAME: &'static str = "service listing";
    const TRANSACTION_TYPE: TransactionType = TransactionType::ServiceRedemption;

    fn find_query(id: i64) -> Select<ServiceListing> {
        ServiceListing::find_by_id(id)
    }

    fn record_id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn cost_rule(&self, config: &EconomyConfig) -> CostRule {
        CostRule::Fixed(config.costs.service_listing)
    }

    fn duration_days(config: &EconomyConfig) -> i64 {
        config.durations.service_listing_days
    }

    fn description(&self) -> String {
        format!("Service listing: {}", self.title)
    }

    fn activation(&self, window: ActivationWindow) -> UpdateMany<ServiceListing> {
        ServiceListing::update_many()
            .col_expr(
                service_listing::Column::Status,
                Expr::value(ListingStatus::Active.as_str()),
            )
            .col_expr(
                service_listing::Column::StartsAt,
                Expr::value(window.starts_at),
            )
            .col_expr(service_listing::Column::EndsAt, Expr::value(window.ends_at))
            .col_expr(
                service_listing::Column::CheckoutSessionId,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                service_listing::Column::UpdatedAt,
                Expr::value(window.starts_at),
            )
            .filter(service_listing::Column::Id.eq(self.id))
            .filter(service_listing::Column::Status.is_in(ListingStatus::redeemable_strs()))
    }

    fn pending_payment(&self, checkout_session_id: &str) -> Option<UpdateMany<ServiceListing>> {
        Some(
            ServiceListing::update_many()
                .col_expr(
                    service_listing::Column::Status,
                    Expr::value(ListingStatus::PendingPayment.as_str()),
                )
                .col_expr(
                    service_listing::Column::CheckoutSessionId,
                    Expr::value(checkout_session_id),
                )
                .col_expr(service_listing::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(service_listing::Column::Id.eq(self.id))
                .filter(
                    service_listing::Column::Status.is_in(ListingStatus::redeemable_strs()),
                ),
        )
    }
}

impl Redeemable for forecast::Model {
    type Entity = Forecast;
    const ENTITY_NAME: &'static str = "forecast";
    const TRANSACTION_TYPE: TransactionType = TransactionType::ForecastPlaced;

    fn find_query(id: i64) -> Select<Forecast> {
        Forecast::find_by_id(id)
    }

    fn record_id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn cost_rule(&self, _config: &EconomyConfig) -> CostRule {
        CostRule::Fixed(self.stake)
    }

    fn duration_days(config: &EconomyConfig) -> i64 {
        config.durations.forecast_days
    }

    fn description(&self) -> String {
        format!("Forecast on {}'s MRR", self.founder_id)
    }

    fn activation(&self, window: ActivationWindow) -> UpdateMany<Forecast> {
        Forecast::update_many()
            .col_expr(
                forecast::Column::Status,
                Expr::value(ListingStatus::Active.as_str()),
            )
            .col_expr(forecast::Column::StartsAt, Expr::value(window.starts_at))
            .col_expr(forecast::Column::EndsAt, Expr::value(window.ends_at))
            .col_expr(forecast::Column::UpdatedAt, Expr::value(window.starts_at))
            .filter(forecast::Column::Id.eq(self.id))
            .filter(forecast::Column::Status.is_in(ListingStatus::redeemable_strs()))
    }

    fn pending_payment(&self, _checkout_session_id: &str) -> Option<UpdateMany<Forecast>> {
        None
    }
}

/// Loads a record and checks it belongs to `user_id` and can still be activated.
async fn load_redeemable<M, C>(db: &C, id: i64, user_id: &str) -> Result<M>
where
    M: Redeemable,
    C: ConnectionTrait,
{
    let record = M::find_query(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: M::ENTITY_NAME,
            id: id.to_string(),
        })?;

    if record.owner_id() != user_id {
        return Err(Error::Forbidden {
            entity: M::ENTITY_NAME,
            id: id.to_string(),
            user_id: user_id.to_string(),
        });
    }

    let status: ListingStatus = record.status().parse()?;
    if !status.is_redeemable() {
        return Err(Error::InvalidState {
            entity: M::ENTITY_NAME,
            id: id.to_string(),
            status: status.to_string(),
        });
    }

    Ok(record)
}

async fn redeem<M, C>(
    db: &C,
    config: &EconomyConfig,
    target: RedemptionTarget,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<RedemptionReceipt>
where
    M: Redeemable,
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let record: M = load_redeemable(&txn, target.id(), user_id).await?;

    let cost_rule = record.cost_rule(config);
    let cost = match cost_rule {
        CostRule::Fixed(tokens) => tokens,
        CostRule::AdSlotTier => pricing::current_ad_price(&txn, config).await?,
    };

    let window = ActivationWindow::starting(now, M::duration_days(config))?;

    let receipt = ledger::spend(
        &txn,
        LedgerEntry::new(user_id, cost, M::TRANSACTION_TYPE, record.description()).with_metadata(
            json!({ "entityType": M::ENTITY_NAME, "entityId": record.record_id() }),
        ),
    )
    .await?;

    let updated = record.activation(window).exec(&txn).await?;
    if updated.rows_affected != 1 {
        // Status changed after we loaded it; dropping `txn` undoes the spend
        return Err(Error::InvalidState {
            entity: M::ENTITY_NAME,
            id: target.id().to_string(),
            status: "changed concurrently".to_string(),
        });
    }

    if cost_rule == CostRule::AdSlotTier {
        pricing::advance_tier_if_saturated(&txn, config, now).await?;
    }

    txn.commit().await?;

    info!(
        "{} redeemed {} {} for {} tokens (active until {})",
        user_id,
        M::ENTITY_NAME,
        target.id(),
        cost,
        window.ends_at
    );

    Ok(RedemptionReceipt {
        target,
        transaction_id: receipt.transaction_id,
        tokens_spent: cost,
        new_balance: receipt.new_balance,
        window,
    })
}

/// Spends tokens to activate a record owned by `user_id`.
///
/// # Errors
/// - `NotFound` if the record does not exist
/// - `Forbidden` if `user_id` does not own it
/// - `InvalidState` if it is already `ACTIVE` or `EXPIRED`
/// - `InsufficientBalance` if the member cannot pay; nothing changes
pub async fn activate_with_tokens<C>(
    db: &C,
    config: &EconomyConfig,
    target: RedemptionTarget,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<RedemptionReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    match target {
        RedemptionTarget::Advertisement(_) => {
            redeem::<advertisement::Model, C>(db, config, target, user_id, now).await
        }
        RedemptionTarget::ServiceListing(_) => {
            redeem::<service_listing::Model, C>(db, config, target, user_id, now).await
        }
        RedemptionTarget::Forecast(_) => {
            redeem::<forecast::Model, C>(db, config, target, user_id, now).await
        }
    }
}

async fn record_pending_payment<M, C>(
    db: &C,
    target: RedemptionTarget,
    user_id: &str,
    checkout_session_id: &str,
) -> Result<()>
where
    M: Redeemable,
    C: ConnectionTrait,
{
    let record: M = load_redeemable(db, target.id(), user_id).await?;
    let Some(update) = record.pending_payment(checkout_session_id) else {
        return Err(Error::Validation {
            message: format!("{} can only be paid for with tokens", M::ENTITY_NAME),
        });
    };

    let updated = update.exec(db).await?;
    if updated.rows_affected != 1 {
        return Err(Error::InvalidState {
            entity: M::ENTITY_NAME,
            id: target.id().to_string(),
            status: "changed concurrently".to_string(),
        });
    }
    Ok(())
}

/// Records that a money checkout was opened for a record, moving it to `PENDING_PAYMENT`.
///
/// A later token redemption clears the checkout reference.
pub async fn mark_pending_payment<C>(
    db: &C,
    target: RedemptionTarget,
    user_id: &str,
    checkout_session_id: &str,
) -> Result<()>
where
    C: ConnectionTrait,
{
    match target {
        RedemptionTarget::Advertisement(_) => {
            record_pending_payment::<advertisement::Model, C>(
                db,
                target,
                user_id,
                checkout_session_id,
            )
            .await
        }
        RedemptionTarget::ServiceListing(_) => {
            record_pending_payment::<service_listing::Model, C>(
                db,
                target,
                user_id,
                checkout_session_id,
            )
            .await
        }
        RedemptionTarget::Forecast(_) => {
            record_pending_payment::<forecast::Model, C>(
                db,
                target,
                user_id,
                checkout_session_id,
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{
        ledger::{get_balance, get_transactions, transaction_metadata},
        listings::{get_advertisement, get_forecast, get_service_listing},
    };
    use crate::test_utils::*;

    fn small_ad_market() -> EconomyConfig {
        let mut config = EconomyConfig::default();
        config.ad_pricing.slot_capacity = 2;
        config
    }

    #[tokio::test]
    async fn test_activate_ad_with_tokens() -> Result<()> {
        let db = setup_test_db().await?;
        let config = EconomyConfig::default();
        let now = Utc::now();
        fund_user(&db, "user1", 100).await?;
        let ad = create_test_ad(&db, "user1", "Foo").await?;

        let receipt = activate_with_tokens(
            &db,
            &config,
            RedemptionTarget::Advertisement(ad.id),
            "user1",
            now,
        )
        .await?;

        assert_eq!(receipt.tokens_spent, 5);
        assert_eq!(receipt.new_balance, 95);
        assert_eq!(receipt.window.ends_at, now + Duration::days(30));

        let ad = get_advertisement(&db, ad.id).await?.unwrap();
        assert_eq!(ad.status, "ACTIVE");
        assert_eq!(ad.starts_at, Some(now));
        assert_eq!(ad.ends_at, Some(now + Duration::days(30)));

        let spend = &get_transactions(&db, "user1", Some(1)).await?[0];
        assert_eq!(spend.id, receipt.transaction_id);
        assert_eq!(spend.transaction_type, "AD_REDEMPTION");
        assert_eq!(spend.description, "Sidebar ad: Foo");
        assert_eq!(spend.amount, -5);
        let metadata = transaction_metadata(spend)?.unwrap();
        assert_eq!(metadata["entityId"], ad.id);
        assert_eq!(metadata["entityType"], "advertisement");

        Ok(())
    }

    #[tokio::test]
    async fn test_activation_clears_pending_checkout() -> Result<()> {
        let db = setup_test_db().await?;
        let config = EconomyConfig::default();
        fund_user(&db, "user1", 100).await?;
        let listing = create_test_service(&db, "user1", "Code review").await?;
        let target = RedemptionTarget::ServiceListing(listing.id);

        mark_pending_payment(&db, target, "user1", "cs_open").await?;
        let pending = get_service_listing(&db, listing.id).await?.unwrap();
        assert_eq!(pending.status, "PENDING_PAYMENT");
        assert_eq!(pending.checkout_session_id.as_deref(), Some("cs_open"));

        let receipt = activate_with_tokens(&db, &config, target, "user1", Utc::now()).await?;
        assert_eq!(receipt.tokens_spent, 10);

        let active = get_service_listing(&db, listing.id).await?.unwrap();
        assert_eq!(active.status, "ACTIVE");
        assert!(active.checkout_session_id.is_none());
        assert_eq!(get_balance(&db, "user1").await?, 90);

        Ok(())
    }

    #[tokio::test]
    async fn test_forecast_stakes_its_own_amount() -> Result<()> {
        let db = setup_test_db().await?;
        let config = EconomyConfig::default();
        fund_user(&db, "user1", 100).await?;
        let forecast = create_test_forecast(&db, "user1", "founder", 35).await?;
        let target = RedemptionTarget::Forecast(forecast.id);

        let receipt = activate_with_tokens(&db, &config, target, "user1", Utc::now()).await?;
        assert_eq!(receipt.tokens_spent, 35);
        assert_eq!(get_balance(&db, "user1").await?, 65);
        assert_eq!(get_forecast(&db, forecast.id).await?.unwrap().status, "ACTIVE");

        let spend = &get_transactions(&db, "user1", Some(1)).await?[0];
        assert_eq!(spend.transaction_type, "FORECAST_PLACED");

        // Forecasts have no money checkout
        let other = create_test_forecast(&db, "user1", "founder", 5).await?;
        let result =
            mark_pending_payment(&db, RedemptionTarget::Forecast(other.id), "user1", "cs").await;
        assert!(matches!(result.unwrap_err(), Error::Validation { message: _ }));

        Ok(())
    }

    #[tokio::test]
    async fn test_activation_checks_existence_owner_and_state() -> Result<()> {
        let db = setup_test_db().await?;
        let config = EconomyConfig::default();
        fund_user(&db, "user1", 100).await?;
        fund_user(&db, "user2", 100).await?;
        let ad = create_test_ad(&db, "user1", "Foo").await?;
        let target = RedemptionTarget::Advertisement(ad.id);

        let result = activate_with_tokens(
            &db,
            &config,
            RedemptionTarget::Advertisement(999),
            "user1",
            Utc::now(),
        )
        .await;
        assert!(matches!(
            result.unwrap_err(),
            Error::NotFound {
                entity: "advertisement",
                ..
            }
        ));

        let result = activate_with_tokens(&db, &config, target, "user2", Utc::now()).await;
        assert!(matches!(result.unwrap_err(), Error::Forbidden { .. }));
        assert_eq!(get_balance(&db, "user2").await?, 100);

        activate_with_tokens(&db, &config, target, "user1", Utc::now()).await?;
        let result = activate_with_tokens(&db, &config, target, "user1", Utc::now()).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { status, .. } if status == "ACTIVE"
        ));
        // Charged once only
        assert_eq!(get_balance(&db, "user1").await?, 95);

        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_record_in_draft() -> Result<()> {
        let db = setup_test_db().await?;
        let config = EconomyConfig::default();
        fund_user(&db, "user1", 3).await?;
        let ad = create_test_ad(&db, "user1", "Foo").await?;

        let result = activate_with_tokens(
            &db,
            &config,
            RedemptionTarget::Advertisement(ad.id),
            "user1",
            Utc::now(),
        )
        .await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBalance {
                required: 5,
                balance: 3
            }
        ));
        assert_eq!(get_advertisement(&db, ad.id).await?.unwrap().status, "DRAFT");
        assert_eq!(get_balance(&db, "user1").await?, 3);

        Ok(())
    }

    #[tokio::test]
    async fn test_unrepresentable_window_fails_before_charging() -> Result<()> {
        let db = setup_test_db().await?;
        let mut config = EconomyConfig::default();
        config.durations.service_listing_days = 1_000_000_000_000_000;
        fund_user(&db, "user1", 50).await?;
        let service = create_test_service(&db, "user1", "Audit").await?;

        let result = activate_with_tokens(
            &db,
            &config,
            RedemptionTarget::ServiceListing(service.id),
            "user1",
            Utc::now(),
        )
        .await;
        assert!(matches!(result.unwrap_err(), Error::Config { message: _ }));
        assert_eq!(
            get_service_listing(&db, service.id).await?.unwrap().status,
            "DRAFT"
        );
        assert_eq!(get_balance(&db, "user1").await?, 50);
        assert_eq!(get_transactions(&db, "user1", None).await?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_activation_window_bounds() {
        let now = Utc::now();
        let window = ActivationWindow::starting(now, 30).unwrap();
        assert_eq!(window.ends_at, now + Duration::days(30));
        assert!(ActivationWindow::starting(now, i64::MAX).is_err());
        assert!(ActivationWindow::starting(DateTime::<Utc>::MAX_UTC, 1).is_err());
    }

    #[tokio::test]
    async fn test_failed_activation_rolls_back_spend() -> Result<()> {
        let db = setup_test_db().await?;
        let config = EconomyConfig::default();
        fund_user(&db, "user1", 100).await?;
        let ad = create_test_ad(&db, "user1", "Foo").await?;
        let target = RedemptionTarget::Advertisement(ad.id);

        db.execute_unprepared(
            "CREATE TRIGGER fail_ad_activation BEFORE UPDATE ON advertisements \
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .await?;

        let result = activate_with_tokens(&db, &config, target, "user1", Utc::now()).await;
        assert!(matches!(result.unwrap_err(), Error::Database(_)));

        // No orphan debit and no balance change
        assert_eq!(get_balance(&db, "user1").await?, 100);
        assert_eq!(get_transactions(&db, "user1", None).await?.len(), 1);
        assert_eq!(get_advertisement(&db, ad.id).await?.unwrap().status, "DRAFT");

        db.execute_unprepared("DROP TRIGGER fail_ad_activation;")
            .await?;
        let receipt = activate_with_tokens(&db, &config, target, "user1", Utc::now()).await?;
        assert_eq!(receipt.new_balance, 95);

        Ok(())
    }

    #[tokio::test]
    async fn test_ad_price_escalates_with_occupancy() -> Result<()> {
        let db = setup_test_db().await?;
        let config = small_ad_market();
        fund_user(&db, "user1", 100).await?;

        let mut spent = Vec::new();
        for i in 0..4 {
            let ad = create_test_ad(&db, "user1", &format!("Ad {i}")).await?;
            let receipt = activate_with_tokens(
                &db,
                &config,
                RedemptionTarget::Advertisement(ad.id),
                "user1",
                Utc::now(),
            )
            .await?;
            spent.push(receipt.tokens_spent);
        }

        // Capacity 2: the tier steps up after the 2nd and 4th live ad
        assert_eq!(spent, vec![5, 5, 10, 10]);
        assert_eq!(pricing::current_tier(&db).await?, 2);
        assert_eq!(get_balance(&db, "user1").await?, 70);

        Ok(())
    }

    #[test]
    fn test_target_accessors() {
        let target = RedemptionTarget::ServiceListing(4);
        assert_eq!(target.id(), 4);
        assert_eq!(target.entity_name(), "service listing");
        assert_eq!(RedemptionTarget::Forecast(1).entity_name(), "forecast");
    }
}
