//! Token ledger - balances plus the append-only transaction log.
//!
//! Every balance change goes through [`credit`] or [`spend`], which apply the
//! change and append its audit row inside one database transaction. For any user
//! the balance therefore always equals the sum of that user's transaction amounts.
//!
//! [`spend`] checks and decrements the balance in a single conditional UPDATE
//! (`... WHERE balance >= amount`), so concurrent spends for the same user can
//! never overspend: the database serializes them on the balance row.
//!
//! Both operations accept any connection that can open a transaction. Called with
//! a [`sea_orm::DatabaseTransaction`], the nested `begin` becomes a savepoint, which
//! lets redemption workflows roll a spend back together with their own writes.

use crate::{
    entities::{TokenBalance, TokenTransaction, token_balance, token_transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Which way a transaction type is allowed to move a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Increases the balance
    Credit,
    /// Decreases the balance
    Debit,
    /// May go either way (admin corrections)
    Either,
}

/// Reason recorded on every ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Tokens bought through the payment provider
    Purchase,
    /// Tokens gifted by another member
    GiftReceived,
    /// Tokens gifted to another member
    GiftSent,
    /// Ad slot activated with tokens
    AdRedemption,
    /// Service listing activated with tokens
    ServiceRedemption,
    /// Stake placed on a forecast
    ForecastPlaced,
    /// Monthly Pro subscription allowance
    ProSubscriptionGrant,
    /// Reward for referring a new member
    ReferralReward,
    /// Manual correction by an administrator
    AdminAdjustment,
}

impl TransactionType {
    /// All transaction types, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Purchase,
        Self::GiftReceived,
        Self::GiftSent,
        Self::AdRedemption,
        Self::ServiceRedemption,
        Self::ForecastPlaced,
        Self::ProSubscriptionGrant,
        Self::ReferralReward,
        Self::AdminAdjustment,
    ];

    /// Canonical string stored in the `transaction_type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "PURCHASE",
            Self::GiftReceived => "GIFT_RECEIVED",
            Self::GiftSent => "GIFT_SENT",
            Self::AdRedemption => "AD_REDEMPTION",
            Self::ServiceRedemption => "SERVICE_REDEMPTION",
            Self::ForecastPlaced => "FORECAST_PLACED",
            Self::ProSubscriptionGrant => "PRO_SUBSCRIPTION_GRANT",
            Self::ReferralReward => "REFERRAL_REWARD",
            Self::AdminAdjustment => "ADMIN_ADJUSTMENT",
        }
    }

    /// Direction this type may move a balance.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Purchase
            | Self::GiftReceived
            | Self::ProSubscriptionGrant
            | Self::ReferralReward => Direction::Credit,
            Self::GiftSent | Self::AdRedemption | Self::ServiceRedemption | Self::ForecastPlaced => {
                Direction::Debit
            }
            Self::AdminAdjustment => Direction::Either,
        }
    }

    const fn allows(self, direction: Direction) -> bool {
        matches!(
            (self.direction(), direction),
            (Direction::Either, _)
                | (Direction::Credit, Direction::Credit)
                | (Direction::Debit, Direction::Debit)
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidTransactionType {
                transaction_type: s.to_string(),
                operation: "parse",
            })
    }
}

/// A requested balance change, shared by [`credit`] and [`spend`].
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// User whose balance changes
    pub user_id: String,
    /// Positive number of tokens to move
    pub amount: i64,
    /// Reason for the change
    pub transaction_type: TransactionType,
    /// Human-readable description
    pub description: String,
    /// Optional JSON object with extra context
    pub metadata: Option<Value>,
    /// Optional deduplication key, unique per user
    pub idempotency_key: Option<String>,
}

impl LedgerEntry {
    /// Builds an entry without metadata or idempotency key.
    pub fn new(
        user_id: impl Into<String>,
        amount: i64,
        transaction_type: TransactionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            transaction_type,
            description: description.into(),
            metadata: None,
            idempotency_key: None,
        }
    }

    /// Attaches a metadata object.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attaches an idempotency key; replays with the same key return the first receipt.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Outcome of a committed [`credit`] or [`spend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerReceipt {
    /// ID of the appended (or replayed) transaction
    pub transaction_id: i64,
    /// Balance right after the transaction
    pub new_balance: i64,
    /// True when an earlier transaction with the same idempotency key was returned
    pub replayed: bool,
}

impl From<&token_transaction::Model> for LedgerReceipt {
    fn from(transaction: &token_transaction::Model) -> Self {
        Self {
            transaction_id: transaction.id,
            new_balance: transaction.balance_after,
            replayed: false,
        }
    }
}

/// Result of reconciling a balance against its transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAudit {
    /// Audited user
    pub user_id: String,
    /// Stored balance (0 if no row)
    pub balance: i64,
    /// Sum of all transaction amounts
    pub transaction_sum: i64,
    /// Number of transactions
    pub transaction_count: usize,
    /// Whether `balance == transaction_sum`
    pub is_consistent: bool,
}

/// Returns the user's current balance, or 0 if they have never held tokens.
pub async fn get_balance<C>(db: &C, user_id: &str) -> Result<i64>
where
    C: ConnectionTrait,
{
    Ok(TokenBalance::find_by_id(user_id.to_string())
        .one(db)
        .await?
        .map_or(0, |row| row.balance))
}

/// Returns whether the user holds at least `amount` tokens.
///
/// # Errors
/// `InvalidAmount` if `amount` is zero or negative.
pub async fn has_enough_balance<C>(db: &C, user_id: &str, amount: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(get_balance(db, user_id).await? >= amount)
}

/// Validates an entry for the given direction and serializes its metadata.
fn validate_entry(
    entry: &LedgerEntry,
    direction: Direction,
    operation: &'static str,
) -> Result<Option<String>> {
    if entry.amount <= 0 {
        return Err(Error::InvalidAmount {
            amount: entry.amount,
        });
    }
    if !entry.transaction_type.allows(direction) {
        return Err(Error::InvalidTransactionType {
            transaction_type: entry.transaction_type.to_string(),
            operation,
        });
    }
    if entry.user_id.trim().is_empty() {
        return Err(Error::Validation {
            message: "user id cannot be empty".to_string(),
        });
    }
    if entry
        .idempotency_key
        .as_deref()
        .is_some_and(|key| key.trim().is_empty())
    {
        return Err(Error::Validation {
            message: "idempotency key cannot be empty".to_string(),
        });
    }
    match &entry.metadata {
        None => Ok(None),
        Some(value) if value.is_object() => Ok(Some(serde_json::to_string(value)?)),
        Some(_) => Err(Error::Validation {
            message: "transaction metadata must be a JSON object".to_string(),
        }),
    }
}

/// Looks up an earlier transaction with the entry's idempotency key.
///
/// A match with the same type and signed amount is a replay; anything else
/// reusing the key is a conflict.
async fn find_replay<C>(
    db: &C,
    entry: &LedgerEntry,
    signed_amount: i64,
) -> Result<Option<LedgerReceipt>>
where
    C: ConnectionTrait,
{
    let Some(key) = entry.idempotency_key.as_deref() else {
        return Ok(None);
    };

    let existing = TokenTransaction::find()
        .filter(token_transaction::Column::UserId.eq(entry.user_id.as_str()))
        .filter(token_transaction::Column::IdempotencyKey.eq(key))
        .one(db)
        .await?;

    match existing {
        None => Ok(None),
        Some(previous)
            if previous.amount == signed_amount
                && previous.transaction_type == entry.transaction_type.as_str() =>
        {
            debug!(
                "Replaying transaction {} for user {} (idempotency key {})",
                previous.id, entry.user_id, key
            );
            Ok(Some(LedgerReceipt {
                replayed: true,
                ..LedgerReceipt::from(&previous)
            }))
        }
        Some(_) => Err(Error::IdempotencyConflict {
            key: key.to_string(),
        }),
    }
}

async fn append_transaction<C>(
    db: &C,
    entry: &LedgerEntry,
    signed_amount: i64,
    metadata: Option<String>,
    balance_after: i64,
    now: DateTime<Utc>,
) -> Result<token_transaction::Model>
where
    C: ConnectionTrait,
{
    let transaction = token_transaction::ActiveModel {
        user_id: Set(entry.user_id.clone()),
        amount: Set(signed_amount),
        transaction_type: Set(entry.transaction_type.as_str().to_string()),
        description: Set(entry.description.clone()),
        metadata: Set(metadata),
        idempotency_key: Set(entry.idempotency_key.clone()),
        balance_after: Set(balance_after),
        created_at: Set(now),
        ..Default::default()
    };

    transaction.insert(db).await.map_err(Into::into)
}

/// Adds tokens to a user's balance and records the transaction.
///
/// The balance row is created on first credit. The balance update and the
/// transaction insert commit together or not at all.
///
/// # Errors
/// - `InvalidAmount` if `entry.amount <= 0`
/// - `InvalidTransactionType` if the type only allows debits
/// - `IdempotencyConflict` if the key was used for a different request
pub async fn credit<C>(db: &C, entry: LedgerEntry) -> Result<LedgerReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    let metadata = validate_entry(&entry, Direction::Credit, "credit")?;

    let txn = db.begin().await?;

    if let Some(receipt) = find_replay(&txn, &entry, entry.amount).await? {
        txn.commit().await?;
        return Ok(receipt);
    }

    let now = Utc::now();

    // Balance first: the transaction log references the balance row
    let updated = TokenBalance::update_many()
        .col_expr(
            token_balance::Column::Balance,
            Expr::col(token_balance::Column::Balance).add(entry.amount),
        )
        .col_expr(token_balance::Column::UpdatedAt, Expr::value(now))
        .filter(token_balance::Column::UserId.eq(entry.user_id.as_str()))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        let balance = token_balance::ActiveModel {
            user_id: Set(entry.user_id.clone()),
            balance: Set(entry.amount),
            created_at: Set(now),
            updated_at: Set(now),
        };
        TokenBalance::insert(balance)
            .exec_without_returning(&txn)
            .await?;
    }

    let new_balance = get_balance(&txn, &entry.user_id).await?;
    let transaction =
        append_transaction(&txn, &entry, entry.amount, metadata, new_balance, now).await?;

    txn.commit().await?;

    info!(
        "Credited {} tokens to {} ({}), balance now {}",
        entry.amount, entry.user_id, entry.transaction_type, new_balance
    );

    Ok(LedgerReceipt::from(&transaction))
}

/// Removes tokens from a user's balance if they have enough, and records the transaction.
///
/// The sufficiency check and the decrement are one conditional UPDATE, so two
/// concurrent spends cannot both succeed when together they exceed the balance.
/// Without an idempotency key, repeating a call debits again.
///
/// # Errors
/// - `InvalidAmount` if `entry.amount <= 0`
/// - `InvalidTransactionType` if the type only allows credits
/// - `InsufficientBalance` if the balance is below `entry.amount`; nothing is written
/// - `IdempotencyConflict` if the key was used for a different request
pub async fn spend<C>(db: &C, entry: LedgerEntry) -> Result<LedgerReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    let metadata = validate_entry(&entry, Direction::Debit, "spend")?;
    let signed_amount = -entry.amount;

    let txn = db.begin().await?;

    if let Some(receipt) = find_replay(&txn, &entry, signed_amount).await? {
        txn.commit().await?;
        return Ok(receipt);
    }

    let now = Utc::now();

    let updated = TokenBalance::update_many()
        .col_expr(
            token_balance::Column::Balance,
            Expr::col(token_balance::Column::Balance).sub(entry.amount),
        )
        .col_expr(token_balance::Column::UpdatedAt, Expr::value(now))
        .filter(token_balance::Column::UserId.eq(entry.user_id.as_str()))
        .filter(token_balance::Column::Balance.gte(entry.amount))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        let balance = get_balance(&txn, &entry.user_id).await?;
        txn.rollback().await?;
        warn!(
            "Rejected spend of {} tokens by {} ({}): balance is {}",
            entry.amount, entry.user_id, entry.transaction_type, balance
        );
        return Err(Error::InsufficientBalance {
            required: entry.amount,
            balance,
        });
    }

    let new_balance = get_balance(&txn, &entry.user_id).await?;
    let transaction =
        append_transaction(&txn, &entry, signed_amount, metadata, new_balance, now).await?;

    txn.commit().await?;

    info!(
        "Spent {} tokens from {} ({}), balance now {}",
        entry.amount, entry.user_id, entry.transaction_type, new_balance
    );

    Ok(LedgerReceipt::from(&transaction))
}

/// Applies a signed administrative correction.
///
/// Positive amounts credit, negative amounts spend; both use `ADMIN_ADJUSTMENT`.
/// A negative adjustment cannot take the balance below zero.
///
/// # Errors
/// `InvalidAmount` for zero (or `i64::MIN`), plus anything [`credit`]/[`spend`] return.
pub async fn admin_adjust<C>(
    db: &C,
    user_id: &str,
    amount: i64,
    reason: &str,
    admin_id: &str,
) -> Result<LedgerReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    let magnitude = amount
        .checked_abs()
        .filter(|m| *m > 0)
        .ok_or(Error::InvalidAmount { amount })?;

    let entry = LedgerEntry::new(
        user_id,
        magnitude,
        TransactionType::AdminAdjustment,
        format!("Admin adjustment: {reason}"),
    )
    .with_metadata(serde_json::json!({ "adminId": admin_id, "reason": reason }));

    if amount > 0 {
        credit(db, entry).await
    } else {
        spend(db, entry).await
    }
}

/// Returns a user's transactions, newest first.
pub async fn get_transactions<C>(
    db: &C,
    user_id: &str,
    limit: Option<u64>,
) -> Result<Vec<token_transaction::Model>>
where
    C: ConnectionTrait,
{
    TokenTransaction::find()
        .filter(token_transaction::Column::UserId.eq(user_id))
        .order_by_desc(token_transaction::Column::CreatedAt)
        .order_by_desc(token_transaction::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Decodes the metadata column of a transaction.
///
/// # Errors
/// `Metadata` if the stored text is not valid JSON.
pub fn transaction_metadata(transaction: &token_transaction::Model) -> Result<Option<Value>> {
    transaction
        .metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(Into::into)
}

/// Recomputes a user's balance from the transaction log and compares it to the stored balance.
pub async fn audit_ledger<C>(db: &C, user_id: &str) -> Result<LedgerAudit>
where
    C: ConnectionTrait,
{
    let balance = get_balance(db, user_id).await?;
    let transactions = get_transactions(db, user_id, None).await?;
    let transaction_sum: i64 = transactions.iter().map(|t| t.amount).sum();

    Ok(LedgerAudit {
        user_id: user_id.to_string(),
        balance,
        transaction_sum,
        transaction_count: transactions.len(),
        is_consistent: balance == transaction_sum,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_balance_without_record_is_zero() -> Result<()> {
        let db = setup_test_db().await?;
        assert_eq!(get_balance(&db, "nobody").await?, 0);
        assert!(get_transactions(&db, "nobody", None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_amount_validation_never_reaches_storage() -> Result<()> {
        // No query results configured: any database access would fail the test
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = has_enough_balance(&db, "user1", 0).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: 0 }));

        let result = has_enough_balance(&db, "user1", -5).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: -5 }));

        let entry = LedgerEntry::new("user1", 0, TransactionType::Purchase, "zero");
        let result = credit(&db, entry).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: 0 }));

        let entry = LedgerEntry::new("user1", -30, TransactionType::AdRedemption, "negative");
        let result = spend(&db, entry).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: -30 }));

        Ok(())
    }

    #[tokio::test]
    async fn test_direction_is_enforced() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let entry = LedgerEntry::new("user1", 10, TransactionType::GiftSent, "wrong way");
        let result = credit(&db, entry).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidTransactionType {
                operation: "credit",
                ..
            }
        ));

        let entry = LedgerEntry::new("user1", 10, TransactionType::Purchase, "wrong way");
        let result = spend(&db, entry).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidTransactionType {
                operation: "spend",
                ..
            }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_must_be_object() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let entry = LedgerEntry::new("user1", 10, TransactionType::Purchase, "bad metadata")
            .with_metadata(serde_json::json!([1, 2, 3]));
        let result = credit(&db, entry).await;
        assert!(matches!(result.unwrap_err(), Error::Validation { message: _ }));

        Ok(())
    }

    #[tokio::test]
    async fn test_credit_creates_balance_lazily() -> Result<()> {
        let db = setup_test_db().await?;

        let receipt = credit(
            &db,
            LedgerEntry::new(
                "user1",
                50,
                TransactionType::ProSubscriptionGrant,
                "Pro monthly token grant",
            ),
        )
        .await?;

        assert_eq!(receipt.new_balance, 50);
        assert!(!receipt.replayed);
        assert_eq!(get_balance(&db, "user1").await?, 50);

        let transactions = get_transactions(&db, "user1", None).await?;
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].id, receipt.transaction_id);
        assert_eq!(transactions[0].amount, 50);
        assert_eq!(transactions[0].transaction_type, "PRO_SUBSCRIPTION_GRANT");
        assert_eq!(transactions[0].balance_after, 50);

        Ok(())
    }

    #[tokio::test]
    async fn test_spend_debits_and_records_negative_amount() -> Result<()> {
        let db = setup_test_db().await?;
        fund_user(&db, "user1", 100).await?;

        let receipt = spend(
            &db,
            LedgerEntry::new("user1", 30, TransactionType::AdRedemption, "Sidebar ad: Foo")
                .with_metadata(serde_json::json!({ "entityId": 7 })),
        )
        .await?;

        assert_eq!(receipt.new_balance, 70);
        assert_eq!(get_balance(&db, "user1").await?, 70);

        let transactions = get_transactions(&db, "user1", None).await?;
        assert_eq!(transactions.len(), 2);
        let debit = &transactions[0];
        assert_eq!(debit.amount, -30);
        assert_eq!(debit.transaction_type, "AD_REDEMPTION");
        assert_eq!(debit.description, "Sidebar ad: Foo");
        assert_eq!(
            transaction_metadata(debit)?,
            Some(serde_json::json!({ "entityId": 7 }))
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_spend_insufficient_balance_leaves_ledger_untouched() -> Result<()> {
        let db = setup_test_db().await?;
        fund_user(&db, "user1", 10).await?;

        let result = spend(
            &db,
            LedgerEntry::new("user1", 30, TransactionType::AdRedemption, "Sidebar ad: Foo"),
        )
        .await;

        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBalance {
                required: 30,
                balance: 10
            }
        ));
        assert_eq!(get_balance(&db, "user1").await?, 10);
        assert_eq!(get_transactions(&db, "user1", None).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_spend_without_balance_row() -> Result<()> {
        let db = setup_test_db().await?;

        let result = spend(
            &db,
            LedgerEntry::new("ghost", 1, TransactionType::GiftSent, "gift"),
        )
        .await;

        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBalance {
                required: 1,
                balance: 0
            }
        ));
        assert!(get_transactions(&db, "ghost", None).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_has_enough_balance() -> Result<()> {
        let db = setup_test_db().await?;
        fund_user(&db, "user1", 25).await?;

        assert!(has_enough_balance(&db, "user1", 25).await?);
        assert!(!has_enough_balance(&db, "user1", 26).await?);
        assert!(!has_enough_balance(&db, "user2", 1).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_identical_spends_without_key_debit_twice() -> Result<()> {
        let db = setup_test_db().await?;
        fund_user(&db, "user1", 100).await?;

        let entry = LedgerEntry::new("user1", 20, TransactionType::AdRedemption, "Sidebar ad");
        let first = spend(&db, entry.clone()).await?;
        let second = spend(&db, entry).await?;

        assert_ne!(first.transaction_id, second.transaction_id);
        assert_eq!(get_balance(&db, "user1").await?, 60);

        Ok(())
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_first_receipt() -> Result<()> {
        let db = setup_test_db().await?;
        fund_user(&db, "user1", 100).await?;

        let entry = LedgerEntry::new("user1", 20, TransactionType::AdRedemption, "Sidebar ad")
            .with_idempotency_key("req-1");
        let first = spend(&db, entry.clone()).await?;
        let second = spend(&db, entry).await?;

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.transaction_id, second.transaction_id);
        assert_eq!(second.new_balance, 80);
        assert_eq!(get_balance(&db, "user1").await?, 80);

        // The same key is independent per user
        fund_user(&db, "user2", 100).await?;
        let other = spend(
            &db,
            LedgerEntry::new("user2", 20, TransactionType::AdRedemption, "Sidebar ad")
                .with_idempotency_key("req-1"),
        )
        .await?;
        assert!(!other.replayed);

        Ok(())
    }

    #[tokio::test]
    async fn test_idempotency_key_conflict() -> Result<()> {
        let db = setup_test_db().await?;
        fund_user(&db, "user1", 100).await?;

        spend(
            &db,
            LedgerEntry::new("user1", 20, TransactionType::AdRedemption, "Sidebar ad")
                .with_idempotency_key("req-1"),
        )
        .await?;

        let result = spend(
            &db,
            LedgerEntry::new("user1", 25, TransactionType::AdRedemption, "Sidebar ad")
                .with_idempotency_key("req-1"),
        )
        .await;
        assert!(matches!(
            result.unwrap_err(),
            Error::IdempotencyConflict { key } if key == "req-1"
        ));
        assert_eq!(get_balance(&db, "user1").await?, 80);

        Ok(())
    }

    async fn race_spends(db: Arc<DatabaseConnection>, tasks: usize, amount: i64) -> (usize, usize) {
        let mut set = tokio::task::JoinSet::new();
        for i in 0..tasks {
            let db = Arc::clone(&db);
            set.spawn(async move {
                spend(
                    &*db,
                    LedgerEntry::new(
                        "user1",
                        amount,
                        TransactionType::ForecastPlaced,
                        format!("Forecast {i}"),
                    ),
                )
                .await
            });
        }

        let mut succeeded = 0;
        let mut insufficient = 0;
        while let Some(joined) = set.join_next().await {
            match joined.unwrap() {
                Ok(_) => succeeded += 1,
                Err(Error::InsufficientBalance { required, .. }) if required == amount => {
                    insufficient += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        (succeeded, insufficient)
    }

    #[tokio::test]
    async fn test_concurrent_spends_cannot_overspend() -> Result<()> {
        let db = Arc::new(setup_test_db().await?);
        fund_user(&db, "user1", 40).await?;

        let (succeeded, insufficient) = race_spends(Arc::clone(&db), 8, 40).await;

        assert_eq!(succeeded, 1);
        assert_eq!(insufficient, 7);
        assert_eq!(get_balance(&*db, "user1").await?, 0);
        assert!(audit_ledger(&*db, "user1").await?.is_consistent);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_spends_across_pooled_connections() -> Result<()> {
        // A file-backed database with several pool connections, so spends
        // really overlap instead of queueing on one connection
        let dir = tempfile::tempdir()?;
        let db = Arc::new(setup_pooled_test_db(&dir.path().join("ledger.sqlite"), 8).await?);
        fund_user(&db, "user1", 100).await?;

        let (succeeded, insufficient) = race_spends(Arc::clone(&db), 16, 30).await;

        assert_eq!(succeeded, 3);
        assert_eq!(insufficient, 13);
        assert_eq!(get_balance(&*db, "user1").await?, 10);
        let audit = audit_ledger(&*db, "user1").await?;
        assert!(audit.is_consistent);
        assert_eq!(audit.transaction_count, 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_balance_matches_log_across_mixed_operations() -> Result<()> {
        let db = setup_test_db().await?;
        let steps: [(bool, i64); 8] = [
            (true, 15),
            (false, 10),
            (false, 10),
            (true, 3),
            (false, 8),
            (false, 1),
            (true, 40),
            (false, 39),
        ];

        for (is_credit, amount) in steps {
            let outcome = if is_credit {
                credit(
                    &db,
                    LedgerEntry::new("user1", amount, TransactionType::Purchase, "buy"),
                )
                .await
            } else {
                spend(
                    &db,
                    LedgerEntry::new("user1", amount, TransactionType::GiftSent, "gift"),
                )
                .await
            };
            if let Err(err) = outcome {
                assert!(matches!(err, Error::InsufficientBalance { .. }));
            }

            let audit = audit_ledger(&db, "user1").await?;
            assert!(audit.balance >= 0);
            assert!(audit.is_consistent, "ledger drifted: {audit:?}");
        }

        // The second 10 and the 1 are rejected: 15 - 10 + 3 - 8 + 40 - 39
        assert_eq!(get_balance(&db, "user1").await?, 1);
        assert_eq!(get_transactions(&db, "user1", None).await?.len(), 6);

        Ok(())
    }

    #[tokio::test]
    async fn test_admin_adjust_both_directions() -> Result<()> {
        let db = setup_test_db().await?;

        let receipt = admin_adjust(&db, "user1", 12, "support refund", "admin").await?;
        assert_eq!(receipt.new_balance, 12);

        let receipt = admin_adjust(&db, "user1", -5, "duplicate refund", "admin").await?;
        assert_eq!(receipt.new_balance, 7);

        let result = admin_adjust(&db, "user1", -50, "too much", "admin").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBalance {
                required: 50,
                balance: 7
            }
        ));

        let result = admin_adjust(&db, "user1", 0, "noop", "admin").await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: 0 }));

        let transactions = get_transactions(&db, "user1", None).await?;
        assert!(
            transactions
                .iter()
                .all(|t| t.transaction_type == "ADMIN_ADJUSTMENT")
        );

        Ok(())
    }

    #[test]
    fn test_transaction_type_strings() {
        for transaction_type in TransactionType::ALL {
            let parsed: TransactionType = transaction_type.as_str().parse().unwrap();
            assert_eq!(parsed, transaction_type);
        }
        assert!("REFUND".parse::<TransactionType>().is_err());
        assert_eq!(
            TransactionType::ProSubscriptionGrant.to_string(),
            "PRO_SUBSCRIPTION_GRANT"
        );
    }
}
