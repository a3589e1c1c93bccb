//! Creator rewards ledger and the admin controls around it.
//!
//! Rewards are a second, independent ledger of money owed to creators. Admins
//! can pause a user's rewards, flag them (which blocks payouts), and cancel
//! their pending rewards. None of this touches the token ledger.

use crate::{
    entities::{Reward, UserEarnings, reward, user_earnings},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Lifecycle of a single reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardStatus {
    /// Awaiting payout
    Pending,
    /// Paid out
    Paid,
    /// Cancelled by an admin
    Cancelled,
}

impl RewardStatus {
    /// Canonical string stored in the `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RewardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(Error::Validation {
                message: format!("unknown reward status '{other}'"),
            }),
        }
    }
}

/// Summary of a completed payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutSummary {
    /// User that was paid
    pub user_id: String,
    /// Number of rewards paid
    pub reward_count: usize,
    /// Total paid, in cents
    pub total_cents: i64,
}

/// Returns the user's earnings record, if one exists.
pub async fn get_user_earnings<C>(db: &C, user_id: &str) -> Result<Option<user_earnings::Model>>
where
    C: ConnectionTrait,
{
    UserEarnings::find_by_id(user_id.to_string())
        .one(db)
        .await
        .map_err(Into::into)
}

async fn get_or_create_earnings<C>(
    db: &C,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<user_earnings::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = get_user_earnings(db, user_id).await? {
        return Ok(existing);
    }

    let record = user_earnings::ActiveModel {
        user_id: Set(user_id.to_string()),
        rewards_paused: Set(false),
        pause_reason: Set(None),
        paused_at: Set(None),
        is_flagged: Set(false),
        flag_reason: Set(None),
        flagged_at: Set(None),
        updated_at: Set(now),
    };
    UserEarnings::insert(record)
        .exec_without_returning(db)
        .await?;

    get_user_earnings(db, user_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "user earnings",
            id: user_id.to_string(),
        })
}

fn require_reason(reason: &str) -> Result<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Error::Validation {
            message: "a reason is required".to_string(),
        });
    }
    Ok(reason.to_string())
}

/// Stops new rewards from accruing for a user.
pub async fn pause_user_rewards<C>(
    db: &C,
    user_id: &str,
    reason: &str,
) -> Result<user_earnings::Model>
where
    C: ConnectionTrait,
{
    let reason = require_reason(reason)?;
    let now = Utc::now();
    let mut record: user_earnings::ActiveModel =
        get_or_create_earnings(db, user_id, now).await?.into();
    record.rewards_paused = Set(true);
    record.pause_reason = Set(Some(reason.clone()));
    record.paused_at = Set(Some(now));
    record.updated_at = Set(now);
    let record = record.update(db).await?;

    info!("Paused rewards for {}: {}", user_id, reason);
    Ok(record)
}

/// Lets rewards accrue again for a user.
pub async fn resume_user_rewards<C>(db: &C, user_id: &str) -> Result<user_earnings::Model>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let mut record: user_earnings::ActiveModel =
        get_or_create_earnings(db, user_id, now).await?.into();
    record.rewards_paused = Set(false);
    record.pause_reason = Set(None);
    record.paused_at = Set(None);
    record.updated_at = Set(now);
    let record = record.update(db).await?;

    info!("Resumed rewards for {}", user_id);
    Ok(record)
}

/// Flags a user for review; flagged users cannot request payouts.
pub async fn flag_user<C>(db: &C, user_id: &str, reason: &str) -> Result<user_earnings::Model>
where
    C: ConnectionTrait,
{
    let reason = require_reason(reason)?;
    let now = Utc::now();
    let mut record: user_earnings::ActiveModel =
        get_or_create_earnings(db, user_id, now).await?.into();
    record.is_flagged = Set(true);
    record.flag_reason = Set(Some(reason.clone()));
    record.flagged_at = Set(Some(now));
    record.updated_at = Set(now);
    let record = record.update(db).await?;

    warn!("Flagged {}: {}", user_id, reason);
    Ok(record)
}

/// Clears a user's review flag.
pub async fn unflag_user<C>(db: &C, user_id: &str) -> Result<user_earnings::Model>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let mut record: user_earnings::ActiveModel =
        get_or_create_earnings(db, user_id, now).await?.into();
    record.is_flagged = Set(false);
    record.flag_reason = Set(None);
    record.flagged_at = Set(None);
    record.updated_at = Set(now);
    let record = record.update(db).await?;

    info!("Unflagged {}", user_id);
    Ok(record)
}

/// Cancels every pending reward for a user and returns how many were cancelled.
///
/// Paid rewards and the token ledger are left alone.
pub async fn cancel_user_pending_rewards<C>(db: &C, user_id: &str, reason: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    let reason = require_reason(reason)?;

    let result = Reward::update_many()
        .col_expr(reward::Column::Status, Expr::value(RewardStatus::Cancelled.as_str()))
        .col_expr(reward::Column::CancelReason, Expr::value(reason.clone()))
        .col_expr(reward::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(reward::Column::UserId.eq(user_id))
        .filter(reward::Column::Status.eq(RewardStatus::Pending.as_str()))
        .exec(db)
        .await?;

    info!(
        "Cancelled {} pending rewards for {}: {}",
        result.rows_affected, user_id, reason
    );
    Ok(result.rows_affected)
}

/// Records a pending reward, unless the user's rewards are paused.
///
/// Returns `None` when the reward was suppressed.
pub async fn record_reward<C>(
    db: &C,
    user_id: &str,
    amount_cents: i64,
    source: &str,
) -> Result<Option<reward::Model>>
where
    C: ConnectionTrait,
{
    if amount_cents <= 0 {
        return Err(Error::InvalidAmount {
            amount: amount_cents,
        });
    }

    if get_user_earnings(db, user_id)
        .await?
        .is_some_and(|earnings| earnings.rewards_paused)
    {
        info!("Skipped {} reward for {}: rewards paused", source, user_id);
        return Ok(None);
    }

    let now = Utc::now();
    let reward = reward::ActiveModel {
        user_id: Set(user_id.to_string()),
        amount_cents: Set(amount_cents),
        source: Set(source.to_string()),
        status: Set(RewardStatus::Pending.to_string()),
        cancel_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    Ok(Some(reward.insert(db).await?))
}

/// Rewards with the given status, oldest first.
pub async fn get_rewards<C>(
    db: &C,
    user_id: &str,
    status: RewardStatus,
) -> Result<Vec<reward::Model>>
where
    C: ConnectionTrait,
{
    Reward::find()
        .filter(reward::Column::UserId.eq(user_id))
        .filter(reward::Column::Status.eq(status.as_str()))
        .order_by_asc(reward::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Total of the user's pending rewards, in cents.
pub async fn pending_rewards_total<C>(db: &C, user_id: &str) -> Result<i64>
where
    C: ConnectionTrait,
{
    Ok(get_rewards(db, user_id, RewardStatus::Pending)
        .await?
        .iter()
        .map(|r| r.amount_cents)
        .sum())
}

/// Pays out every pending reward for a user.
///
/// # Errors
/// - `PayoutBlocked` if the user is flagged or their rewards are paused
/// - `Validation` if there is nothing to pay
pub async fn request_payout<C>(db: &C, user_id: &str) -> Result<PayoutSummary>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    if let Some(earnings) = get_user_earnings(&txn, user_id).await? {
        let blocked = if earnings.is_flagged {
            Some(earnings.flag_reason.unwrap_or_else(|| "account flagged".to_string()))
        } else if earnings.rewards_paused {
            Some(
                earnings
                    .pause_reason
                    .unwrap_or_else(|| "rewards paused".to_string()),
            )
        } else {
            None
        };
        if let Some(reason) = blocked {
            warn!("Blocked payout for {}: {}", user_id, reason);
            return Err(Error::PayoutBlocked {
                user_id: user_id.to_string(),
                reason,
            });
        }
    }

    let pending = get_rewards(&txn, user_id, RewardStatus::Pending).await?;
    if pending.is_empty() {
        return Err(Error::Validation {
            message: "no pending rewards to pay out".to_string(),
        });
    }

    let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
    let total_cents: i64 = pending.iter().map(|r| r.amount_cents).sum();

    Reward::update_many()
        .col_expr(reward::Column::Status, Expr::value(RewardStatus::Paid.as_str()))
        .col_expr(reward::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(reward::Column::Id.is_in(ids))
        .filter(reward::Column::Status.eq(RewardStatus::Pending.as_str()))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    info!(
        "Paid out {} rewards ({} cents) to {}",
        pending.len(),
        total_cents,
        user_id
    );

    Ok(PayoutSummary {
        user_id: user_id.to_string(),
        reward_count: pending.len(),
        total_cents,
    })
}
