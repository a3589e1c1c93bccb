//! Token flows built on the ledger: gifts, purchases and referral rewards.
//!
//! Each flow is a thin composition of [`credit`]/[`spend`] with a fixed transaction
//! type, description and idempotency key. Gifts touch two balances and run inside
//! one database transaction so neither side can be applied alone.

use crate::{
    config::economy::GrantConfig,
    core::ledger::{LedgerEntry, LedgerReceipt, TransactionType, credit, spend},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, TransactionTrait};
use serde_json::json;
use tracing::info;

/// Receipts for both sides of a gift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftReceipt {
    /// Debit on the sender
    pub sent: LedgerReceipt,
    /// Credit on the recipient
    pub received: LedgerReceipt,
}

/// Moves tokens from one member to another.
///
/// # Errors
/// - `Validation` when sender and recipient are the same user
/// - `InvalidAmount` if `amount <= 0`
/// - `InsufficientBalance` if the sender cannot cover the gift; neither balance changes
pub async fn gift_tokens<C>(
    db: &C,
    sender_id: &str,
    recipient_id: &str,
    amount: i64,
    note: Option<&str>,
) -> Result<GiftReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    if sender_id == recipient_id {
        return Err(Error::Validation {
            message: "cannot gift tokens to yourself".to_string(),
        });
    }
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let txn = db.begin().await?;

    let mut sent = LedgerEntry::new(
        sender_id,
        amount,
        TransactionType::GiftSent,
        format!("Gift to {recipient_id}"),
    )
    .with_metadata(json!({ "recipientId": recipient_id, "note": note }));
    if let Some(note) = note {
        sent.description = format!("Gift to {recipient_id}: {note}");
    }
    let sent = spend(&txn, sent).await?;

    let received = credit(
        &txn,
        LedgerEntry::new(
            recipient_id,
            amount,
            TransactionType::GiftReceived,
            format!("Gift from {sender_id}"),
        )
        .with_metadata(json!({ "senderId": sender_id, "note": note })),
    )
    .await?;

    txn.commit().await?;

    info!("{} gifted {} tokens to {}", sender_id, amount, recipient_id);

    Ok(GiftReceipt { sent, received })
}

/// Credits tokens bought through the payment provider.
///
/// The checkout session id is the idempotency key, so a redelivered payment
/// webhook returns the original receipt instead of crediting again.
pub async fn credit_purchase<C>(
    db: &C,
    user_id: &str,
    amount: i64,
    checkout_session_id: &str,
) -> Result<LedgerReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    credit(
        db,
        LedgerEntry::new(
            user_id,
            amount,
            TransactionType::Purchase,
            format!("Purchased {amount} tokens"),
        )
        .with_metadata(json!({ "checkoutSessionId": checkout_session_id }))
        .with_idempotency_key(format!("purchase:{checkout_session_id}")),
    )
    .await
}

/// Pays the referral reward to `referrer_id` for bringing in `referred_user_id`.
///
/// A referred member pays out at most once, however often this is called.
pub async fn credit_referral_reward<C>(
    db: &C,
    referrer_id: &str,
    referred_user_id: &str,
    amount: i64,
) -> Result<LedgerReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    if referrer_id == referred_user_id {
        return Err(Error::Validation {
            message: "members cannot refer themselves".to_string(),
        });
    }

    credit(
        db,
        LedgerEntry::new(
            referrer_id,
            amount,
            TransactionType::ReferralReward,
            format!("Referral reward for inviting {referred_user_id}"),
        )
        .with_metadata(json!({ "referredUserId": referred_user_id }))
        .with_idempotency_key(format!("referral:{referred_user_id}")),
    )
    .await
}

/// Pays the configured referral reward (`grants.referral_reward`) to `referrer_id`.
pub async fn reward_referral<C>(
    db: &C,
    grants: &GrantConfig,
    referrer_id: &str,
    referred_user_id: &str,
) -> Result<LedgerReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    credit_referral_reward(db, referrer_id, referred_user_id, grants.referral_reward).await
}
