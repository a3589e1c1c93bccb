//! Token transaction entity - the append-only audit log of balance changes.
//!
//! Each row records one signed change (`amount` > 0 for credits, < 0 for debits),
//! the `transaction_type` reason, and `balance_after` so receipts can be replayed
//! for idempotent requests. Rows are never updated or deleted.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Token transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "token_transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User whose balance changed
    pub user_id: String,
    /// Signed change in tokens
    pub amount: i64,
    /// Canonical `TransactionType` string, e.g. `"AD_REDEMPTION"`
    pub transaction_type: String,
    /// Human-readable description of the change
    pub description: String,
    /// JSON object with extra context (target entity id, counterparty, ...)
    #[sea_orm(column_type = "Text", nullable)]
    pub metadata: Option<String>,
    /// Caller-supplied deduplication key, unique per user
    pub idempotency_key: Option<String>,
    /// Balance immediately after this transaction was applied
    pub balance_after: i64,
    /// When the transaction was recorded
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `TokenTransaction` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one balance
    #[sea_orm(
        belongs_to = "super::token_balance::Entity",
        from = "Column::UserId",
        to = "super::token_balance::Column::UserId"
    )]
    Balance,
}

impl Related<super::token_balance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Balance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
