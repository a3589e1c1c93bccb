//! Token balance entity - one row per user holding their current token balance.
//!
//! The balance is never written directly by callers; it only moves together with
//! an appended row in `token_transactions` (see `core::ledger`). Rows are created
//! lazily on the first credit.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Token balance database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "token_balances")]
pub struct Model {
    /// Owner of the balance
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Current balance in tokens, never negative
    pub balance: i64,
    /// When the row was first created
    pub created_at: DateTimeUtc,
    /// When the balance last changed
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `TokenBalance` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One balance has many transactions
    #[sea_orm(has_many = "super::token_transaction::Entity")]
    Transactions,
}

impl Related<super::token_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
