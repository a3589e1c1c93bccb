//! User earnings entity - moderation switches for the creator rewards program.
//!
//! This record is separate from the token ledger; pausing or flagging a user
//! never changes their token balance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User earnings database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_earnings")]
pub struct Model {
    /// Owner of the record
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Whether new rewards are currently suppressed
    pub rewards_paused: bool,
    /// Admin-supplied reason for the pause
    pub pause_reason: Option<String>,
    /// When rewards were paused
    pub paused_at: Option<DateTimeUtc>,
    /// Whether the user is flagged for review (blocks payouts)
    pub is_flagged: bool,
    /// Admin-supplied reason for the flag
    pub flag_reason: Option<String>,
    /// When the user was flagged
    pub flagged_at: Option<DateTimeUtc>,
    /// When the record last changed
    pub updated_at: DateTimeUtc,
}

/// `UserEarnings` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
