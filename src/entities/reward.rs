//! Reward entity - one creator reward awaiting payout.
//!
//! Status moves `PENDING` -> `PAID` on payout or `PENDING` -> `CANCELLED` by an admin.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Reward database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rewards")]
pub struct Model {
    /// Unique identifier for the reward
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Member who earned the reward
    pub user_id: String,
    /// Reward value in cents
    pub amount_cents: i64,
    /// What earned it (e.g. `"post_engagement"`)
    pub source: String,
    /// `"PENDING"`, `"PAID"` or `"CANCELLED"`
    pub status: String,
    /// Why an admin cancelled it
    pub cancel_reason: Option<String>,
    /// When the reward was earned
    pub created_at: DateTimeUtc,
    /// When the status last changed
    pub updated_at: DateTimeUtc,
}

/// `Reward` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
