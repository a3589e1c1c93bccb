//! Forecast entity - a token stake on a founder's future MRR.
//!
//! The stake is fixed when the forecast is drafted and debited when it is placed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Forecast database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forecasts")]
pub struct Model {
    /// Unique identifier for the forecast
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Member placing the forecast
    pub user_id: String,
    /// Founder whose MRR is being forecast
    pub founder_id: String,
    /// Predicted MRR at resolution, in cents
    pub target_mrr_cents: i64,
    /// Tokens staked
    pub stake: i64,
    /// Lifecycle status (`ListingStatus` string)
    pub status: String,
    /// When the stake was placed
    pub starts_at: Option<DateTimeUtc>,
    /// When the forecast resolves
    pub ends_at: Option<DateTimeUtc>,
    /// When the forecast was drafted
    pub created_at: DateTimeUtc,
    /// When the forecast was last modified
    pub updated_at: DateTimeUtc,
}

/// `Forecast` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
