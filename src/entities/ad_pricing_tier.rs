//! Ad pricing tier entity - the singleton, versioned escalator record.
//!
//! `version` is bumped on every write; writers compare-and-swap on it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ad pricing tier database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ad_pricing_tiers")]
pub struct Model {
    /// Always 1
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    /// Current price tier; price = base * 2^tier
    pub current_tier: i32,
    /// Optimistic concurrency version
    pub version: i64,
    /// When the tier last changed
    pub updated_at: DateTimeUtc,
}

/// `AdPricingTier` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
