//! Advertisement entity - a paid sidebar ad slot.
//!
//! Ads start as `DRAFT` (or `PENDING_PAYMENT` while a checkout is open) and become
//! `ACTIVE` for a fixed window once paid for with tokens or money.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Advertisement database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "advertisements")]
pub struct Model {
    /// Unique identifier for the ad
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the ad
    pub user_id: String,
    /// Headline shown in the slot
    pub title: String,
    /// Where the ad links to
    pub destination_url: String,
    /// Lifecycle status (`ListingStatus` string)
    pub status: String,
    /// Pending checkout session, cleared on activation
    pub checkout_session_id: Option<String>,
    /// Start of the paid window
    pub starts_at: Option<DateTimeUtc>,
    /// End of the paid window
    pub ends_at: Option<DateTimeUtc>,
    /// When the ad was created
    pub created_at: DateTimeUtc,
    /// When the ad was last modified
    pub updated_at: DateTimeUtc,
}

/// `Advertisement` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
