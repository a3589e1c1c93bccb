//! Service listing entity - a marketplace offer from a member.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Service listing database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_listings")]
pub struct Model {
    /// Unique identifier for the listing
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the listing
    pub user_id: String,
    /// Listing title
    pub title: String,
    /// Longer description of the service
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// Asking price for the service, in cents
    pub price_cents: i64,
    /// Lifecycle status (`ListingStatus` string)
    pub status: String,
    /// Pending checkout session, cleared on activation
    pub checkout_session_id: Option<String>,
    /// When the listing went live
    pub starts_at: Option<DateTimeUtc>,
    /// When the listing expires
    pub ends_at: Option<DateTimeUtc>,
    /// When the listing was created
    pub created_at: DateTimeUtc,
    /// When the listing was last modified
    pub updated_at: DateTimeUtc,
}

/// `ServiceListing` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
