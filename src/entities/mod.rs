//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod ad_pricing_tier;
pub mod advertisement;
pub mod forecast;
pub mod reward;
pub mod service_listing;
pub mod token_balance;
pub mod token_transaction;
pub mod user_earnings;

// Re-export specific types to avoid conflicts
pub use ad_pricing_tier::{
    Column as AdPricingTierColumn, Entity as AdPricingTier, Model as AdPricingTierModel,
};
pub use advertisement::{
    Column as AdvertisementColumn, Entity as Advertisement, Model as AdvertisementModel,
};
pub use forecast::{Column as ForecastColumn, Entity as Forecast, Model as ForecastModel};
pub use reward::{Column as RewardColumn, Entity as Reward, Model as RewardModel};
pub use service_listing::{
    Column as ServiceListingColumn, Entity as ServiceListing, Model as ServiceListingModel,
};
pub use token_balance::{
    Column as TokenBalanceColumn, Entity as TokenBalance, Model as TokenBalanceModel,
};
pub use token_transaction::{
    Column as TokenTransactionColumn, Entity as TokenTransaction, Model as TokenTransactionModel,
};
pub use user_earnings::{
    Column as UserEarningsColumn, Entity as UserEarnings, Model as UserEarningsModel,
};
