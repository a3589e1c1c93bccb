/// Token balances and the append-only transaction log
pub mod ledger;

/// Advertisements, service listings and forecasts
pub mod listings;

/// Expiry sweeps and the monthly Pro grant
pub mod maintenance;

/// Ad slot pricing tiers
pub mod pricing;

/// Per-key request limiting
pub mod rate_limit;

/// Spending tokens to activate listings
pub mod redemption;

/// Creator rewards, pauses and flags
pub mod rewards;

/// Gifts, purchases and referral credits
pub mod transfers;
