//! Token economy configuration loaded from config.toml
//!
//! Prices, durations and grant sizes live here so operators can tune the economy
//! without a release. Every section has defaults, so an empty or missing file
//! yields a working configuration.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "BUILDERS_CONFIG";

/// Longest activation window accepted, in days
pub const MAX_DURATION_DAYS: i64 = 36_500;

/// Longest rate limit window accepted, in seconds
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EconomyConfig {
    /// Ad slot pricing escalator
    pub ad_pricing: AdPricingConfig,
    /// How long each redeemable stays active
    pub durations: DurationConfig,
    /// Fixed token costs
    pub costs: CostConfig,
    /// Recurring and one-off token grants
    pub grants: GrantConfig,
    /// In-process request limiter
    pub rate_limit: RateLimitConfig,
}

/// Ad pricing escalator settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdPricingConfig {
    /// Token price at tier 0
    pub base_price: i64,
    /// Active ad slots per tier step
    pub slot_capacity: u64,
    /// Highest tier the escalator may reach
    pub max_tier: u32,
}

impl Default for AdPricingConfig {
    fn default() -> Self {
        Self {
            base_price: 5,
            slot_capacity: 10,
            max_tier: 16,
        }
    }
}

/// Activation window lengths, in days
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DurationConfig {
    /// Ad slot duration
    pub advertisement_days: i64,
    /// Service listing duration
    pub service_listing_days: i64,
    /// Time until a forecast resolves
    pub forecast_days: i64,
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self {
            advertisement_days: 30,
            service_listing_days: 30,
            forecast_days: 30,
        }
    }
}

/// Fixed token costs
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CostConfig {
    /// Tokens to activate a service listing
    pub service_listing: i64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            service_listing: 10,
        }
    }
}

/// Token grant sizes
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GrantConfig {
    /// Tokens granted to each Pro member per calendar month
    pub pro_monthly: i64,
    /// Tokens paid to a referrer when a referred member joins
    pub referral_reward: i64,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            pro_monthly: 50,
            referral_reward: 25,
        }
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
        }
    }
}

impl EconomyConfig {
    /// Rejects settings that would make prices, durations or grants meaningless.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(Error::Config {
                message: message.to_string(),
            })
        };

        if self.ad_pricing.base_price <= 0 {
            return invalid("ad_pricing.base_price must be positive");
        }
        if self.ad_pricing.slot_capacity == 0 {
            return invalid("ad_pricing.slot_capacity must be at least 1");
        }
        if crate::core::pricing::ad_price(self.ad_pricing.base_price, self.ad_pricing.max_tier)
            .is_err()
        {
            return invalid("ad_pricing.base_price overflows at ad_pricing.max_tier");
        }
        let durations = [
            self.durations.advertisement_days,
            self.durations.service_listing_days,
            self.durations.forecast_days,
        ];
        if durations.iter().any(|days| !(1..=MAX_DURATION_DAYS).contains(days)) {
            return invalid("durations must be between 1 and 36500 days");
        }
        if self.costs.service_listing <= 0 {
            return invalid("costs.service_listing must be positive");
        }
        if self.grants.pro_monthly <= 0 || self.grants.referral_reward <= 0 {
            return invalid("grants must be positive");
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return invalid("rate_limit values must be positive");
        }
        if self.rate_limit.window_secs > MAX_WINDOW_SECS {
            return invalid("rate_limit.window_secs cannot exceed one year");
        }
        Ok(())
    }
}

/// Parses and validates an economy configuration from TOML text.
///
/// # Errors
/// Returns an error if the TOML syntax is invalid or a setting fails validation.
pub fn parse_config(contents: &str) -> Result<EconomyConfig> {
    let config: EconomyConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads the economy configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A setting fails validation
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EconomyConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads the configuration from `$BUILDERS_CONFIG` or ./config.toml.
///
/// A missing file is not an error: the defaults are used instead.
pub fn load_default_config() -> Result<EconomyConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        tracing::info!("Loading economy configuration from {}", path);
        load_config(&path)
    } else {
        tracing::info!("No config file at {}, using default economy settings", path);
        Ok(EconomyConfig::default())
    }
}
