/// Database configuration and connection management
pub mod database;

/// Token economy settings loaded from config.toml
pub mod economy;

/// Pro member list from environment variables
pub mod users;
