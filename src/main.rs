use builders_tokens::{
    config::{database, economy, users},
    core::{maintenance, pricing},
    errors::Result,
};
use chrono::Utc;
use dotenvy::dotenv;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Creates the parent directory of a file-backed `SQLite` URL.
fn ensure_database_dir(database_url: &str) -> Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Economy settings
    let config = economy::load_default_config()
        .inspect_err(|e| error!("Failed to load economy configuration: {}", e))?;
    info!(
        "Loaded economy configuration (ad base price {}, {} slots per tier)",
        config.ad_pricing.base_price, config.ad_pricing.slot_capacity
    );

    // 4. Database
    ensure_database_dir(&database::get_database_url())?;
    let db = database::create_connection()
        .await
        .inspect(|_| info!("Connected to database."))
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;

    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database tables ready."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    let now = Utc::now();

    // 5. Pricing tier
    pricing::seed_pricing_tier(&db, &config, now)
        .await
        .inspect_err(|e| error!("Failed to seed ad pricing tier: {}", e))?;

    // 6. Expire lapsed listings
    maintenance::expire_listings(&db, now)
        .await
        .inspect_err(|e| error!("Failed to expire listings: {}", e))?;

    // 7. Monthly Pro allowance
    let pro_users = users::get_pro_user_ids();
    if pro_users.is_empty() {
        info!("No Pro members configured; skipping monthly grant.");
    } else {
        maintenance::grant_pro_tokens(&db, &pro_users, config.grants.pro_monthly, now)
            .await
            .inspect_err(|e| error!("Failed to grant Pro tokens: {}", e))?;
    }

    info!("Maintenance run complete.");
    Ok(())
}
