use std::sync::Arc;

use identity_core::AppResources;
use identity_core::api::start_webserver;
use identity_core::config::load_config;
use identity_core::manager::IdentityManager;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "identity_core=info,sea_orm=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    initialize_standard_tracing();

    let config = Arc::new(load_config()?);

    // Without a database only the configured administrator can sign in.
    let db = match config.database_url.as_deref() {
        Some(url) => {
            let db = Database::connect(url).await?;
            Migrator::up(&db, None).await?;
            tracing::info!("Database connected and migrated");
            Some(Arc::new(db))
        }
        None => {
            tracing::warn!("No database_url configured, running without a user store");
            None
        }
    };

    let manager = IdentityManager::new(config.clone(), db);
    tracing::info!(
        issuer = %config.jwt.issuer,
        providers = ?manager.external_providers().iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        "Identity manager ready"
    );

    start_webserver(AppResources::new(manager)).await?;
    Ok(())
}
