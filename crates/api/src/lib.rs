//! Hostgate API Library
//!
//! Host-based tenant routing, the custom domain lifecycle, and the
//! management API around them.

pub mod auth;
pub mod config;
pub mod error;
pub mod provisioning;
pub mod routes;
pub mod routing;
pub mod state;
pub mod verification;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routing::{DomainCache, HostResolver, RoutingDecision};
pub use state::AppState;
pub use verification::{DomainVerifier, SweepReport};

use hostgate_shared::{
    create_migration_pool, create_pool, run_migrations, DomainDirectory, MemoryDirectory,
    PgDirectory,
};
use std::sync::Arc;

/// Open the configured directory, running migrations for PostgreSQL
pub async fn open_directory(config: &Config) -> anyhow::Result<Arc<dyn DomainDirectory>> {
    match &config.database_url {
        Some(url) => {
            let migration_pool = create_migration_pool(url).await?;
            run_migrations(&migration_pool).await?;
            migration_pool.close().await;

            let pool = create_pool(url, config.database_max_connections).await?;
            tracing::info!("Connected to PostgreSQL directory");
            Ok(Arc::new(PgDirectory::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory directory");
            Ok(Arc::new(MemoryDirectory::new()))
        }
    }
}

/// Install the tracing subscriber (`RUST_LOG`, `LOG_FORMAT=json`)
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
