//! Hostgate API server

use hostgate_api::{
    init_tracing, open_directory, provisioning, routes::create_app, AppState, Config,
};
use std::time::Duration;

/// How often expired routing cache entries are purged
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("hostgate_api=info,tower_http=info");

    let config = Config::from_env()?;
    tracing::info!(
        main_domain = %config.main_domain,
        cname_zone = %config.cname_zone,
        provisioner = ?config.provisioner,
        "Starting Hostgate API"
    );

    let directory = open_directory(&config).await?;
    let provisioner = provisioning::from_config(&config)?;
    let bind_address = config.bind_address.clone();

    let state = AppState::new(config, directory, provisioner);

    let resolver = state.resolver.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            resolver.cache().cleanup();
        }
    });

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
