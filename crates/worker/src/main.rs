//! Hostgate background worker
//!
//! Runs the custom domain verification sweep on a cron schedule.

mod sweep;

use hostgate_api::{init_tracing, open_directory, provisioning, AppState, Config};
use sweep::SweepJob;
use tokio_cron_scheduler::{Job, JobScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("hostgate_worker=info,hostgate_api=info");

    let config = Config::from_env()?;
    let schedule = config.verification_sweep_cron.clone();
    let batch = config.verification_sweep_batch;

    let directory = open_directory(&config).await?;
    let provisioner = provisioning::from_config(&config)?;
    tracing::info!(
        provisioner = provisioner.name(),
        schedule = %schedule,
        batch,
        "Starting Hostgate worker"
    );

    let state = AppState::new(config, directory, provisioner);
    let sweep = SweepJob::new(state.verifier.clone(), batch);

    let mut scheduler = JobScheduler::new().await?;
    scheduler
        .add(Job::new_async(schedule.as_str(), move |_id, _scheduler| {
            let sweep = sweep.clone();
            Box::pin(async move {
                // Outcomes are logged by the job itself
                let _ = sweep.run().await;
            })
        })?)
        .await?;
    scheduler.start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutting down worker");
    scheduler.shutdown().await?;
    Ok(())
}
