//! Diagnostic entry point for the technician sync engine.
//!
//! Runs one sync cycle against the configured API and reports what the local
//! store holds afterwards. Useful for poking at a device database or a
//! staging API without the app shell.

use anyhow::{Context, Result};
use fieldserve_core::TechnicianId;
use fieldserve_mobile::{MobileConfig, MobileState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    fieldserve_observability::init();

    let config = MobileConfig::from_env()?;
    let technician: TechnicianId = std::env::var("FIELDSERVE_TECHNICIAN_ID")
        .context("FIELDSERVE_TECHNICIAN_ID must be set")?
        .parse()
        .context("FIELDSERVE_TECHNICIAN_ID is not a valid id")?;

    info!(api_url = %config.api_url, db_path = %config.db_path.display(), "starting sync cycle");

    let state = MobileState::new(config).await?;
    let summary = state.sync.sync_cycle(technician).await;

    if let Some(drain) = summary.drain {
        info!(
            attempted = drain.attempted,
            delivered = drain.delivered,
            rejected = drain.rejected,
            deferred = drain.deferred,
            "outbox drain"
        );
    }

    info!(
        jobs = summary.jobs.len(),
        refreshed = summary.refreshed,
        "sync cycle complete"
    );
    for job in &summary.jobs {
        info!(
            job_id = %job.id,
            scheduled_at = %job.scheduled_at,
            status = %job.status,
            client = %job.client_name,
            "cached job"
        );
    }

    let pending = state.store.pending_count().await?;
    let parked = state.store.failed_mutations().await?.len();
    info!(pending, parked, "outbox state");

    Ok(())
}
