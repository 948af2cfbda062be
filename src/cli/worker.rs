//! Worker command

use cardbox_core::{error::Result, CardboxConfig};
use std::sync::Arc;
use tracing::{info, warn};

use super::helpers::{study_context, Runtime};

/// Resync `box_id`, schedule its statistics and run tasks until Ctrl-C
pub async fn handle(
    db_path: &str,
    config: CardboxConfig,
    user: &str,
    box_id: &str,
    days: u32,
) -> Result<()> {
    let runtime = Arc::new(Runtime::open(db_path, config).await?);
    let study = study_context(user, box_id);

    let desired = runtime.service.resync(&study).await?;
    runtime.service.backfill_stats(&study, days).await?;
    info!(
        "Box {} has {} desired cards; tasks scheduled",
        box_id,
        desired.len()
    );

    let stopper = runtime.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            return;
        }
        info!("Interrupted, finishing in-flight tasks");
        stopper.worker.stop();
    });

    println!(" Worker running for box {} (Ctrl-C to stop)", box_id);
    let report = runtime.worker.run().await?;
    println!(
        " Worker stopped: {} tasks run, {} failures",
        report.tasks_run, report.failures
    );
    Ok(())
}
