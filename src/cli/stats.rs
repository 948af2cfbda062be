//! Statistics commands

use cardbox_core::{error::Result, CardboxConfig};

use super::helpers::{study_context, Runtime};
use crate::StatsCommands;

pub async fn handle(
    db_path: &str,
    config: CardboxConfig,
    user: &str,
    box_id: &str,
    action: Option<StatsCommands>,
) -> Result<()> {
    let default_days = config.stats.backfill_days;
    let runtime = Runtime::open(db_path, config).await?;
    let study = study_context(user, box_id);

    match action {
        Some(StatsCommands::Backfill { days }) => {
            let days = days.unwrap_or(default_days);
            runtime.service.backfill_stats(&study, days).await?;
            runtime.drain().await?;
            println!(" Computed {} days of statistics for box {}", days, box_id);
        }
        None => {
            // The first call may schedule a backfill; run it and read again
            runtime.service.recent_snapshots(&study).await?;
            runtime.drain().await?;
            let snapshots = runtime.service.recent_snapshots(&study).await?;
            if snapshots.is_empty() {
                println!(" No statistics for box {}", box_id);
                return Ok(());
            }

            println!(
                "{:<12} {:>6} {:>8} {:>8} {:>8} {:>4} {:>4}",
                "Day", "Cards", "Studied", "Learned", "Avg", "Min", "Max"
            );
            for s in snapshots {
                println!(
                    "{:<12} {:>6} {:>8} {:>8} {:>8.2} {:>4} {:>4}",
                    s.day.format("%Y-%m-%d").to_string(),
                    s.card_count,
                    s.studied_count,
                    s.learned_count,
                    s.avg_interval,
                    s.min_interval,
                    s.max_interval
                );
            }
        }
    }
    Ok(())
}
