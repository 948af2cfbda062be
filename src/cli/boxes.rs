//! Box commands

use cardbox_core::{error::Result, CardboxConfig, CollectionId, SchedulePolicy};

use super::helpers::{study_context, Runtime};
use crate::BoxCommands;

pub async fn handle(
    db_path: &str,
    config: CardboxConfig,
    user: &str,
    action: BoxCommands,
) -> Result<()> {
    let runtime = Runtime::open(db_path, config).await?;

    match action {
        BoxCommands::Create { title, policy } => {
            let policy = policy
                .as_deref()
                .map(SchedulePolicy::from_name)
                .transpose()?;
            let card_box = runtime.service.create_box(user, &title, policy).await?;
            println!(" Created box '{}'", card_box.title);
            println!("  Id:     {}", card_box.id);
            println!("  Policy: {}", card_box.schedule_policy);
        }
        BoxCommands::Subscribe { box_id, cardsets } => {
            let study = study_context(user, &box_id);
            let cardsets: Vec<CollectionId> = cardsets.into_iter().map(CollectionId).collect();
            runtime.service.update_membership(&study, &cardsets).await?;
            runtime.drain().await?;

            let stats = runtime.service.stats(&study).await?;
            println!(
                " Box {} subscribes to {} cardsets ({} cards)",
                box_id,
                cardsets.len(),
                stats.card_count
            );
        }
        BoxCommands::Show { box_id } => {
            let study = study_context(user, &box_id);
            let card_box = runtime.service.authorize(&study).await?;
            let stats = runtime.service.stats(&study).await?;
            let intervals = runtime.service.interval_distribution(&study).await?;

            println!("{} ({})", card_box.title, card_box.id);
            println!("  Policy:       {}", card_box.schedule_policy);
            println!(
                "  Cardsets:     {}",
                card_box
                    .cardsets
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!(
                "  Learned:      {}/{} ({:.1}%)",
                stats.learned_count, stats.card_count, stats.percent_learned
            );
            println!(
                "  Time studied: {} min",
                card_box.time_studied.as_secs() / 60
            );
            if runtime.service.is_empty(&study).await? {
                println!("  No cards yet. Subscribe to a cardset to add some.");
            } else {
                let buckets: Vec<String> = intervals.iter().map(|n| n.to_string()).collect();
                println!("  Intervals:    [{}]", buckets.join(" "));
            }
        }
    }
    Ok(())
}
