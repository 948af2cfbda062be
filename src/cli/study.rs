//! Study commands

use cardbox_core::{error::Result, CardId, CardboxConfig, CardboxError};

use super::helpers::{study_context, Runtime};
use crate::StudyCommands;

pub async fn handle(
    db_path: &str,
    config: CardboxConfig,
    user: &str,
    action: StudyCommands,
) -> Result<()> {
    let runtime = Runtime::open(db_path, config).await?;

    match action {
        StudyCommands::Next { box_id } => {
            let study = study_context(user, &box_id);
            let Some(card) = runtime.service.next_card(&study).await? else {
                println!(" No cards due");
                return Ok(());
            };

            println!("{}", card.id);
            println!("  Interval:    {}", card.interval);
            println!(
                "  Answers:     {} correct, {} wrong",
                card.correct_count, card.wrong_count
            );
            if let Some(row) = runtime.service.card_row(&card.id).await? {
                for (column, value) in row {
                    println!("  {:<12} {}", format!("{}:", column), value);
                }
            }
        }
        StudyCommands::Answer {
            box_id,
            card,
            wrong,
        } => {
            let study = study_context(user, &box_id);
            let card_id: CardId = card
                .parse()
                .map_err(|_| CardboxError::InvalidCardId(card.clone()))?;
            let answered = runtime.service.answer(&study, &card_id, !wrong).await?;

            println!(
                " {} answered {}: interval {}, due {}",
                answered.id,
                if wrong { "wrong" } else { "correct" },
                answered.interval,
                answered.learned_until.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}
