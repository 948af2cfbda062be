//! Cardset commands

use cardbox_core::{error::Result, CardboxConfig};

use super::helpers::Runtime;
use crate::CardsetCommands;

pub async fn handle(
    db_path: &str,
    config: CardboxConfig,
    user: &str,
    action: CardsetCommands,
) -> Result<()> {
    let runtime = Runtime::open(db_path, config).await?;

    match action {
        CardsetCommands::Create {
            title,
            factsheet,
            template,
        } => {
            let cardset = runtime
                .service
                .create_cardset(user, &title, &factsheet, template.as_deref())
                .await?;
            println!(
                " Created cardset {} '{}' over '{}' (template {})",
                cardset.id, cardset.title, cardset.factsheet, cardset.template_name
            );
        }
    }
    Ok(())
}
