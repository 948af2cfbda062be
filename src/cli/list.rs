//! Factsheet commands

use cardbox_core::{error::Result, CardboxConfig};
use tracing::debug;

use super::helpers::Runtime;
use crate::ListCommands;

pub async fn handle(db_path: &str, config: CardboxConfig, action: ListCommands) -> Result<()> {
    let runtime = Runtime::open(db_path, config).await?;

    match action {
        ListCommands::Import { title, file } => {
            debug!("Importing {} as '{}'", file.display(), title);
            let content = std::fs::read_to_string(&file)?;
            let factsheet = runtime.service.import_factsheet(&title, &content).await?;

            println!(" Imported list '{}'", factsheet.name);
            println!("  Columns: {}", factsheet.columns().join(", "));
            println!("  Rows:    {}", factsheet.len());
        }
    }
    Ok(())
}
