//! Database initialization command

use cardbox_core::{error::Result, LibsqlStore};
use tracing::debug;

/// Handle database initialization command
pub async fn handle(db_path: &str) -> Result<()> {
    debug!("Initializing database at {}", db_path);

    // Creates the file and its directory when missing, then migrates
    let _store = LibsqlStore::open(db_path, true).await?;

    println!(" Database initialized: {}", db_path);
    Ok(())
}
