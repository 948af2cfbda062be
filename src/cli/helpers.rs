//! Shared helper functions for CLI commands
//!
//! Database path resolution and wiring of the store, task queue and
//! service used by every command.

use cardbox_core::{
    error::Result, BoxId, CardStore, CardboxConfig, CardboxService, Clock, LibsqlStore,
    LocalQueue, StudyContext, SystemClock, TaskContext, Worker,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Get the default database path using XDG_DATA_HOME standard
pub fn get_default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cardbox")
        .join("cardbox.db")
}

/// Get the database path from the CLI (or CARDBOX_DB_PATH), else the default
pub fn get_db_path(cli_path: Option<String>) -> String {
    cli_path
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| get_default_db_path().to_string_lossy().to_string())
}

/// Service and worker sharing one store and one in-process queue
pub struct Runtime {
    pub service: CardboxService,
    pub worker: Worker,
}

impl Runtime {
    /// Open an existing database
    pub async fn open(db_path: &str, config: CardboxConfig) -> Result<Self> {
        debug!("Opening database at {}", db_path);
        let store: Arc<dyn CardStore> = Arc::new(LibsqlStore::open_existing(db_path).await?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let queue = Arc::new(LocalQueue::new(clock.clone()));

        let ctx = TaskContext::new(store, queue.clone(), clock, config);
        let worker = Worker::new(ctx.clone(), queue);
        Ok(Self {
            service: CardboxService::new(ctx),
            worker,
        })
    }

    /// Run every task deferred by the command before exiting
    pub async fn drain(&self) -> Result<()> {
        let report = self.worker.run_until_idle().await?;
        if report.tasks_run > 0 {
            debug!("Ran {} background tasks", report.tasks_run);
        }
        if report.dropped > 0 {
            println!(" {} background tasks failed, see the log", report.dropped);
        }
        Ok(())
    }
}

pub fn study_context(user: &str, box_id: &str) -> StudyContext {
    StudyContext::new(user, BoxId::from(box_id))
}
