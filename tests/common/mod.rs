//! Common test utilities and helpers

#![allow(dead_code)]

use cardbox_core::collections::row_id_for;
use cardbox_core::storage::memory::MemoryStore;
use cardbox_core::{
    CardBox, CardId, CardStore, CardboxConfig, CardboxService, Cardset, CollectionId, Factsheet,
    LibsqlStore, LocalQueue, ManualClock, StudyContext, StudyScheduler, TaskContext, Worker,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Fixed start time of every test clock
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
}

/// In-memory store, manual clock and local queue wired together
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub queue: Arc<LocalQueue>,
    pub ctx: TaskContext,
    pub worker: Worker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CardboxConfig::default())
    }

    pub fn with_config(config: CardboxConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let queue = Arc::new(LocalQueue::new(clock.clone()));
        let ctx = TaskContext::new(store.clone(), queue.clone(), clock.clone(), config);
        let worker = Worker::new(ctx.clone(), queue.clone());
        Self {
            store,
            clock,
            queue,
            ctx,
            worker,
        }
    }

    /// Service with a deterministic scheduler
    pub fn service(&self) -> CardboxService {
        let scheduler = StudyScheduler::with_seed(
            self.store.clone(),
            self.clock.clone(),
            self.ctx.config.study.clone(),
            42,
        );
        CardboxService::with_scheduler(self.ctx.clone(), scheduler)
    }

    pub async fn drain(&self) -> usize {
        self.worker
            .run_until_idle()
            .await
            .expect("Worker failed")
            .tasks_run
    }
}

/// Store a factsheet with one row per first cell
pub async fn seed_factsheet(store: &dyn CardStore, name: &str, rows: &[&str]) -> Factsheet {
    let factsheet = Factsheet::from_rows(
        name,
        vec!["front".to_string(), "back".to_string()],
        rows.iter()
            .map(|row| vec![row.to_string(), format!("back of {}", row)])
            .collect(),
        t0(),
    )
    .expect("Failed to build factsheet");
    store
        .put_factsheet(&factsheet)
        .await
        .expect("Failed to store factsheet");
    factsheet
}

/// Store a cardset over `factsheet`
pub async fn seed_cardset(store: &dyn CardStore, id: i64, factsheet: &str) -> Cardset {
    let cardset = Cardset::new(
        CollectionId(id),
        &format!("Vocabulary set {}", id),
        "ann",
        factsheet,
    )
    .expect("Invalid cardset");
    store
        .put_cardset(&cardset)
        .await
        .expect("Failed to store cardset");
    cardset
}

/// Store a box owned by "ann"
pub async fn seed_box(store: &dyn CardStore) -> CardBox {
    let card_box = CardBox::new("ann", "Test box");
    store.put_box(&card_box).await.expect("Failed to store box");
    card_box
}

pub fn card_id(collection: i64, first_cell: &str) -> CardId {
    CardId {
        collection: CollectionId(collection),
        row: row_id_for(first_cell),
    }
}

pub fn study(card_box: &CardBox) -> StudyContext {
    StudyContext::new(card_box.owner.clone(), card_box.id.clone())
}

/// Create a libSQL store on a fresh temporary file
pub async fn create_test_store() -> (LibsqlStore, tempfile::TempDir) {
    // libSQL's :memory: mode gives every connection its own database,
    // so tests use a file that outlives single connections
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cardbox_test.db");
    let store = LibsqlStore::open(&path.to_string_lossy(), true)
        .await
        .expect("Failed to create test storage");
    (store, dir)
}
