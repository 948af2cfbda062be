//! Cardbox - spaced-repetition flashcard boxes
//!
//! Cards are drawn from shared source lists (factsheets) and scheduled for
//! review per user box. The crate provides:
//! - A resumable batch engine that walks large card sets under a time budget
//! - A membership reconciler that keeps each box's cards in line with its
//!   subscriptions
//! - A study scheduler with a bounded active pool and pluggable reschedule
//!   policies
//! - Daily statistics snapshots with backfill
//!
//! # Architecture
//!
//! - **Types**: Core data structures (Card, CardBox, DailyStatsSnapshot)
//! - **Storage**: `CardStore` backends (libSQL, in-memory)
//! - **Tasks**: Deferred task payloads, a local queue and its worker
//! - **Service**: Owner-checked entry points for callers
//!
//! # Example
//!
//! ```ignore
//! use cardbox_core::{CardboxService, StudyContext};
//!
//! let service = CardboxService::new(ctx);
//! let study = StudyContext::new("ann", box_id);
//! if let Some(card) = service.next_card(&study).await? {
//!     service.answer(&study, &card.id, true).await?;
//! }
//! ```

pub mod clock;
pub mod collections;
pub mod config;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod service;
pub mod stats;
pub mod storage;
pub mod study;
pub mod tasks;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use collections::{Cardset, Factsheet, PageKind, ParsedPage};
pub use config::CardboxConfig;
pub use error::{CardboxError, Result};
pub use service::{CardboxService, StudyContext};
pub use storage::{libsql::LibsqlStore, memory::MemoryStore, CardStore};
pub use study::{ReschedulePolicy, SchedulePolicy, StudyScheduler};
pub use tasks::{LocalQueue, Task, TaskContext, TaskDispatcher, Worker};
pub use types::{
    BoxId, BoxStats, Card, CardBox, CardId, CollectionId, DailyStatsSnapshot, RowId,
};
