//! Deferred tasks
//!
//! Every unit of background work is a [`Task`] value. Tasks are serialized
//! to JSON when deferred, so an invocation only ever sees its own payload
//! and whatever is in storage.

pub mod queue;
pub mod worker;

pub use queue::{LocalQueue, QueuedTask};
pub use worker::{Worker, WorkerReport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::CardboxConfig;
use crate::engine::{self, BatchTask};
use crate::error::Result;
use crate::reconcile::CreateCardsTask;
use crate::storage::CardStore;

/// A unit of deferred work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// One invocation of a batch walk
    Batch(BatchTask),
    /// Materialize missing cards of a box
    CreateCards(CreateCardsTask),
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Batch(batch) => batch.mapper.name(),
            Task::CreateCards(_) => "create_cards",
        }
    }

    /// Run this task once
    pub async fn execute(self, ctx: &TaskContext) -> Result<()> {
        match self {
            Task::Batch(batch) => engine::continue_batch(ctx, batch).await.map(|_| ()),
            Task::CreateCards(create) => create.execute(ctx).await,
        }
    }
}

/// Where and when a deferred task runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferOptions {
    pub queue: String,
    pub countdown: Duration,
}

impl DeferOptions {
    pub fn queue(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            countdown: Duration::ZERO,
        }
    }

    pub fn countdown(mut self, countdown: Duration) -> Self {
        self.countdown = countdown;
        self
    }
}

/// At-least-once delivery of deferred tasks
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn defer(&self, task: Task, options: DeferOptions) -> Result<()>;
}

/// Everything a task invocation may touch
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn CardStore>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub config: CardboxConfig,
}

impl TaskContext {
    pub fn new(
        store: Arc<dyn CardStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        clock: Arc<dyn Clock>,
        config: CardboxConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            config,
        }
    }

    pub async fn defer(&self, task: Task, options: DeferOptions) -> Result<()> {
        self.dispatcher.defer(task, options).await
    }
}
