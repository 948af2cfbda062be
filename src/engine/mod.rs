//! Batch cursor engine
//!
//! Walks the cards of one box in a deterministic order, a batch per
//! invocation, under a wall-clock budget. Progress lives in the task
//! payload: the checkpoint of the last processed card and the mapper's own
//! state. When the budget runs out, or a full batch was processed, the walk
//! re-defers itself from the checkpoint.

mod writes;

pub use writes::PendingWrites;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CardboxConfig;
use crate::error::Result;
use crate::reconcile::CardCleaner;
use crate::stats::StatsAccumulator;
use crate::storage::{CardFilter, CardOrder, CardQuery, Checkpoint};
use crate::tasks::{DeferOptions, Task, TaskContext};
use crate::types::{BoxId, Card, CardId};

/// Writes requested by a mapper for one card
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapOutput {
    pub updates: Vec<Card>,
    pub deletes: Vec<CardId>,
}

impl MapOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn update(card: Card) -> Self {
        Self {
            updates: vec![card],
            deletes: Vec::new(),
        }
    }

    pub fn delete(id: CardId) -> Self {
        Self {
            updates: Vec::new(),
            deletes: vec![id],
        }
    }
}

/// Per-card logic of a batch walk
///
/// `map` may run more than once for the same card when an invocation is
/// retried, so it must be idempotent.
#[async_trait]
pub trait CardMapper: Send + Sync {
    fn name(&self) -> &'static str;

    fn box_id(&self) -> &BoxId;

    fn filter(&self) -> CardFilter {
        CardFilter::default()
    }

    fn order(&self) -> CardOrder {
        CardOrder::Identity
    }

    /// Queue the walk is deferred on
    fn queue<'a>(&self, config: &'a CardboxConfig) -> &'a str;

    /// Called at the start of every invocation
    async fn prepare(&mut self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn map(&mut self, card: &Card, now: DateTime<Utc>) -> MapOutput;

    /// Called once, after the last batch has been flushed
    async fn finish(&mut self, ctx: &TaskContext) -> Result<()>;
}

/// The mappers a walk can run; state is serialized with the task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mapper {
    Reconcile(CardCleaner),
    Stats(StatsAccumulator),
}

impl Mapper {
    pub fn name(&self) -> &'static str {
        self.as_mapper().name()
    }

    fn as_mapper(&self) -> &dyn CardMapper {
        match self {
            Mapper::Reconcile(cleaner) => cleaner,
            Mapper::Stats(stats) => stats,
        }
    }

    fn as_mapper_mut(&mut self) -> &mut dyn CardMapper {
        match self {
            Mapper::Reconcile(cleaner) => cleaner,
            Mapper::Stats(stats) => stats,
        }
    }
}

/// Payload of one invocation of a walk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    pub mapper: Mapper,
    /// Last processed card; `None` before the first batch
    pub checkpoint: Option<Checkpoint>,
    pub batch_size: usize,
    /// Deferred once this walk finishes
    pub next_stage: Option<Box<Task>>,
}

impl BatchTask {
    pub fn new(mapper: Mapper, batch_size: usize) -> Self {
        Self {
            mapper,
            checkpoint: None,
            batch_size: batch_size.max(1),
            next_stage: None,
        }
    }

    pub fn then(mut self, next: Task) -> Self {
        self.next_stage = Some(Box::new(next));
        self
    }
}

/// What an invocation did with the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// A full batch was processed; the walk continues in a new invocation
    Requeued { processed: usize },
    /// The time budget ran out mid-batch; the walk continues from the checkpoint
    Interrupted { processed: usize },
    /// The walk is complete and `finish` has run
    Finished { processed: usize },
}

/// Wall-clock budget of one invocation
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: DateTime<Utc>,
}

impl Deadline {
    pub fn new(start: DateTime<Utc>, budget: Duration) -> Self {
        let budget =
            chrono::Duration::from_std(budget).unwrap_or_else(|_| chrono::Duration::days(1));
        Self {
            at: start.checked_add_signed(budget).unwrap_or(start),
        }
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.at
    }
}

/// Start a walk with the configured batch size
pub async fn run(ctx: &TaskContext, mapper: Mapper) -> Result<()> {
    let task = BatchTask::new(mapper, ctx.config.engine.batch_size);
    defer(ctx, task, Duration::ZERO).await
}

/// Defer an invocation of `task` on its mapper's queue
pub async fn defer(ctx: &TaskContext, task: BatchTask, countdown: Duration) -> Result<()> {
    let queue = task.mapper.as_mapper().queue(&ctx.config).to_string();
    ctx.defer(
        Task::Batch(task),
        DeferOptions::queue(queue).countdown(countdown),
    )
    .await
}

/// Run one invocation of a walk
pub async fn continue_batch(ctx: &TaskContext, mut task: BatchTask) -> Result<BatchOutcome> {
    let deadline = Deadline::new(ctx.clock.now(), ctx.config.engine.time_budget);
    let mapper = task.mapper.as_mapper_mut();
    mapper.prepare(ctx).await?;

    let box_id = mapper.box_id().clone();
    let order = mapper.order();
    let query = CardQuery::new(box_id.clone(), task.batch_size)
        .filter(mapper.filter())
        .order(order)
        .after(task.checkpoint.clone());
    let cards = ctx.store.query_cards(&query).await?;

    let mut writes = PendingWrites::default();
    let mut processed = 0;
    for card in &cards {
        let now = ctx.clock.now();
        if processed > 0 && deadline.expired(now) {
            writes.flush(ctx.store.as_ref(), &box_id).await?;
            info!(
                "{} on box {} out of time after {} cards, resuming from {}",
                mapper.name(),
                box_id,
                processed,
                card_key(&task.checkpoint)
            );
            defer(ctx, task, Duration::ZERO).await?;
            return Ok(BatchOutcome::Interrupted { processed });
        }

        writes.add(mapper.map(card, now));
        task.checkpoint = Some(Checkpoint::of(card, order));
        processed += 1;
    }

    let (updated, deleted) = writes.flush(ctx.store.as_ref(), &box_id).await?;
    debug!(
        "{} on box {}: {} cards, {} updated, {} deleted",
        mapper.name(),
        box_id,
        processed,
        updated,
        deleted
    );

    if cards.len() >= task.batch_size {
        defer(ctx, task, Duration::ZERO).await?;
        return Ok(BatchOutcome::Requeued { processed });
    }

    mapper.finish(ctx).await?;
    if let Some(next) = task.next_stage.take() {
        debug!("{} on box {} chaining {}", mapper.name(), box_id, next.name());
        let queue = match next.as_ref() {
            Task::Batch(batch) => batch.mapper.as_mapper().queue(&ctx.config).to_string(),
            Task::CreateCards(_) => ctx.config.reconcile.queue.clone(),
        };
        ctx.defer(*next, DeferOptions::queue(queue)).await?;
    }
    Ok(BatchOutcome::Finished { processed })
}

fn card_key(checkpoint: &Option<Checkpoint>) -> &str {
    checkpoint.as_ref().map_or("start", |cp| cp.key.as_str())
}
