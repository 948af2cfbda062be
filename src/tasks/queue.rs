//! In-process task queue
//!
//! Holds deferred tasks as JSON payloads with an eta. Delivery is
//! at-least-once: a task that fails is put back with a delay by the worker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{DeferOptions, Task, TaskDispatcher};
use crate::clock::Clock;
use crate::error::{CardboxError, Result};

/// A deferred task waiting for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: Uuid,
    pub queue: String,
    pub eta: DateTime<Utc>,
    /// Failed executions so far
    pub attempts: u32,
    pub payload: String,
}

impl QueuedTask {
    pub fn decode(&self) -> Result<Task> {
        serde_json::from_str(&self.payload)
            .map_err(|e| CardboxError::Task(format!("Cannot decode task {}: {}", self.id, e)))
    }
}

pub struct LocalQueue {
    clock: Arc<dyn Clock>,
    tasks: Mutex<Vec<QueuedTask>>,
}

impl LocalQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Pending tasks, earliest eta first
    pub async fn pending(&self) -> Vec<QueuedTask> {
        let mut tasks = self.tasks.lock().await.clone();
        tasks.sort_by_key(|t| t.eta);
        tasks
    }

    /// Take the earliest task whose eta has passed
    pub async fn pop_due(&self, now: DateTime<Utc>) -> Option<QueuedTask> {
        let mut tasks = self.tasks.lock().await;
        let index = earliest(&tasks).filter(|&i| tasks[i].eta <= now)?;
        Some(tasks.remove(index))
    }

    /// Take the earliest task regardless of its eta
    pub async fn pop_next(&self) -> Option<QueuedTask> {
        let mut tasks = self.tasks.lock().await;
        let index = earliest(&tasks)?;
        Some(tasks.remove(index))
    }

    /// Put a failed task back, due after `delay`
    pub async fn retry(&self, mut task: QueuedTask, delay: Duration) {
        task.attempts += 1;
        task.eta = self.clock.now() + chrono_delay(delay);
        debug!(
            "Retrying task {} on queue {} (attempt {})",
            task.id, task.queue, task.attempts
        );
        self.tasks.lock().await.push(task);
    }
}

// Ties keep insertion order
fn earliest(tasks: &[QueuedTask]) -> Option<usize> {
    tasks
        .iter()
        .enumerate()
        .min_by_key(|(i, t)| (t.eta, *i))
        .map(|(i, _)| i)
}

fn chrono_delay(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(365))
}

#[async_trait]
impl TaskDispatcher for LocalQueue {
    async fn defer(&self, task: Task, options: DeferOptions) -> Result<()> {
        let queued = QueuedTask {
            id: Uuid::new_v4(),
            queue: options.queue,
            eta: self.clock.now() + chrono_delay(options.countdown),
            attempts: 0,
            payload: serde_json::to_string(&task)?,
        };
        debug!(
            "Deferred {} task {} on queue {} (eta {})",
            task.name(),
            queued.id,
            queued.queue,
            queued.eta
        );
        self.tasks.lock().await.push(queued);
        Ok(())
    }
}
