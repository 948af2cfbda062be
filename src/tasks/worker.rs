// Task Worker
//
// Executes deferred tasks from a LocalQueue, retrying failures with a delay
// and dropping a task after too many attempts.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;

use super::{LocalQueue, QueuedTask, TaskContext};
use crate::config::WorkerConfig;
use crate::error::{CardboxError, Result};

/// Report generated after draining a queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Tasks that completed
    pub tasks_run: usize,

    /// Failed executions (each retried or dropped)
    pub failures: usize,

    /// Tasks dropped after exhausting their attempts
    pub dropped: usize,

    /// Wall time spent
    #[serde(with = "serde_duration_millis")]
    pub duration: Duration,
}

// Custom serde module for Duration (serialize/deserialize as milliseconds)
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

enum Outcome {
    Done,
    Retried,
    Dropped,
}

/// Background task worker
pub struct Worker {
    ctx: TaskContext,
    queue: Arc<LocalQueue>,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(ctx: TaskContext, queue: Arc<LocalQueue>) -> Self {
        let config = ctx.config.worker.clone();
        Self {
            ctx,
            queue,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Execute every queued task, including tasks deferred along the way,
    /// in eta order without waiting for etas
    pub async fn run_until_idle(&self) -> Result<WorkerReport> {
        let started = Instant::now();
        let mut report = WorkerReport::default();

        while let Some(task) = self.queue.pop_next().await {
            tally(&mut report, execute(&self.ctx, &self.queue, &self.config, task).await);
        }

        report.duration = started.elapsed();
        tracing::info!(
            "Worker drained queue: {} tasks run, {} failures, {} dropped in {:?}",
            report.tasks_run,
            report.failures,
            report.dropped,
            report.duration
        );
        Ok(report)
    }

    /// Poll for due tasks and execute up to `concurrency` at once until stopped
    pub async fn run(&self) -> Result<WorkerReport> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CardboxError::InvalidOperation(
                "Worker is already running".to_string(),
            ));
        }

        tracing::info!(
            "Starting task worker (concurrency {})",
            self.config.concurrency
        );
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let report = Arc::new(Mutex::new(WorkerReport::default()));

        while self.running.load(Ordering::SeqCst) {
            let Some(task) = self.queue.pop_due(self.ctx.clock.now()).await else {
                sleep(self.config.poll_interval).await;
                continue;
            };

            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CardboxError::Other(format!("Worker semaphore closed: {}", e)))?;
            let ctx = self.ctx.clone();
            let queue = self.queue.clone();
            let config = self.config.clone();
            let report = report.clone();

            tokio::spawn(async move {
                let outcome = execute(&ctx, &queue, &config, task).await;
                tally(&mut *report.lock().await, outcome);
                drop(permit);
            });
        }

        // Wait for in-flight tasks
        let _all = permits
            .acquire_many(self.config.concurrency as u32)
            .await
            .map_err(|e| CardboxError::Other(format!("Worker semaphore closed: {}", e)))?;

        let mut report = report.lock().await.clone();
        report.duration = started.elapsed();
        tracing::info!(
            "Stopping task worker: {} tasks run, {} failures, {} dropped",
            report.tasks_run,
            report.failures,
            report.dropped
        );
        Ok(report)
    }

    /// Stop the worker after in-flight tasks complete
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn tally(report: &mut WorkerReport, outcome: Outcome) {
    match outcome {
        Outcome::Done => report.tasks_run += 1,
        Outcome::Retried => report.failures += 1,
        Outcome::Dropped => {
            report.failures += 1;
            report.dropped += 1;
        }
    }
}

async fn execute(
    ctx: &TaskContext,
    queue: &LocalQueue,
    config: &WorkerConfig,
    queued: QueuedTask,
) -> Outcome {
    let result = match queued.decode() {
        Ok(task) => {
            let name = task.name();
            tracing::debug!("Running {} task {} from queue {}", name, queued.id, queued.queue);
            task.execute(ctx).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Outcome::Done,
        Err(e) if queued.attempts + 1 < config.max_attempts => {
            tracing::warn!(
                "Task {} failed (attempt {}/{}): {}",
                queued.id,
                queued.attempts + 1,
                config.max_attempts,
                e
            );
            queue.retry(queued, config.retry_delay).await;
            Outcome::Retried
        }
        Err(e) => {
            tracing::error!(
                "Task {} failed {} times, dropping it: {}",
                queued.id,
                config.max_attempts,
                e
            );
            Outcome::Dropped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::CardboxConfig;
    use crate::storage::memory::MemoryStore;

    fn worker(max_attempts: u32) -> (Worker, Arc<LocalQueue>) {
        let clock = Arc::new(SystemClock);
        let queue = Arc::new(LocalQueue::new(clock.clone()));
        let mut config = CardboxConfig::default();
        config.worker.max_attempts = max_attempts;
        config.worker.retry_delay = Duration::ZERO;
        let ctx = TaskContext::new(Arc::new(MemoryStore::new()), queue.clone(), clock, config);
        (Worker::new(ctx, queue.clone()), queue)
    }

    fn garbage(id: u128) -> QueuedTask {
        QueuedTask {
            id: uuid::Uuid::from_u128(id),
            queue: "reconcile".to_string(),
            eta: chrono::Utc::now(),
            attempts: 0,
            payload: "{\"type\":\"unknown\"}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_undecodable_task_is_retried_then_dropped() {
        let (worker, queue) = worker(3);
        queue.retry(garbage(1), Duration::ZERO).await;

        let report = worker.run_until_idle().await.unwrap();
        assert_eq!(report.tasks_run, 0);
        // Queued with one attempt already, so two more failures drop it
        assert_eq!(report.failures, 2);
        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_stops_when_asked() {
        let (worker, _queue) = worker(1);
        let worker = Arc::new(worker);
        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(worker.run().await.is_err());
        worker.stop();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.tasks_run, 0);
    }
}
