//! Learning statistics
//!
//! Live counts come straight from the store. Daily snapshots are produced by
//! a batch walk over the enabled cards of a box that replays each card's
//! history up to the start of the day, so a snapshot for a past day can be
//! computed at any time and yields the same numbers.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::CardboxConfig;
use crate::engine::{self, CardMapper, MapOutput, Mapper};
use crate::error::Result;
use crate::reconcile::desired_card_ids;
use crate::storage::{CardFilter, CardStore};
use crate::tasks::{DeferOptions, Task, TaskContext};
use crate::types::{BoxId, BoxStats, Card, CardBox, DailyStatsSnapshot, NUM_INTERVALS};

/// Mapper accumulating one day's snapshot of a box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsAccumulator {
    pub box_id: BoxId,
    pub day: NaiveDate,
    pub card_count: u32,
    pub studied_count: u32,
    pub learned_count: u32,
    pub interval_sum: u64,
    pub min_interval: Option<u8>,
    pub max_interval: Option<u8>,
    pub intervals: [u32; NUM_INTERVALS],
}

impl StatsAccumulator {
    pub fn new(box_id: BoxId, day: NaiveDate) -> Self {
        Self {
            box_id,
            day,
            card_count: 0,
            studied_count: 0,
            learned_count: 0,
            interval_sum: 0,
            min_interval: None,
            max_interval: None,
            intervals: [0; NUM_INTERVALS],
        }
    }

    /// Snapshot of what has been accumulated so far
    pub fn snapshot(&self) -> DailyStatsSnapshot {
        let avg_interval = if self.card_count > 0 {
            self.interval_sum as f64 / f64::from(self.card_count)
        } else {
            1.0
        };
        DailyStatsSnapshot {
            box_id: self.box_id.clone(),
            day: self.day,
            card_count: self.card_count,
            studied_count: self.studied_count,
            learned_count: self.learned_count,
            avg_interval,
            min_interval: self.min_interval.unwrap_or(1),
            max_interval: self.max_interval.unwrap_or(1),
            intervals: self.intervals,
        }
    }
}

#[async_trait]
impl CardMapper for StatsAccumulator {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn box_id(&self) -> &BoxId {
        &self.box_id
    }

    fn filter(&self) -> CardFilter {
        CardFilter::enabled()
    }

    fn queue<'a>(&self, config: &'a CardboxConfig) -> &'a str {
        &config.stats.queue
    }

    fn map(&mut self, card: &Card, _now: DateTime<Utc>) -> MapOutput {
        let state = card.state_at(self.day);
        let interval = state.interval.clamp(1, NUM_INTERVALS as u8);

        self.card_count += 1;
        self.studied_count += u32::from(state.studied);
        self.learned_count += u32::from(state.learned);
        self.interval_sum += u64::from(interval);
        self.intervals[usize::from(interval) - 1] += 1;
        self.min_interval = Some(self.min_interval.map_or(interval, |m| m.min(interval)));
        self.max_interval = Some(self.max_interval.map_or(interval, |m| m.max(interval)));

        MapOutput::none()
    }

    async fn finish(&mut self, ctx: &TaskContext) -> Result<()> {
        let snapshot = self.snapshot();
        if ctx.store.put_snapshot(&snapshot).await? {
            info!(
                "Stored stats for box {} on {}: {} cards, {} learned",
                self.box_id, self.day, snapshot.card_count, snapshot.learned_count
            );
        } else {
            debug!(
                "Stats for box {} on {} already exist, keeping them",
                self.box_id, self.day
            );
        }
        Ok(())
    }
}

/// Start the snapshot walk of `box_id` for `day`
pub async fn create_snapshot(ctx: &TaskContext, box_id: &BoxId, day: NaiveDate) -> Result<()> {
    engine::run(ctx, Mapper::Stats(StatsAccumulator::new(box_id.clone(), day))).await
}

/// Defer one snapshot walk per day from today back `days_back - 1` days,
/// staggered on the stats queue
pub async fn schedule_backfill(ctx: &TaskContext, box_id: &BoxId, days_back: u32) -> Result<()> {
    let today = ctx.clock.now().date_naive();
    info!("Scheduling {} days of stats for box {}", days_back, box_id);

    for offset in 0..days_back {
        let day = today - Duration::days(i64::from(offset));
        let task = engine::BatchTask::new(
            Mapper::Stats(StatsAccumulator::new(box_id.clone(), day)),
            ctx.config.engine.batch_size,
        );
        ctx.defer(
            Task::Batch(task),
            DeferOptions::queue(ctx.config.stats.queue.clone())
                .countdown(ctx.config.stats.stagger * offset),
        )
        .await?;
    }
    Ok(())
}

/// Live learning summary of a box
pub async fn box_stats(
    store: &dyn CardStore,
    clock: &dyn Clock,
    card_box: &CardBox,
) -> Result<BoxStats> {
    let card_count = desired_card_ids(store, card_box).await?.len();
    let learned = CardFilter {
        enabled: Some(true),
        learned_after: Some(clock.now()),
        ..Default::default()
    };
    let learned_count = store
        .count_cards(&card_box.id, &learned, Some(card_count))
        .await?;

    let percent_learned = if card_count > 0 {
        learned_count as f64 / card_count as f64 * 100.0
    } else {
        0.0
    };
    Ok(BoxStats {
        percent_learned,
        learned_count,
        card_count,
    })
}

/// Whether a box has no card records at all
pub async fn is_empty(store: &dyn CardStore, box_id: &BoxId) -> Result<bool> {
    let count = store
        .count_cards(box_id, &CardFilter::default(), Some(1))
        .await?;
    Ok(count == 0)
}

/// Stored snapshots, oldest first, scheduling a backfill when none is recent
pub async fn recent_snapshots(ctx: &TaskContext, box_id: &BoxId) -> Result<Vec<DailyStatsSnapshot>> {
    let today = ctx.clock.now().date_naive();
    let recent = today - Duration::days(i64::from(ctx.config.stats.recent_days));
    let has_recent = !ctx.store.list_snapshots(box_id, Some(recent), 1).await?.is_empty();
    if !has_recent {
        schedule_backfill(ctx, box_id, ctx.config.stats.backfill_days).await?;
    }

    ctx.store
        .list_snapshots(box_id, None, ctx.config.stats.history_limit)
        .await
}

/// Interval histogram of the latest snapshot, or every card in the first
/// bucket when the box has none yet
pub async fn interval_distribution(
    store: &dyn CardStore,
    clock: &dyn Clock,
    card_box: &CardBox,
) -> Result<[u32; NUM_INTERVALS]> {
    if let Some(latest) = store.latest_snapshot(&card_box.id).await? {
        return Ok(latest.intervals);
    }
    let stats = box_stats(store, clock, card_box).await?;
    let mut intervals = [0; NUM_INTERVALS];
    intervals[0] = stats.card_count as u32;
    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{start_of_day, CardId, CollectionId, HistoryEntry};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn card_with(row: &str, entries: &[(i64, u8, i64)]) -> Card {
        let midnight = start_of_day(day());
        let mut card = Card::new(CardId::new(CollectionId(1), row), midnight);
        for &(at_hours, interval, until_hours) in entries {
            card.history.push(HistoryEntry {
                at: midnight + Duration::hours(at_hours),
                correct_count: 0,
                wrong_count: 0,
                interval,
                learned_until: midnight + Duration::hours(until_hours),
            });
        }
        card
    }

    #[test]
    fn test_accumulates_replayed_state() {
        let mut stats = StatsAccumulator::new(BoxId::from("b"), day());
        let now = Utc::now();

        stats.map(&card_with("fresh", &[]), now);
        stats.map(&card_with("learned", &[(-30, 4, 48)]), now);
        stats.map(&card_with("lapsed", &[(-72, 2, -1)]), now);
        // Only the entry before midnight counts
        stats.map(&card_with("today", &[(-5, 3, 20), (5, 9, 500)]), now);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.card_count, 4);
        assert_eq!(snapshot.studied_count, 3);
        assert_eq!(snapshot.learned_count, 2);
        assert_eq!(snapshot.min_interval, 1);
        assert_eq!(snapshot.max_interval, 4);
        assert_eq!(snapshot.avg_interval, (1 + 4 + 2 + 3) as f64 / 4.0);
        assert_eq!(snapshot.intervals[0], 1);
        assert_eq!(snapshot.intervals[3], 1);
        assert_eq!(snapshot.intervals.iter().sum::<u32>(), 4);
    }

    #[test]
    fn test_empty_snapshot_defaults() {
        let snapshot = StatsAccumulator::new(BoxId::from("b"), day()).snapshot();
        assert_eq!(snapshot.card_count, 0);
        assert_eq!(snapshot.avg_interval, 1.0);
        assert_eq!((snapshot.min_interval, snapshot.max_interval), (1, 1));
    }
}
