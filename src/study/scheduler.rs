//! Study scheduler
//!
//! Keeps a small active pool of cards per box and picks the next card from
//! its least recently studied half. The pool is refilled from due cards when
//! it drops below half its target size. When nothing is due the scheduler
//! still hands out one of the soonest-due cards, so a user with cards is
//! never left without one.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::policy::{ReschedulePolicy, SchedulePolicy};
use crate::clock::{truncate_micros, Clock};
use crate::config::StudyConfig;
use crate::error::{CardboxError, Result};
use crate::storage::{CardFilter, CardOrder, CardQuery, CardStore};
use crate::types::{BoxId, Card, CardId, HistoryEntry, NUM_INTERVALS};

pub struct StudyScheduler {
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
    config: StudyConfig,
    rng: Mutex<StdRng>,
}

impl StudyScheduler {
    pub fn new(store: Arc<dyn CardStore>, clock: Arc<dyn Clock>, config: StudyConfig) -> Self {
        Self::with_rng(store, clock, config, StdRng::from_entropy())
    }

    /// Deterministic selection, for tests and benchmarks
    pub fn with_seed(
        store: Arc<dyn CardStore>,
        clock: Arc<dyn Clock>,
        config: StudyConfig,
        seed: u64,
    ) -> Self {
        Self::with_rng(store, clock, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        store: Arc<dyn CardStore>,
        clock: Arc<dyn Clock>,
        config: StudyConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            rng: Mutex::new(rng),
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enabled cards currently in the active pool
    pub async fn active_pool(&self, box_id: &BoxId) -> Result<Vec<Card>> {
        let filter = CardFilter {
            enabled: Some(true),
            in_active_pool: Some(true),
            ..Default::default()
        };
        self.store
            .query_cards(&CardQuery::new(box_id.clone(), self.config.pool_size).filter(filter))
            .await
    }

    /// Pick the next card to present, or `None` when the box has no enabled cards
    pub async fn next_card(&self, box_id: &BoxId) -> Result<Option<Card>> {
        let now = truncate_micros(self.clock.now());
        let target = self.config.pool_size;
        let mut pool = self.active_pool(box_id).await?;

        if pool.len() < target / 2 {
            let added = self.refill(box_id, target - pool.len(), now).await?;
            debug!(
                "Refilled pool of box {} with {} cards ({} already in pool)",
                box_id,
                added.len(),
                pool.len()
            );
            pool.extend(added);
        }

        if pool.is_empty() {
            return self.soonest_due(box_id).await;
        }

        pool.sort_by(|a, b| CardOrder::LastStudied.compare(a, b));
        let window = pool.len() / 2 + 1;
        let mut card = {
            let mut rng = self.rng();
            match pool[..window].choose(&mut *rng) {
                Some(card) => card.clone(),
                None => return Ok(None),
            }
        };

        // Presenting a card never changes its interval
        card.last_studied = now;
        card.learned_until = card.learned_until.max(now);
        card.modified = now;
        self.store.put_cards(box_id, std::slice::from_ref(&card)).await?;

        debug!("Presenting card {} of box {}", card.id, box_id);
        Ok(Some(card))
    }

    /// Move up to `wanted` due, dormant cards into the pool
    async fn refill(&self, box_id: &BoxId, wanted: usize, now: DateTime<Utc>) -> Result<Vec<Card>> {
        let filter = CardFilter {
            enabled: Some(true),
            in_active_pool: Some(false),
            due_before: Some(now),
            ..Default::default()
        };
        let limit = self.config.pool_size * self.config.refill_factor;
        let candidates = self
            .store
            .query_cards(&CardQuery::new(box_id.clone(), limit).filter(filter))
            .await?;

        let added: Vec<Card> = {
            let mut rng = self.rng();
            candidates
                .choose_multiple(&mut *rng, wanted)
                .cloned()
                .map(|mut card| {
                    card.in_active_pool = true;
                    card.modified = now;
                    card
                })
                .collect()
        };

        self.store.put_cards(box_id, &added).await?;
        Ok(added)
    }

    /// Random pick among the soonest-due enabled cards; pool membership is untouched
    async fn soonest_due(&self, box_id: &BoxId) -> Result<Option<Card>> {
        let query = CardQuery::new(box_id.clone(), self.config.fallback_window)
            .filter(CardFilter::enabled())
            .order(CardOrder::LearnedUntil);
        let upcoming = self.store.query_cards(&query).await?;

        let mut rng = self.rng();
        let card = upcoming.choose(&mut *rng).cloned();
        if card.is_none() {
            debug!("No cards due in box {}", box_id);
        }
        Ok(card)
    }

    /// Record an answer and persist the card together with its box
    pub async fn answer(&self, box_id: &BoxId, card_id: &CardId, correct: bool) -> Result<Card> {
        let mut card_box = self
            .store
            .get_box(box_id)
            .await?
            .ok_or_else(|| CardboxError::BoxNotFound(box_id.to_string()))?;
        let mut card = self
            .store
            .get_card(box_id, card_id)
            .await?
            .ok_or_else(|| CardboxError::CardNotFound(format!("{} in box {}", card_id, box_id)))?;

        let now = truncate_micros(self.clock.now());
        let policy = SchedulePolicy::resolve(&card_box.schedule_policy);
        apply_answer(&mut card, correct, now, &policy);

        // A clock that went backwards counts as no study time
        let gap = (now - card_box.last_studied)
            .to_std()
            .unwrap_or(Duration::ZERO);
        card_box.time_studied += gap.min(self.config.idle_cap);
        card_box.last_studied = now;

        self.store.commit_answer(&card_box, &card).await?;

        info!(
            "Answered card {} of box {} ({}): interval {}, due {}",
            card.id,
            box_id,
            if correct { "correct" } else { "wrong" },
            card.interval,
            card.learned_until
        );
        Ok(card)
    }
}

/// Apply one answer to `card` at `now` and append it to the history
pub fn apply_answer(
    card: &mut Card,
    correct: bool,
    now: DateTime<Utc>,
    policy: &dyn ReschedulePolicy,
) {
    if correct {
        card.last_correct = now;
        card.correct_count += 1;
        card.interval = card.interval.saturating_add(1);
        card.in_active_pool = false;
    } else {
        card.wrong_count += 1;
        card.interval = card.interval.saturating_sub(1);
    }
    card.interval = card.interval.clamp(1, NUM_INTERVALS as u8);
    card.last_studied = now;
    card.learned_until = policy.reschedule(card);
    card.modified = now;

    card.history.push(HistoryEntry {
        at: now,
        correct_count: card.correct_count,
        wrong_count: card.wrong_count,
        interval: card.interval,
        learned_until: card.learned_until,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::memory::MemoryStore;
    use crate::types::{CardBox, CollectionId};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    async fn setup(n: usize) -> (Arc<MemoryStore>, Arc<ManualClock>, CardBox, StudyScheduler) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let card_box = CardBox::new("ann", "French");
        store.put_box(&card_box).await.unwrap();

        let cards: Vec<Card> = (0..n)
            .map(|i| Card::new(CardId::new(CollectionId(1), format!("row{:02}", i)), t0()))
            .collect();
        store.put_cards(&card_box.id, &cards).await.unwrap();

        let scheduler =
            StudyScheduler::with_seed(store.clone(), clock.clone(), StudyConfig::default(), 7);
        (store, clock, card_box, scheduler)
    }

    #[tokio::test]
    async fn test_next_card_fills_pool() {
        let (store, _clock, card_box, scheduler) = setup(5).await;

        let card = scheduler.next_card(&card_box.id).await.unwrap().unwrap();
        assert!(card.in_active_pool);
        assert_eq!(card.last_studied, t0());
        assert!(card.learned_until >= card.last_studied);

        let in_pool = store
            .all_cards(&card_box.id)
            .await
            .into_iter()
            .filter(|c| c.in_active_pool)
            .count();
        assert_eq!(in_pool, 5);
    }

    #[tokio::test]
    async fn test_presenting_pooled_card_updates_modified() {
        let (store, clock, card_box, scheduler) = setup(3).await;
        scheduler.next_card(&card_box.id).await.unwrap().unwrap();

        // Every card is pooled now, so only presentation writes
        clock.advance(ChronoDuration::hours(1));
        let card = scheduler.next_card(&card_box.id).await.unwrap().unwrap();
        let later = t0() + ChronoDuration::hours(1);
        assert_eq!(card.modified, later);

        let stored = store.get_card(&card_box.id, &card.id).await.unwrap().unwrap();
        assert_eq!(stored.modified, later);
        assert_eq!(stored.last_studied, later);
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_target() {
        let (store, clock, card_box, scheduler) = setup(40).await;

        for _ in 0..12 {
            let card = scheduler.next_card(&card_box.id).await.unwrap().unwrap();
            scheduler.answer(&card_box.id, &card.id, true).await.unwrap();
            clock.advance(ChronoDuration::seconds(10));
        }

        let in_pool = store
            .all_cards(&card_box.id)
            .await
            .into_iter()
            .filter(|c| c.in_active_pool)
            .count();
        assert!(in_pool <= StudyConfig::default().pool_size);
    }

    #[tokio::test]
    async fn test_empty_box_yields_none() {
        let (_store, _clock, card_box, scheduler) = setup(0).await;
        assert!(scheduler.next_card(&card_box.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nothing_due_falls_back_to_soonest() {
        let (store, _clock, card_box, scheduler) = setup(3).await;
        let mut cards = store.all_cards(&card_box.id).await;
        for (i, card) in cards.iter_mut().enumerate() {
            card.learned_until = t0() + ChronoDuration::days(i as i64 + 1);
        }
        store.put_cards(&card_box.id, &cards).await.unwrap();

        let card = scheduler.next_card(&card_box.id).await.unwrap().unwrap();
        assert!(!card.in_active_pool);
        let stored = store.get_card(&card_box.id, &card.id).await.unwrap().unwrap();
        assert!(!stored.in_active_pool);
    }

    #[tokio::test]
    async fn test_correct_answer_after_one_minute() {
        let (store, clock, card_box, scheduler) = setup(1).await;
        let id = CardId::new(CollectionId(1), "row00");
        let mut card = store.get_card(&card_box.id, &id).await.unwrap().unwrap();
        card.interval = 5;
        card.last_correct = t0();
        card.last_studied = t0();
        card.learned_until = t0();
        store.put_cards(&card_box.id, &[card]).await.unwrap();

        clock.set(t0() + ChronoDuration::minutes(1));
        let answered = scheduler.answer(&card_box.id, &id, true).await.unwrap();

        assert_eq!(answered.interval, 6);
        assert_eq!(
            answered.learned_until,
            t0() + ChronoDuration::minutes(1) + ChronoDuration::days(20)
        );
        assert_eq!(answered.history.len(), 1);
        assert!(!answered.in_active_pool);
    }

    #[tokio::test]
    async fn test_wrong_answer_at_lowest_interval() {
        let (store, clock, card_box, scheduler) = setup(1).await;
        let id = CardId::new(CollectionId(1), "row00");
        let mut card = store.get_card(&card_box.id, &id).await.unwrap().unwrap();
        card.in_active_pool = true;
        store.put_cards(&card_box.id, &[card]).await.unwrap();

        clock.set(t0() + ChronoDuration::hours(1));
        let answered = scheduler.answer(&card_box.id, &id, false).await.unwrap();

        assert_eq!(answered.interval, 1);
        assert!(answered.in_active_pool);
        assert_eq!(answered.wrong_count, 1);
        assert_eq!(
            answered.learned_until,
            t0() + ChronoDuration::hours(1) + ChronoDuration::minutes(1)
        );
    }

    #[tokio::test]
    async fn test_study_time_is_capped() {
        let (store, clock, card_box, scheduler) = setup(2).await;
        let a = CardId::new(CollectionId(1), "row00");
        let b = CardId::new(CollectionId(1), "row01");

        scheduler.answer(&card_box.id, &a, true).await.unwrap();
        clock.advance(ChronoDuration::seconds(40));
        scheduler.answer(&card_box.id, &b, true).await.unwrap();
        clock.advance(ChronoDuration::hours(2));
        scheduler.answer(&card_box.id, &a, false).await.unwrap();

        let stored = store.get_box(&card_box.id).await.unwrap().unwrap();
        // First answer: gap since 2010 capped; second: 40s; third: capped
        assert_eq!(stored.time_studied, Duration::from_secs(300 + 40 + 300));
        assert_eq!(stored.last_studied, t0() + ChronoDuration::seconds(40 + 7200));
    }

    #[tokio::test]
    async fn test_answer_unknown_card() {
        let (_store, _clock, card_box, scheduler) = setup(1).await;
        let err = scheduler
            .answer(&card_box.id, &CardId::new(CollectionId(1), "nope"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, CardboxError::CardNotFound(_)));
    }

    proptest! {
        #[test]
        fn prop_answers_keep_card_invariants(
            start in 1u8..=12,
            answers in proptest::collection::vec((any::<bool>(), 0i64..100_000), 1..40),
            exponential in any::<bool>(),
        ) {
            let policy = if exponential { SchedulePolicy::Exponential } else { SchedulePolicy::Linear };
            let mut card = Card::new(CardId::new(CollectionId(1), "p"), t0());
            card.interval = start;
            let mut now = t0();

            for (correct, gap) in answers {
                now += ChronoDuration::seconds(gap);
                apply_answer(&mut card, correct, now, &policy);
                prop_assert!((1..=12).contains(&card.interval));
                prop_assert!(card.learned_until >= card.last_studied);
                prop_assert_eq!(card.last_studied, now);
            }
        }
    }
}
