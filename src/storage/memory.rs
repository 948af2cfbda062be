//! In-process storage backend
//!
//! Keeps every partition in a `BTreeMap` keyed like the persisted card key,
//! so identity order matches the libSQL backend byte for byte. Used by the
//! test suites and for ephemeral runs; counts card writes so callers can
//! check that a run was a no-op.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{CardFilter, CardQuery, CardStore};
use crate::collections::{Cardset, Factsheet};
use crate::error::Result;
use crate::types::{BoxId, Card, CardBox, CardId, CollectionId, DailyStatsSnapshot};

#[derive(Default)]
struct MemoryState {
    factsheets: HashMap<String, Factsheet>,
    cardsets: BTreeMap<CollectionId, Cardset>,
    boxes: HashMap<BoxId, CardBox>,
    cards: HashMap<BoxId, BTreeMap<String, Card>>,
    snapshots: HashMap<BoxId, BTreeMap<NaiveDate, DailyStatsSnapshot>>,
}

/// Number of card records written since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub cards_put: usize,
    pub cards_deleted: usize,
}

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    cards_put: AtomicUsize,
    cards_deleted: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_counts(&self) -> WriteCounts {
        WriteCounts {
            cards_put: self.cards_put.load(Ordering::SeqCst),
            cards_deleted: self.cards_deleted.load(Ordering::SeqCst),
        }
    }

    /// All cards of a box in identity order
    pub async fn all_cards(&self, box_id: &BoxId) -> Vec<Card> {
        let state = self.state.read().await;
        state
            .cards
            .get(box_id)
            .map(|cards| cards.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn get_factsheet(&self, name: &str) -> Result<Option<Factsheet>> {
        Ok(self.state.read().await.factsheets.get(name).cloned())
    }

    async fn put_factsheet(&self, factsheet: &Factsheet) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .factsheets
            .insert(factsheet.name.clone(), factsheet.clone());
        Ok(())
    }

    async fn get_cardset(&self, id: CollectionId) -> Result<Option<Cardset>> {
        Ok(self.state.read().await.cardsets.get(&id).cloned())
    }

    async fn put_cardset(&self, cardset: &Cardset) -> Result<()> {
        let mut state = self.state.write().await;
        state.cardsets.insert(cardset.id, cardset.clone());
        Ok(())
    }

    async fn list_cardsets(&self) -> Result<Vec<Cardset>> {
        Ok(self.state.read().await.cardsets.values().cloned().collect())
    }

    async fn get_box(&self, id: &BoxId) -> Result<Option<CardBox>> {
        Ok(self.state.read().await.boxes.get(id).cloned())
    }

    async fn put_box(&self, card_box: &CardBox) -> Result<()> {
        let mut state = self.state.write().await;
        state.boxes.insert(card_box.id.clone(), card_box.clone());
        Ok(())
    }

    async fn get_card(&self, box_id: &BoxId, id: &CardId) -> Result<Option<Card>> {
        let state = self.state.read().await;
        Ok(state
            .cards
            .get(box_id)
            .and_then(|cards| cards.get(&id.key()))
            .cloned())
    }

    async fn put_cards(&self, box_id: &BoxId, cards: &[Card]) -> Result<()> {
        if cards.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        let partition = state.cards.entry(box_id.clone()).or_default();
        for card in cards {
            partition.insert(card.id.key(), card.clone());
        }
        self.cards_put.fetch_add(cards.len(), Ordering::SeqCst);
        debug!("Stored {} cards in box {}", cards.len(), box_id);
        Ok(())
    }

    async fn delete_cards(&self, box_id: &BoxId, ids: &[CardId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        if let Some(partition) = state.cards.get_mut(box_id) {
            let removed = ids
                .iter()
                .filter(|id| partition.remove(&id.key()).is_some())
                .count();
            self.cards_deleted.fetch_add(removed, Ordering::SeqCst);
            debug!("Deleted {} cards from box {}", removed, box_id);
        }
        Ok(())
    }

    async fn query_cards(&self, query: &CardQuery) -> Result<Vec<Card>> {
        let state = self.state.read().await;
        let Some(partition) = state.cards.get(&query.box_id) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<&Card> = partition
            .values()
            .filter(|card| query.filter.matches(card))
            .filter(|card| {
                query
                    .after
                    .as_ref()
                    .map_or(true, |cp| cp.precedes(card, query.order))
            })
            .collect();
        matching.sort_by(|a, b| query.order.compare(a, b));

        Ok(matching
            .into_iter()
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn count_cards(
        &self,
        box_id: &BoxId,
        filter: &CardFilter,
        limit: Option<usize>,
    ) -> Result<usize> {
        let state = self.state.read().await;
        let count = state
            .cards
            .get(box_id)
            .map(|cards| cards.values().filter(|card| filter.matches(card)).count())
            .unwrap_or(0);
        Ok(limit.map_or(count, |limit| count.min(limit)))
    }

    async fn commit_answer(&self, card_box: &CardBox, card: &Card) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .cards
            .entry(card_box.id.clone())
            .or_default()
            .insert(card.id.key(), card.clone());
        state.boxes.insert(card_box.id.clone(), card_box.clone());
        self.cards_put.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put_snapshot(&self, snapshot: &DailyStatsSnapshot) -> Result<bool> {
        let mut state = self.state.write().await;
        let days = state.snapshots.entry(snapshot.box_id.clone()).or_default();
        if days.contains_key(&snapshot.day) {
            return Ok(false);
        }
        days.insert(snapshot.day, snapshot.clone());
        Ok(true)
    }

    async fn get_snapshot(
        &self,
        box_id: &BoxId,
        day: NaiveDate,
    ) -> Result<Option<DailyStatsSnapshot>> {
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .get(box_id)
            .and_then(|days| days.get(&day))
            .cloned())
    }

    async fn list_snapshots(
        &self,
        box_id: &BoxId,
        after: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<DailyStatsSnapshot>> {
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .get(box_id)
            .map(|days| {
                days.values()
                    .filter(|s| after.map_or(true, |after| s.day > after))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_snapshot(&self, box_id: &BoxId) -> Result<Option<DailyStatsSnapshot>> {
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .get(box_id)
            .and_then(|days| days.values().next_back())
            .cloned())
    }
}
