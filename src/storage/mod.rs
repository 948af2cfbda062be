//! Storage layer for the Cardbox study system
//!
//! Provides the storage capability the core relies on (ordered, filtered,
//! partition-scoped card queries, batched writes and single-partition
//! transactions) and its implementations.

pub mod libsql;
pub mod memory;

use crate::collections::{Cardset, Factsheet};
use crate::error::Result;
use crate::types::{BoxId, Card, CardBox, CardId, CollectionId, DailyStatsSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Storage backend trait defining all required operations
///
/// Every card lives in the partition of its box. Methods taking a slice of
/// cards write them atomically.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Fetch a factsheet by name
    async fn get_factsheet(&self, name: &str) -> Result<Option<Factsheet>>;

    /// Insert or replace a factsheet
    async fn put_factsheet(&self, factsheet: &Factsheet) -> Result<()>;

    async fn get_cardset(&self, id: CollectionId) -> Result<Option<Cardset>>;

    async fn put_cardset(&self, cardset: &Cardset) -> Result<()>;

    async fn list_cardsets(&self) -> Result<Vec<Cardset>>;

    async fn get_box(&self, id: &BoxId) -> Result<Option<CardBox>>;

    async fn put_box(&self, card_box: &CardBox) -> Result<()>;

    async fn get_card(&self, box_id: &BoxId, id: &CardId) -> Result<Option<Card>>;

    /// Insert or replace cards of one box in a single transaction
    async fn put_cards(&self, box_id: &BoxId, cards: &[Card]) -> Result<()>;

    /// Delete cards of one box in a single transaction; missing ids are ignored
    async fn delete_cards(&self, box_id: &BoxId, ids: &[CardId]) -> Result<()>;

    /// Ordered, filtered range query within one box
    async fn query_cards(&self, query: &CardQuery) -> Result<Vec<Card>>;

    /// Count matching cards, stopping at `limit` when given
    async fn count_cards(
        &self,
        box_id: &BoxId,
        filter: &CardFilter,
        limit: Option<usize>,
    ) -> Result<usize>;

    /// Persist an answered card together with its box
    async fn commit_answer(&self, card_box: &CardBox, card: &Card) -> Result<()>;

    /// Insert a snapshot unless one exists for its `(box, day)`.
    /// Returns whether it was inserted.
    async fn put_snapshot(&self, snapshot: &DailyStatsSnapshot) -> Result<bool>;

    async fn get_snapshot(&self, box_id: &BoxId, day: NaiveDate)
        -> Result<Option<DailyStatsSnapshot>>;

    /// Snapshots with `day > after`, oldest first
    async fn list_snapshots(
        &self,
        box_id: &BoxId,
        after: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<DailyStatsSnapshot>>;

    /// Most recent snapshot of a box
    async fn latest_snapshot(&self, box_id: &BoxId) -> Result<Option<DailyStatsSnapshot>>;
}

/// Equality/inequality filters over card attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardFilter {
    pub enabled: Option<bool>,
    pub in_active_pool: Option<bool>,
    /// `learned_until < t`
    pub due_before: Option<DateTime<Utc>>,
    /// `learned_until > t`
    pub learned_after: Option<DateTime<Utc>>,
}

impl CardFilter {
    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, card: &Card) -> bool {
        self.enabled.map_or(true, |e| card.enabled == e)
            && self.in_active_pool.map_or(true, |p| card.in_active_pool == p)
            && self.due_before.map_or(true, |t| card.learned_until < t)
            && self.learned_after.map_or(true, |t| card.learned_until > t)
    }
}

/// Sort key of a card query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardOrder {
    /// Card key
    #[default]
    Identity,
    /// `(learned_until, key)`
    LearnedUntil,
    /// `(last_studied, key)`
    LastStudied,
}

impl CardOrder {
    /// Attribute value sorted on before the key
    pub fn sort_value(&self, card: &Card) -> Option<DateTime<Utc>> {
        match self {
            CardOrder::Identity => None,
            CardOrder::LearnedUntil => Some(card.learned_until),
            CardOrder::LastStudied => Some(card.last_studied),
        }
    }

    pub fn compare(&self, a: &Card, b: &Card) -> Ordering {
        self.sort_value(a)
            .cmp(&self.sort_value(b))
            .then_with(|| a.id.key().cmp(&b.id.key()))
    }
}

/// Position of the last processed card of an ordered walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub key: String,
    pub value: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn of(card: &Card, order: CardOrder) -> Self {
        Self {
            key: card.id.key(),
            value: order.sort_value(card),
        }
    }

    /// Whether `card` sorts strictly after this checkpoint
    pub fn precedes(&self, card: &Card, order: CardOrder) -> bool {
        let value = order.sort_value(card);
        match value.cmp(&self.value) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => card.id.key() > self.key,
        }
    }
}

/// Ordered range query over one box
#[derive(Debug, Clone, PartialEq)]
pub struct CardQuery {
    pub box_id: BoxId,
    pub filter: CardFilter,
    pub order: CardOrder,
    /// Only cards strictly after this position
    pub after: Option<Checkpoint>,
    pub limit: usize,
}

impl CardQuery {
    pub fn new(box_id: BoxId, limit: usize) -> Self {
        Self {
            box_id,
            filter: CardFilter::default(),
            order: CardOrder::Identity,
            after: None,
            limit,
        }
    }

    pub fn filter(mut self, filter: CardFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order(mut self, order: CardOrder) -> Self {
        self.order = order;
        self
    }

    pub fn after(mut self, checkpoint: Option<Checkpoint>) -> Self {
        self.after = checkpoint;
        self
    }
}
