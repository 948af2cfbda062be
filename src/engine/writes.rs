//! Writes accumulated during one invocation

use std::collections::{BTreeMap, BTreeSet};

use super::MapOutput;
use crate::error::Result;
use crate::storage::CardStore;
use crate::types::{BoxId, Card, CardId};

/// Updates keyed by card identity; a delete supersedes any update of the
/// same card, including later ones
#[derive(Debug, Default)]
pub struct PendingWrites {
    updates: BTreeMap<CardId, Card>,
    deletes: BTreeSet<CardId>,
}

impl PendingWrites {
    pub fn add(&mut self, output: MapOutput) {
        for id in output.deletes {
            self.delete(id);
        }
        for card in output.updates {
            self.update(card);
        }
    }

    pub fn update(&mut self, card: Card) {
        if !self.deletes.contains(&card.id) {
            self.updates.insert(card.id.clone(), card);
        }
    }

    pub fn delete(&mut self, id: CardId) {
        self.updates.remove(&id);
        self.deletes.insert(id);
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Write everything out and return `(updated, deleted)` counts
    pub async fn flush(&mut self, store: &dyn CardStore, box_id: &BoxId) -> Result<(usize, usize)> {
        let updates: Vec<Card> = std::mem::take(&mut self.updates).into_values().collect();
        let deletes: Vec<CardId> = std::mem::take(&mut self.deletes).into_iter().collect();

        store.put_cards(box_id, &updates).await?;
        store.delete_cards(box_id, &deletes).await?;
        Ok((updates.len(), deletes.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::types::CollectionId;
    use chrono::Utc;

    fn card(row: &str) -> Card {
        Card::new(CardId::new(CollectionId(1), row), Utc::now())
    }

    #[test]
    fn test_updates_deduplicate_by_identity() {
        let mut writes = PendingWrites::default();
        let mut first = card("a");
        first.interval = 2;
        let mut second = card("a");
        second.interval = 3;

        writes.update(first);
        writes.update(second);
        assert_eq!(writes.updates.len(), 1);
        assert_eq!(writes.updates.values().next().unwrap().interval, 3);
    }

    #[test]
    fn test_delete_supersedes_update() {
        let mut writes = PendingWrites::default();
        writes.update(card("a"));
        writes.delete(card("a").id);
        writes.update(card("a"));
        assert!(writes.updates.is_empty());
        assert_eq!(writes.deletes.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_empties_buffer() {
        let store = MemoryStore::new();
        let box_id = BoxId::from("b");
        let mut writes = PendingWrites::default();
        writes.add(MapOutput::update(card("a")));
        writes.add(MapOutput::delete(card("z").id));

        let counts = writes.flush(&store, &box_id).await.unwrap();
        assert_eq!(counts, (1, 1));
        assert!(writes.is_empty());
        assert_eq!(store.all_cards(&box_id).await.len(), 1);
    }
}
