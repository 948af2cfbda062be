// Membership Reconciler
//
// Keeps the card records of a box in line with the rows of the cardsets it
// subscribes to. Cards that left the membership are disabled, keeping their
// history, and deleted once the grace period has passed; cards never studied
// are deleted right away. Missing cards are created afterwards in batches.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::config::CardboxConfig;
use crate::engine::{self, CardMapper, MapOutput, Mapper};
use crate::error::{CardboxError, Result};
use crate::storage::CardStore;
use crate::tasks::{DeferOptions, Task, TaskContext};
use crate::types::{BoxId, Card, CardBox, CardId, CollectionId};

/// Decision for one card record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Keep,
    Enable,
    Disable,
    Delete,
}

/// Mapper walking every card of a box in identity order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardCleaner {
    pub box_id: BoxId,
    /// Desired identities not yet seen during the walk
    pub desired: BTreeSet<CardId>,
    pub grace_period_days: i64,
    /// Set by `prepare` when the box is gone
    #[serde(skip)]
    orphaned: bool,
}

impl CardCleaner {
    pub fn new(box_id: BoxId, desired: BTreeSet<CardId>, grace_period_days: i64) -> Self {
        Self {
            box_id,
            desired,
            grace_period_days,
            orphaned: false,
        }
    }

    /// What to do with a card that is not (or no longer) desired
    pub fn cleanup_action(&self, card: &Card, now: DateTime<Utc>) -> CleanupAction {
        if self.orphaned || !card.has_been_studied() {
            CleanupAction::Delete
        } else if now - card.modified > Duration::days(self.grace_period_days) {
            CleanupAction::Delete
        } else if card.enabled {
            CleanupAction::Disable
        } else {
            CleanupAction::Keep
        }
    }
}

#[async_trait]
impl CardMapper for CardCleaner {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    fn box_id(&self) -> &BoxId {
        &self.box_id
    }

    fn queue<'a>(&self, config: &'a CardboxConfig) -> &'a str {
        &config.reconcile.queue
    }

    async fn prepare(&mut self, ctx: &TaskContext) -> Result<()> {
        self.orphaned = ctx.store.get_box(&self.box_id).await?.is_none();
        if self.orphaned {
            warn!(
                "Box {} no longer exists, deleting its cards as orphans",
                self.box_id
            );
        }
        Ok(())
    }

    fn map(&mut self, card: &Card, now: DateTime<Utc>) -> MapOutput {
        let action = if !self.orphaned && self.desired.remove(&card.id) {
            if card.enabled {
                CleanupAction::Keep
            } else {
                CleanupAction::Enable
            }
        } else {
            self.cleanup_action(card, now)
        };

        match action {
            CleanupAction::Keep => MapOutput::none(),
            CleanupAction::Delete => MapOutput::delete(card.id.clone()),
            CleanupAction::Enable | CleanupAction::Disable => {
                let mut card = card.clone();
                card.enabled = action == CleanupAction::Enable;
                card.modified = now;
                MapOutput::update(card)
            }
        }
    }

    async fn finish(&mut self, ctx: &TaskContext) -> Result<()> {
        if self.orphaned || self.desired.is_empty() {
            info!("Reconcile of box {} finished. No cards to add.", self.box_id);
            return Ok(());
        }

        info!(
            "Reconcile of box {} finished. Creating {} cards.",
            self.box_id,
            self.desired.len()
        );
        let task = CreateCardsTask {
            box_id: self.box_id.clone(),
            ids: std::mem::take(&mut self.desired).into_iter().collect(),
            batch_size: ctx.config.reconcile.create_batch_size,
        };
        ctx.defer(
            Task::CreateCards(task),
            DeferOptions::queue(ctx.config.reconcile.queue.clone()),
        )
        .await
    }
}

/// Creates cards for `ids` a batch at a time, re-deferring the remainder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCardsTask {
    pub box_id: BoxId,
    pub ids: Vec<CardId>,
    pub batch_size: usize,
}

impl CreateCardsTask {
    pub async fn execute(mut self, ctx: &TaskContext) -> Result<()> {
        if self.ids.is_empty() {
            return Ok(());
        }
        if ctx.store.get_box(&self.box_id).await?.is_none() {
            warn!(
                "Box {} disappeared before {} cards were created",
                self.box_id,
                self.ids.len()
            );
            return Ok(());
        }

        let rest = self.ids.split_off(self.batch_size.max(1).min(self.ids.len()));
        info!(
            "Adding cards for box {} ({} remaining after this batch of {})",
            self.box_id,
            rest.len(),
            self.ids.len()
        );

        let now = ctx.clock.now();
        let mut cards = Vec::with_capacity(self.ids.len());
        for id in self.ids {
            match ctx.store.get_card(&self.box_id, &id).await? {
                Some(card) if card.enabled => {}
                Some(mut card) => {
                    card.enabled = true;
                    card.modified = now;
                    cards.push(card);
                }
                None => {
                    debug!("Creating card {} in box {}", id, self.box_id);
                    cards.push(Card::new(id, now));
                }
            }
        }
        ctx.store.put_cards(&self.box_id, &cards).await?;

        if !rest.is_empty() {
            let task = CreateCardsTask {
                box_id: self.box_id,
                ids: rest,
                batch_size: self.batch_size,
            };
            ctx.defer(
                Task::CreateCards(task),
                DeferOptions::queue(ctx.config.reconcile.queue.clone()),
            )
            .await?;
        }
        Ok(())
    }
}

/// Union of the card ids of every cardset `card_box` subscribes to
///
/// Cardsets or factsheets that no longer exist contribute nothing.
pub async fn desired_card_ids(store: &dyn CardStore, card_box: &CardBox) -> Result<BTreeSet<CardId>> {
    let mut ids = BTreeSet::new();
    for &cardset_id in &card_box.cardsets {
        let Some(cardset) = store.get_cardset(cardset_id).await? else {
            warn!("Box {} subscribes to missing cardset {}", card_box.id, cardset_id);
            continue;
        };
        let Some(factsheet) = store.get_factsheet(&cardset.factsheet).await? else {
            warn!(
                "Cardset {} refers to missing factsheet '{}'",
                cardset.id, cardset.factsheet
            );
            continue;
        };
        ids.extend(cardset.all_ids(&factsheet));
    }
    Ok(ids)
}

/// Start a reconciliation of `box_id` against `desired`
pub async fn reconcile(ctx: &TaskContext, box_id: &BoxId, desired: BTreeSet<CardId>) -> Result<()> {
    debug!(
        "Scheduling reconcile of box {} with {} desired cards",
        box_id,
        desired.len()
    );
    let cleaner = CardCleaner::new(
        box_id.clone(),
        desired,
        ctx.config.reconcile.grace_period_days,
    );
    engine::run(ctx, Mapper::Reconcile(cleaner)).await
}

/// Replace the subscriptions of a box and reconcile its cards asynchronously
pub async fn update_membership(
    ctx: &TaskContext,
    box_id: &BoxId,
    cardsets: &[CollectionId],
) -> Result<()> {
    let mut card_box = ctx
        .store
        .get_box(box_id)
        .await?
        .ok_or_else(|| CardboxError::BoxNotFound(box_id.to_string()))?;

    let mut subscribed = Vec::with_capacity(cardsets.len());
    for id in cardsets {
        if !subscribed.contains(id) {
            subscribed.push(*id);
        }
    }
    card_box.cardsets = subscribed;
    ctx.store.put_box(&card_box).await?;
    info!(
        "Box {} now subscribes to {} cardsets",
        box_id,
        card_box.cardsets.len()
    );

    let desired = desired_card_ids(ctx.store.as_ref(), &card_box).await?;
    reconcile(ctx, box_id, desired).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HistoryEntry;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
    }

    fn studied(row: &str, enabled: bool, modified: DateTime<Utc>) -> Card {
        let mut card = Card::new(CardId::new(CollectionId(1), row), modified);
        card.enabled = enabled;
        card.history.push(HistoryEntry {
            at: modified,
            correct_count: 1,
            wrong_count: 0,
            interval: 2,
            learned_until: modified,
        });
        card
    }

    fn cleaner_for(desired: &[&str]) -> CardCleaner {
        CardCleaner::new(
            BoxId::from("b"),
            desired
                .iter()
                .map(|row| CardId::new(CollectionId(1), *row))
                .collect(),
            30,
        )
    }

    #[test]
    fn test_never_studied_dropped_card_is_deleted() {
        let mut cleaner = cleaner_for(&[]);
        let card = Card::new(CardId::new(CollectionId(1), "x"), t0());
        assert_eq!(cleaner.map(&card, t0()), MapOutput::delete(card.id.clone()));
    }

    #[test]
    fn test_studied_dropped_card_is_disabled_then_deleted() {
        let mut cleaner = cleaner_for(&[]);
        let card = studied("x", true, t0());

        let out = cleaner.map(&card, t0());
        assert_eq!(out.updates.len(), 1);
        assert!(!out.updates[0].enabled);
        assert_eq!(out.updates[0].history.len(), 1);

        let disabled = out.updates[0].clone();
        assert_eq!(
            cleaner.cleanup_action(&disabled, t0() + Duration::days(30)),
            CleanupAction::Keep
        );
        assert_eq!(
            cleaner.cleanup_action(&disabled, t0() + Duration::days(31)),
            CleanupAction::Delete
        );
    }

    #[test]
    fn test_stale_enabled_card_is_deleted_without_disabling() {
        let mut cleaner = cleaner_for(&[]);
        let card = studied("x", true, t0());

        let later = t0() + Duration::days(40);
        assert_eq!(cleaner.cleanup_action(&card, later), CleanupAction::Delete);
        assert_eq!(cleaner.map(&card, later), MapOutput::delete(card.id.clone()));

        // Within the grace period it is only disabled
        let recent = studied("y", true, t0() + Duration::days(20));
        assert_eq!(cleaner.cleanup_action(&recent, later), CleanupAction::Disable);
    }

    #[test]
    fn test_desired_disabled_card_is_enabled() {
        let mut cleaner = cleaner_for(&["x"]);
        let card = studied("x", false, t0());

        let out = cleaner.map(&card, t0() + Duration::hours(1));
        assert!(out.updates[0].enabled);
        assert!(cleaner.desired.is_empty());

        // An enabled desired card needs no write
        let mut again = cleaner_for(&["x"]);
        let enabled = studied("x", true, t0());
        assert_eq!(again.map(&enabled, t0()), MapOutput::none());
    }

    #[test]
    fn test_orphaned_cards_are_deleted() {
        let mut cleaner = cleaner_for(&["x"]);
        cleaner.orphaned = true;
        let card = studied("x", true, t0());
        assert_eq!(cleaner.map(&card, t0()), MapOutput::delete(card.id.clone()));
    }

    #[test]
    fn test_cleaner_state_survives_serialization() {
        let cleaner = cleaner_for(&["a", "b"]);
        let json = serde_json::to_string(&Mapper::Reconcile(cleaner.clone())).unwrap();
        let Mapper::Reconcile(back) = serde_json::from_str(&json).unwrap() else {
            panic!("wrong mapper");
        };
        assert_eq!(back, cleaner);
    }
}
