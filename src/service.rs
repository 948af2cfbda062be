//! Cardbox service facade
//!
//! The entry point for the display and configuration layers. There is no
//! ambient current user: every call names its caller and box in a
//! [`StudyContext`], and a box owned by someone else is refused.

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::collections::{factsheet_name, Cardset, Factsheet, Row, SourceCollection};
use crate::error::{CardboxError, Result};
use crate::reconcile;
use crate::stats;
use crate::study::{SchedulePolicy, StudyScheduler};
use crate::tasks::TaskContext;
use crate::types::{BoxId, BoxStats, Card, CardBox, CardId, CollectionId, DailyStatsSnapshot, NUM_INTERVALS};

/// Caller identity and the box it acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyContext {
    pub owner: String,
    pub box_id: BoxId,
}

impl StudyContext {
    pub fn new(owner: impl Into<String>, box_id: BoxId) -> Self {
        Self {
            owner: owner.into(),
            box_id,
        }
    }
}

pub struct CardboxService {
    ctx: TaskContext,
    scheduler: StudyScheduler,
}

impl CardboxService {
    pub fn new(ctx: TaskContext) -> Self {
        let scheduler = StudyScheduler::new(
            ctx.store.clone(),
            ctx.clock.clone(),
            ctx.config.study.clone(),
        );
        Self { ctx, scheduler }
    }

    /// Use a specific scheduler, e.g. one with a fixed seed
    pub fn with_scheduler(ctx: TaskContext, scheduler: StudyScheduler) -> Self {
        Self { ctx, scheduler }
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Load the box of `study` after checking its owner
    pub async fn authorize(&self, study: &StudyContext) -> Result<CardBox> {
        let card_box = self
            .ctx
            .store
            .get_box(&study.box_id)
            .await?
            .ok_or_else(|| CardboxError::BoxNotFound(study.box_id.to_string()))?;
        if card_box.owner != study.owner {
            warn!(
                "User {} tried to access box {} owned by {}",
                study.owner, card_box.id, card_box.owner
            );
            return Err(CardboxError::Unauthorized(format!(
                "box {} belongs to another user",
                card_box.id
            )));
        }
        Ok(card_box)
    }

    /// Store a factsheet parsed from YAML under the name derived from `title`
    pub async fn import_factsheet(&self, title: &str, content: &str) -> Result<Factsheet> {
        let name = factsheet_name(title)?;
        let factsheet = Factsheet::parse(name, content, self.ctx.clock.now())?;
        self.ctx.store.put_factsheet(&factsheet).await?;
        info!(
            "Imported factsheet '{}' with {} rows",
            factsheet.name,
            factsheet.len()
        );
        Ok(factsheet)
    }

    /// Create a cardset over an existing factsheet
    pub async fn create_cardset(
        &self,
        owner: &str,
        title: &str,
        factsheet: &str,
        template_name: Option<&str>,
    ) -> Result<Cardset> {
        if self.ctx.store.get_factsheet(factsheet).await?.is_none() {
            return Err(CardboxError::CollectionNotFound(format!(
                "factsheet '{}'",
                factsheet
            )));
        }

        let next_id = self
            .ctx
            .store
            .list_cardsets()
            .await?
            .iter()
            .map(|c| c.id.0)
            .max()
            .unwrap_or(0)
            + 1;
        let mut cardset = Cardset::new(CollectionId(next_id), title, owner, factsheet)?;
        if let Some(template) = template_name {
            cardset.template_name = template.to_string();
        }
        self.ctx.store.put_cardset(&cardset).await?;
        info!("Created cardset {} '{}'", cardset.id, cardset.title);
        Ok(cardset)
    }

    /// Create an empty box for `owner`
    pub async fn create_box(
        &self,
        owner: &str,
        title: &str,
        policy: Option<SchedulePolicy>,
    ) -> Result<CardBox> {
        let mut card_box = CardBox::new(owner, title);
        if let Some(policy) = policy {
            card_box.schedule_policy = policy.as_str().to_string();
        }
        self.ctx.store.put_box(&card_box).await?;
        info!("Created box {} for {}", card_box.id, owner);
        Ok(card_box)
    }

    pub async fn next_card(&self, study: &StudyContext) -> Result<Option<Card>> {
        self.authorize(study).await?;
        self.scheduler.next_card(&study.box_id).await
    }

    pub async fn answer(&self, study: &StudyContext, card: &CardId, correct: bool) -> Result<Card> {
        self.authorize(study).await?;
        self.scheduler.answer(&study.box_id, card, correct).await
    }

    pub async fn stats(&self, study: &StudyContext) -> Result<BoxStats> {
        let card_box = self.authorize(study).await?;
        stats::box_stats(self.ctx.store.as_ref(), self.ctx.clock.as_ref(), &card_box).await
    }

    pub async fn recent_snapshots(&self, study: &StudyContext) -> Result<Vec<DailyStatsSnapshot>> {
        self.authorize(study).await?;
        stats::recent_snapshots(&self.ctx, &study.box_id).await
    }

    pub async fn interval_distribution(&self, study: &StudyContext) -> Result<[u32; NUM_INTERVALS]> {
        let card_box = self.authorize(study).await?;
        stats::interval_distribution(self.ctx.store.as_ref(), self.ctx.clock.as_ref(), &card_box)
            .await
    }

    pub async fn is_empty(&self, study: &StudyContext) -> Result<bool> {
        self.authorize(study).await?;
        stats::is_empty(self.ctx.store.as_ref(), &study.box_id).await
    }

    /// Schedule snapshot walks for the last `days` days
    pub async fn backfill_stats(&self, study: &StudyContext, days: u32) -> Result<()> {
        self.authorize(study).await?;
        stats::schedule_backfill(&self.ctx, &study.box_id, days).await
    }

    pub async fn update_membership(
        &self,
        study: &StudyContext,
        cardsets: &[CollectionId],
    ) -> Result<()> {
        self.authorize(study).await?;
        reconcile::update_membership(&self.ctx, &study.box_id, cardsets).await
    }

    /// Source row a card was drawn from, if its collection still has it
    pub async fn card_row(&self, id: &CardId) -> Result<Option<Row>> {
        let Some(cardset) = self.ctx.store.get_cardset(id.collection).await? else {
            return Ok(None);
        };
        let factsheet = self.ctx.store.get_factsheet(&cardset.factsheet).await?;
        Ok(factsheet.and_then(|sheet| sheet.row(&id.row).cloned()))
    }

    /// Re-run reconciliation against the current subscriptions
    pub async fn resync(&self, study: &StudyContext) -> Result<BTreeSet<CardId>> {
        let card_box = self.authorize(study).await?;
        let desired = reconcile::desired_card_ids(self.ctx.store.as_ref(), &card_box).await?;
        reconcile::reconcile(&self.ctx, &card_box.id, desired.clone()).await?;
        Ok(desired)
    }
}
