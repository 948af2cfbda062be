//! Study sessions through the service facade

mod common;

use cardbox_core::{BoxId, CardboxError, CardboxService, CollectionId, SchedulePolicy, StudyContext};
use chrono::Duration;
use common::{card_id, seed_box, seed_cardset, seed_factsheet, study, t0, Harness};
use std::time::Duration as StdDuration;

const VERBS: &str = r#"
columns: [infinitive, meaning]
rows:
  - [aller, to go]
  - [venir, to come]
  - [faire, to do]
"#;

async fn time_studied(service: &CardboxService, ctx: &StudyContext) -> StdDuration {
    service.authorize(ctx).await.unwrap().time_studied
}

#[tokio::test]
async fn test_other_users_are_refused() {
    let h = Harness::new();
    seed_factsheet(h.store.as_ref(), "letters", &["a", "b"]).await;
    seed_cardset(h.store.as_ref(), 1, "letters").await;
    let card_box = seed_box(h.store.as_ref()).await;
    let service = h.service();
    let intruder = StudyContext::new("bob", card_box.id.clone());

    assert!(matches!(
        service.next_card(&intruder).await,
        Err(CardboxError::Unauthorized(_))
    ));
    assert!(matches!(
        service.answer(&intruder, &card_id(1, "a"), true).await,
        Err(CardboxError::Unauthorized(_))
    ));
    assert!(matches!(
        service.update_membership(&intruder, &[CollectionId(1)]).await,
        Err(CardboxError::Unauthorized(_))
    ));

    // Nothing was scheduled on the owner's behalf
    assert!(h.queue.is_empty().await);
    assert!(h.store.all_cards(&card_box.id).await.is_empty());
}

#[tokio::test]
async fn test_unknown_box_is_reported() {
    let h = Harness::new();
    let service = h.service();
    let ctx = StudyContext::new("ann", BoxId::from("missing"));

    assert!(matches!(
        service.stats(&ctx).await,
        Err(CardboxError::BoxNotFound(_))
    ));
}

#[tokio::test]
async fn test_import_subscribe_and_study() {
    let h = Harness::new();
    let service = h.service();

    let factsheet = service.import_factsheet("French verbs", VERBS).await.unwrap();
    assert_eq!(factsheet.len(), 3);
    let cardset = service
        .create_cardset("ann", "Verb drill", &factsheet.name, None)
        .await
        .unwrap();
    assert_eq!(cardset.id, CollectionId(1));

    let card_box = service.create_box("ann", "French", None).await.unwrap();
    let ctx = study(&card_box);
    assert!(service.is_empty(&ctx).await.unwrap());

    service.update_membership(&ctx, &[cardset.id]).await.unwrap();
    h.drain().await;
    assert!(!service.is_empty(&ctx).await.unwrap());

    let card = service.next_card(&ctx).await.unwrap().unwrap();
    let row = service.card_row(&card.id).await.unwrap().unwrap();
    assert!(["aller", "venir", "faire"].contains(&row["infinitive"].as_str()));

    let answered = service.answer(&ctx, &card.id, true).await.unwrap();
    assert_eq!(answered.interval, 2);
    assert_eq!(answered.correct_count, 1);
    assert!(!answered.in_active_pool);

    let stats = service.stats(&ctx).await.unwrap();
    assert_eq!(stats.card_count, 3);
    assert_eq!(stats.learned_count, 1);
}

#[tokio::test]
async fn test_cardset_needs_existing_factsheet() {
    let h = Harness::new();
    let result = h
        .service()
        .create_cardset("ann", "Verb drill", "no_such_list", None)
        .await;
    assert!(matches!(result, Err(CardboxError::CollectionNotFound(_))));
}

#[tokio::test]
async fn test_box_policy_drives_reschedule() {
    let h = Harness::new();
    seed_factsheet(h.store.as_ref(), "letters", &["a"]).await;
    seed_cardset(h.store.as_ref(), 1, "letters").await;
    let service = h.service();

    let card_box = service
        .create_box("ann", "Fast", Some(SchedulePolicy::Exponential))
        .await
        .unwrap();
    let ctx = study(&card_box);
    service.update_membership(&ctx, &[CollectionId(1)]).await.unwrap();
    h.drain().await;

    let answered = service.answer(&ctx, &card_id(1, "a"), true).await.unwrap();
    assert_eq!(answered.interval, 2);
    assert_eq!(answered.learned_until, t0() + Duration::days(1));
}

#[tokio::test]
async fn test_wrong_answer_keeps_card_in_pool() {
    let h = Harness::new();
    seed_factsheet(h.store.as_ref(), "letters", &["a", "b", "c", "d"]).await;
    seed_cardset(h.store.as_ref(), 1, "letters").await;
    let card_box = seed_box(h.store.as_ref()).await;
    let service = h.service();
    let ctx = study(&card_box);
    service.update_membership(&ctx, &[CollectionId(1)]).await.unwrap();
    h.drain().await;

    let card = service.next_card(&ctx).await.unwrap().unwrap();
    h.clock.advance(Duration::seconds(20));
    let answered = service.answer(&ctx, &card.id, false).await.unwrap();

    assert!(answered.in_active_pool);
    assert_eq!(answered.interval, 1);
    assert_eq!(answered.wrong_count, 1);
    assert!(answered.learned_until > answered.last_studied);
    assert_eq!(answered.history.len(), 1);
}

#[tokio::test]
async fn test_study_time_is_capped_per_gap() {
    let h = Harness::new();
    seed_factsheet(h.store.as_ref(), "letters", &["a", "b"]).await;
    seed_cardset(h.store.as_ref(), 1, "letters").await;
    let card_box = seed_box(h.store.as_ref()).await;
    let service = h.service();
    let ctx = study(&card_box);
    service.update_membership(&ctx, &[CollectionId(1)]).await.unwrap();
    h.drain().await;

    service.answer(&ctx, &card_id(1, "a"), true).await.unwrap();
    let base = time_studied(&service, &ctx).await;

    h.clock.advance(Duration::seconds(45));
    service.answer(&ctx, &card_id(1, "b"), false).await.unwrap();
    assert_eq!(
        time_studied(&service, &ctx).await,
        base + StdDuration::from_secs(45)
    );

    // A long break counts as the idle cap only
    h.clock.advance(Duration::hours(3));
    service.answer(&ctx, &card_id(1, "b"), true).await.unwrap();
    assert_eq!(
        time_studied(&service, &ctx).await,
        base + StdDuration::from_secs(45) + h.ctx.config.study.idle_cap
    );
}

#[tokio::test]
async fn test_empty_box_has_no_next_card() {
    let h = Harness::new();
    let card_box = seed_box(h.store.as_ref()).await;
    let service = h.service();

    assert!(service.next_card(&study(&card_box)).await.unwrap().is_none());
}
