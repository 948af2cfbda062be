//! LibSQL storage backend implementation
//!
//! Provides persistent storage using a local libSQL database. Each box is a
//! partition of the `cards` table (primary key `(box_id, card_key)`), so
//! every multi-card write is a single-partition transaction. Timestamps are
//! stored as integer microseconds to keep range filters and ordering exact.

use crate::collections::{Cardset, Factsheet};
use crate::error::{CardboxError, Result};
use crate::storage::{CardFilter, CardOrder, CardQuery, CardStore};
use crate::types::{
    BoxId, Card, CardBox, CardId, CollectionId, DailyStatsSnapshot, HistoryEntry, NUM_INTERVALS,
};
use ::libsql::{params, params_from_iter, Builder, Connection, Database, Row, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Embedded schema migrations, applied in order
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial_schema",
        r#"
        CREATE TABLE IF NOT EXISTS factsheets (
            name TEXT PRIMARY KEY NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            modified INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cardsets (
            id INTEGER PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            owner TEXT NOT NULL,
            factsheet TEXT NOT NULL,
            template_name TEXT NOT NULL DEFAULT 'default',
            public INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS boxes (
            id TEXT PRIMARY KEY NOT NULL,
            owner TEXT NOT NULL,
            title TEXT NOT NULL,
            cardsets TEXT NOT NULL DEFAULT '[]',
            schedule_policy TEXT NOT NULL DEFAULT 'linear',
            last_studied INTEGER NOT NULL,
            -- microseconds
            time_studied INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS cards (
            box_id TEXT NOT NULL,
            card_key TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            in_active_pool INTEGER NOT NULL DEFAULT 0,
            last_correct INTEGER NOT NULL,
            last_studied INTEGER NOT NULL,
            learned_until INTEGER NOT NULL,
            interval INTEGER NOT NULL DEFAULT 1 CHECK(interval BETWEEN 1 AND 12),
            correct_count INTEGER NOT NULL DEFAULT 0,
            wrong_count INTEGER NOT NULL DEFAULT 0,
            modified INTEGER NOT NULL,
            history TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (box_id, card_key)
        );

        CREATE TABLE IF NOT EXISTS daily_stats (
            box_id TEXT NOT NULL,
            day TEXT NOT NULL,
            card_count INTEGER NOT NULL,
            studied_count INTEGER NOT NULL,
            learned_count INTEGER NOT NULL,
            avg_interval REAL NOT NULL,
            min_interval INTEGER NOT NULL,
            max_interval INTEGER NOT NULL,
            intervals TEXT NOT NULL,
            PRIMARY KEY (box_id, day)
        );
        "#,
    ),
    (
        "002_add_indexes",
        r#"
        CREATE INDEX IF NOT EXISTS idx_cards_pool
            ON cards(box_id, enabled, in_active_pool);
        CREATE INDEX IF NOT EXISTS idx_cards_due
            ON cards(box_id, enabled, learned_until, card_key);
        CREATE INDEX IF NOT EXISTS idx_cards_last_studied
            ON cards(box_id, last_studied, card_key);
        "#,
    ),
];

const CARD_COLUMNS: &str = "card_key, enabled, in_active_pool, last_correct, last_studied, \
     learned_until, interval, correct_count, wrong_count, modified, history";

const UPSERT_CARD: &str = r#"
    INSERT OR REPLACE INTO cards (
        box_id, card_key, enabled, in_active_pool, last_correct, last_studied,
        learned_until, interval, correct_count, wrong_count, modified, history
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPSERT_BOX: &str = r#"
    INSERT OR REPLACE INTO boxes (
        id, owner, title, cardsets, schedule_policy, last_studied, time_studied
    ) VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

/// LibSQL storage backend
pub struct LibsqlStore {
    db: Database,
}

impl LibsqlStore {
    /// Validate database file before opening
    ///
    /// Returns `Ok(false)` when the file does not exist and `must_exist` is
    /// false, so the caller can create it.
    fn validate_database_file(db_path: &str, must_exist: bool) -> Result<bool> {
        let path = Path::new(db_path);

        if !path.exists() {
            if must_exist {
                return Err(CardboxError::Database(format!(
                    "Database file not found at '{}'. Run 'cardbox init' first or check CARDBOX_DB_PATH.",
                    db_path
                )));
            }
            return Ok(false);
        }

        // SQLite files start with "SQLite format 3\0" (16 bytes)
        let bytes = std::fs::read(path).map_err(|e| {
            CardboxError::Database(format!("Cannot read database file at '{}': {}", db_path, e))
        })?;
        if bytes.is_empty() {
            // Freshly created by a previous open that was interrupted
            return Ok(true);
        }
        if bytes.len() < 16 || &bytes[0..16] != b"SQLite format 3\0" {
            return Err(CardboxError::Database(format!(
                "Database file at '{}' is corrupted or not a valid SQLite database.",
                db_path
            )));
        }

        debug!("Database file validation passed: {}", db_path);
        Ok(true)
    }

    /// Open a local database, creating it (and its directory) when allowed
    pub async fn open(path: &str, create_if_missing: bool) -> Result<Self> {
        info!(
            "Opening libSQL database: {} (create_if_missing: {})",
            path, create_if_missing
        );

        let exists = Self::validate_database_file(path, !create_if_missing)?;
        if create_if_missing && !exists {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        CardboxError::Database(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CardboxError::Database(format!("Failed to open local database: {}", e)))?;

        let store = Self { db };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an existing local database
    pub async fn open_existing(path: &str) -> Result<Self> {
        Self::open(path, false).await
    }

    /// Run embedded schema migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations_applied (
                migration_name TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
            params![],
        )
        .await
        .map_err(|e| CardboxError::Migration(format!("Failed to create migrations table: {}", e)))?;

        for (name, sql) in MIGRATIONS {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM _migrations_applied WHERE migration_name = ?",
                    params![*name],
                )
                .await?;
            let applied = match rows.next().await? {
                Some(row) => row.get::<i64>(0)?,
                None => 0,
            };
            if applied > 0 {
                debug!("Skipping already applied migration: {}", name);
                continue;
            }

            conn.execute_batch(sql)
                .await
                .map_err(|e| CardboxError::Migration(format!("Failed to apply {}: {}", name, e)))?;

            conn.execute(
                "INSERT INTO _migrations_applied (migration_name, applied_at) VALUES (?, ?)",
                params![*name, Utc::now().timestamp()],
            )
            .await
            .map_err(|e| CardboxError::Migration(format!("Failed to record migration: {}", e)))?;

            info!("Executed migration: {}", name);
        }

        info!("Database migrations completed");
        Ok(())
    }

    /// Get a connection from the database
    fn get_conn(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| CardboxError::Database(format!("Failed to get connection: {}", e)))
    }

    fn card_params(box_id: &BoxId, card: &Card) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(box_id.to_string()),
            Value::Text(card.id.key()),
            Value::Integer(card.enabled as i64),
            Value::Integer(card.in_active_pool as i64),
            Value::Integer(card.last_correct.timestamp_micros()),
            Value::Integer(card.last_studied.timestamp_micros()),
            Value::Integer(card.learned_until.timestamp_micros()),
            Value::Integer(i64::from(card.interval)),
            Value::Integer(i64::from(card.correct_count)),
            Value::Integer(i64::from(card.wrong_count)),
            Value::Integer(card.modified.timestamp_micros()),
            Value::Text(serde_json::to_string(&card.history)?),
        ])
    }

    fn box_params(card_box: &CardBox) -> Result<Vec<Value>> {
        let cardsets: Vec<i64> = card_box.cardsets.iter().map(|c| c.0).collect();
        Ok(vec![
            Value::Text(card_box.id.to_string()),
            Value::Text(card_box.owner.clone()),
            Value::Text(card_box.title.clone()),
            Value::Text(serde_json::to_string(&cardsets)?),
            Value::Text(card_box.schedule_policy.clone()),
            Value::Integer(card_box.last_studied.timestamp_micros()),
            Value::Integer(card_box.time_studied.as_micros().min(i64::MAX as u128) as i64),
        ])
    }

    /// Convert database row (selected with `CARD_COLUMNS`) to Card
    fn row_to_card(row: &Row) -> Result<Card> {
        let key: String = row.get(0)?;
        let history: String = row.get(10)?;
        let history: Vec<HistoryEntry> = serde_json::from_str(&history)?;

        Ok(Card {
            id: key.parse::<CardId>()?,
            enabled: row.get::<i64>(1)? != 0,
            in_active_pool: row.get::<i64>(2)? != 0,
            last_correct: from_micros(row.get(3)?)?,
            last_studied: from_micros(row.get(4)?)?,
            learned_until: from_micros(row.get(5)?)?,
            interval: u8::try_from(row.get::<i64>(6)?).map_err(|e| {
                CardboxError::Database(format!("Invalid interval for card {}: {}", key, e))
            })?,
            correct_count: row.get::<i64>(7)? as u32,
            wrong_count: row.get::<i64>(8)? as u32,
            modified: from_micros(row.get(9)?)?,
            history,
        })
    }

    fn row_to_box(row: &Row) -> Result<CardBox> {
        let cardsets: String = row.get(3)?;
        let cardsets: Vec<i64> = serde_json::from_str(&cardsets)?;

        Ok(CardBox {
            id: BoxId(row.get(0)?),
            owner: row.get(1)?,
            title: row.get(2)?,
            cardsets: cardsets.into_iter().map(CollectionId).collect(),
            schedule_policy: row.get(4)?,
            last_studied: from_micros(row.get(5)?)?,
            time_studied: Duration::from_micros(row.get::<i64>(6)?.max(0) as u64),
        })
    }

    fn row_to_snapshot(row: &Row) -> Result<DailyStatsSnapshot> {
        let day: String = row.get(1)?;
        let intervals: String = row.get(8)?;
        let intervals: Vec<u32> = serde_json::from_str(&intervals)?;
        let intervals: [u32; NUM_INTERVALS] = intervals.try_into().map_err(|v: Vec<u32>| {
            CardboxError::Database(format!("Snapshot histogram has {} buckets", v.len()))
        })?;

        Ok(DailyStatsSnapshot {
            box_id: BoxId(row.get(0)?),
            day: NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| CardboxError::Database(format!("Invalid snapshot day {}: {}", day, e)))?,
            card_count: row.get::<i64>(2)? as u32,
            studied_count: row.get::<i64>(3)? as u32,
            learned_count: row.get::<i64>(4)? as u32,
            avg_interval: row.get(5)?,
            min_interval: row.get::<i64>(6)? as u8,
            max_interval: row.get::<i64>(7)? as u8,
            intervals,
        })
    }

    /// Append `filter` conditions to a `WHERE box_id = ?` clause
    fn push_filter(sql: &mut String, values: &mut Vec<Value>, filter: &CardFilter) {
        if let Some(enabled) = filter.enabled {
            sql.push_str(" AND enabled = ?");
            values.push(Value::Integer(enabled as i64));
        }
        if let Some(in_pool) = filter.in_active_pool {
            sql.push_str(" AND in_active_pool = ?");
            values.push(Value::Integer(in_pool as i64));
        }
        if let Some(t) = filter.due_before {
            sql.push_str(" AND learned_until < ?");
            values.push(Value::Integer(t.timestamp_micros()));
        }
        if let Some(t) = filter.learned_after {
            sql.push_str(" AND learned_until > ?");
            values.push(Value::Integer(t.timestamp_micros()));
        }
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| CardboxError::Database(format!("Timestamp out of range: {}", micros)))
}

fn order_column(order: CardOrder) -> Option<&'static str> {
    match order {
        CardOrder::Identity => None,
        CardOrder::LearnedUntil => Some("learned_until"),
        CardOrder::LastStudied => Some("last_studied"),
    }
}

const SNAPSHOT_COLUMNS: &str = "box_id, day, card_count, studied_count, learned_count, \
     avg_interval, min_interval, max_interval, intervals";

#[async_trait]
impl CardStore for LibsqlStore {
    async fn get_factsheet(&self, name: &str) -> Result<Option<Factsheet>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT content, modified FROM factsheets WHERE name = ?",
                params![name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let content: String = row.get(0)?;
                let modified = from_micros(row.get(1)?)?;
                Ok(Some(Factsheet::parse(name, &content, modified)?))
            }
            None => Ok(None),
        }
    }

    async fn put_factsheet(&self, factsheet: &Factsheet) -> Result<()> {
        debug!("Storing factsheet: {}", factsheet.name);
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO factsheets (name, content, modified) VALUES (?, ?, ?)",
            params![
                factsheet.name.clone(),
                factsheet.to_yaml()?,
                factsheet.modified.timestamp_micros()
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_cardset(&self, id: CollectionId) -> Result<Option<Cardset>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT id, title, owner, factsheet, template_name, public FROM cardsets WHERE id = ?",
                params![id.0],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_cardset(&row)?)),
            None => Ok(None),
        }
    }

    async fn put_cardset(&self, cardset: &Cardset) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cardsets (id, title, owner, factsheet, template_name, public)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                cardset.id.0,
                cardset.title.clone(),
                cardset.owner.clone(),
                cardset.factsheet.clone(),
                cardset.template_name.clone(),
                cardset.public as i64
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_cardsets(&self) -> Result<Vec<Cardset>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT id, title, owner, factsheet, template_name, public FROM cardsets ORDER BY id",
                params![],
            )
            .await?;

        let mut cardsets = Vec::new();
        while let Some(row) = rows.next().await? {
            cardsets.push(row_to_cardset(&row)?);
        }
        Ok(cardsets)
    }

    async fn get_box(&self, id: &BoxId) -> Result<Option<CardBox>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT id, owner, title, cardsets, schedule_policy, last_studied, time_studied \
                 FROM boxes WHERE id = ?",
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_box(&row)?)),
            None => Ok(None),
        }
    }

    async fn put_box(&self, card_box: &CardBox) -> Result<()> {
        debug!("Storing box: {}", card_box.id);
        let conn = self.get_conn()?;
        conn.execute(UPSERT_BOX, params_from_iter(Self::box_params(card_box)?))
            .await?;
        Ok(())
    }

    async fn get_card(&self, box_id: &BoxId, id: &CardId) -> Result<Option<Card>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM cards WHERE box_id = ? AND card_key = ?",
            CARD_COLUMNS
        );
        let mut rows = conn
            .query(&sql, params![box_id.to_string(), id.key()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_card(&row)?)),
            None => Ok(None),
        }
    }

    async fn put_cards(&self, box_id: &BoxId, cards: &[Card]) -> Result<()> {
        if cards.is_empty() {
            return Ok(());
        }
        debug!("Storing {} cards in box {}", cards.len(), box_id);

        let conn = self.get_conn()?;
        let tx = conn.transaction().await?;
        for card in cards {
            tx.execute(UPSERT_CARD, params_from_iter(Self::card_params(box_id, card)?))
                .await?;
        }
        tx.commit()
            .await
            .map_err(|e| CardboxError::Database(format!("Transaction commit failed: {}", e)))?;
        Ok(())
    }

    async fn delete_cards(&self, box_id: &BoxId, ids: &[CardId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        debug!("Deleting {} cards from box {}", ids.len(), box_id);

        let conn = self.get_conn()?;
        let tx = conn.transaction().await?;
        for id in ids {
            tx.execute(
                "DELETE FROM cards WHERE box_id = ? AND card_key = ?",
                params![box_id.to_string(), id.key()],
            )
            .await?;
        }
        tx.commit()
            .await
            .map_err(|e| CardboxError::Database(format!("Transaction commit failed: {}", e)))?;
        Ok(())
    }

    async fn query_cards(&self, query: &CardQuery) -> Result<Vec<Card>> {
        let mut sql = format!("SELECT {} FROM cards WHERE box_id = ?", CARD_COLUMNS);
        let mut values = vec![Value::Text(query.box_id.to_string())];
        Self::push_filter(&mut sql, &mut values, &query.filter);

        let column = order_column(query.order);
        if let Some(cp) = &query.after {
            match (column, cp.value) {
                (Some(column), Some(value)) => {
                    sql.push_str(&format!(
                        " AND ({col} > ? OR ({col} = ? AND card_key > ?))",
                        col = column
                    ));
                    values.push(Value::Integer(value.timestamp_micros()));
                    values.push(Value::Integer(value.timestamp_micros()));
                    values.push(Value::Text(cp.key.clone()));
                }
                _ => {
                    sql.push_str(" AND card_key > ?");
                    values.push(Value::Text(cp.key.clone()));
                }
            }
        }

        match column {
            Some(column) => sql.push_str(&format!(" ORDER BY {}, card_key", column)),
            None => sql.push_str(" ORDER BY card_key"),
        }
        sql.push_str(" LIMIT ?");
        values.push(Value::Integer(query.limit as i64));

        let conn = self.get_conn()?;
        let mut rows = conn.query(&sql, params_from_iter(values)).await?;
        let mut cards = Vec::new();
        while let Some(row) = rows.next().await? {
            cards.push(Self::row_to_card(&row)?);
        }

        debug!("Card query on box {} returned {} rows", query.box_id, cards.len());
        Ok(cards)
    }

    async fn count_cards(
        &self,
        box_id: &BoxId,
        filter: &CardFilter,
        limit: Option<usize>,
    ) -> Result<usize> {
        let mut inner = String::from("SELECT 1 FROM cards WHERE box_id = ?");
        let mut values = vec![Value::Text(box_id.to_string())];
        Self::push_filter(&mut inner, &mut values, filter);
        if let Some(limit) = limit {
            inner.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let conn = self.get_conn()?;
        let sql = format!("SELECT COUNT(*) FROM ({})", inner);
        let mut rows = conn.query(&sql, params_from_iter(values)).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count.max(0) as usize)
    }

    async fn commit_answer(&self, card_box: &CardBox, card: &Card) -> Result<()> {
        let conn = self.get_conn()?;
        let tx = conn.transaction().await?;
        tx.execute(
            UPSERT_CARD,
            params_from_iter(Self::card_params(&card_box.id, card)?),
        )
        .await?;
        tx.execute(UPSERT_BOX, params_from_iter(Self::box_params(card_box)?))
            .await?;
        tx.commit().await.map_err(|e| {
            let error_msg = e.to_string();
            if error_msg.contains("locked") || error_msg.contains("busy") {
                CardboxError::Database(
                    "Transaction failed: database is locked. Another process may be writing."
                        .to_string(),
                )
            } else {
                CardboxError::Database(format!("Transaction commit failed: {}", error_msg))
            }
        })?;
        Ok(())
    }

    async fn put_snapshot(&self, snapshot: &DailyStatsSnapshot) -> Result<bool> {
        let conn = self.get_conn()?;
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO daily_stats (
                    box_id, day, card_count, studied_count, learned_count,
                    avg_interval, min_interval, max_interval, intervals
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    snapshot.box_id.to_string(),
                    snapshot.day.format("%Y-%m-%d").to_string(),
                    i64::from(snapshot.card_count),
                    i64::from(snapshot.studied_count),
                    i64::from(snapshot.learned_count),
                    snapshot.avg_interval,
                    i64::from(snapshot.min_interval),
                    i64::from(snapshot.max_interval),
                    serde_json::to_string(&snapshot.intervals.to_vec())?
                ],
            )
            .await?;
        Ok(inserted > 0)
    }

    async fn get_snapshot(
        &self,
        box_id: &BoxId,
        day: NaiveDate,
    ) -> Result<Option<DailyStatsSnapshot>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM daily_stats WHERE box_id = ? AND day = ?",
            SNAPSHOT_COLUMNS
        );
        let mut rows = conn
            .query(
                &sql,
                params![box_id.to_string(), day.format("%Y-%m-%d").to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_snapshot(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_snapshots(
        &self,
        box_id: &BoxId,
        after: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<DailyStatsSnapshot>> {
        let after = after
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM daily_stats WHERE box_id = ? AND day > ? ORDER BY day LIMIT ?",
            SNAPSHOT_COLUMNS
        );

        let conn = self.get_conn()?;
        let mut rows = conn
            .query(&sql, params![box_id.to_string(), after, limit as i64])
            .await?;
        let mut snapshots = Vec::new();
        while let Some(row) = rows.next().await? {
            snapshots.push(Self::row_to_snapshot(&row)?);
        }
        Ok(snapshots)
    }

    async fn latest_snapshot(&self, box_id: &BoxId) -> Result<Option<DailyStatsSnapshot>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM daily_stats WHERE box_id = ? ORDER BY day DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        let mut rows = conn.query(&sql, params![box_id.to_string()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_snapshot(&row)?)),
            None => Ok(None),
        }
    }
}

fn row_to_cardset(row: &Row) -> Result<Cardset> {
    Ok(Cardset {
        id: CollectionId(row.get(0)?),
        title: row.get(1)?,
        owner: row.get(2)?,
        factsheet: row.get(3)?,
        template_name: row.get(4)?,
        public: row.get::<i64>(5)? != 0,
    })
}
