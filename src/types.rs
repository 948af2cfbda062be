//! Core data types for the Cardbox study system
//!
//! This module defines the fundamental data structures used throughout cardbox,
//! including boxes, cards, their review history and the daily statistics
//! snapshots. Cards are addressed by `(box, card id)`; nothing here holds a
//! live reference to its owner.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::CardboxError;

/// Number of interval levels; intervals live in `1..=NUM_INTERVALS`
pub const NUM_INTERVALS: usize = 12;

/// Separator between collection id and row id in persisted card keys
pub const CARD_KEY_SEPARATOR: char = '-';

/// `last_studied` of a card that was never presented (2010-01-01)
pub fn never_studied() -> DateTime<Utc> {
    Utc.timestamp_opt(1_262_304_000, 0).single().unwrap_or_default()
}

/// `last_correct` and `learned_until` of a fresh card (2010-01-02)
pub fn never_learned() -> DateTime<Utc> {
    Utc.timestamp_opt(1_262_390_400, 0).single().unwrap_or_default()
}

/// Unique identifier for boxes
///
/// Wraps a string so ids minted by older deployments stay addressable;
/// new boxes get a UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxId(pub String);

impl BoxId {
    /// Create a new random box ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BoxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BoxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Numeric id of a cardset (a subscription to one factsheet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub i64);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a factsheet row (URL-safe base64 of its first cell)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub String);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card identity: one row of one collection
///
/// Persisted as `"{collection}-{row}"`. Row ids may themselves contain the
/// separator, so parsing splits on the first one only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CardId {
    pub collection: CollectionId,
    pub row: RowId,
}

impl CardId {
    pub fn new(collection: CollectionId, row: impl Into<String>) -> Self {
        Self {
            collection,
            row: RowId(row.into()),
        }
    }

    /// Storage key of this card
    pub fn key(&self) -> String {
        format!("{}{}{}", self.collection, CARD_KEY_SEPARATOR, self.row)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.collection, CARD_KEY_SEPARATOR, self.row)
    }
}

impl FromStr for CardId {
    type Err = CardboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (collection, row) = s
            .split_once(CARD_KEY_SEPARATOR)
            .ok_or_else(|| CardboxError::InvalidCardId(s.to_string()))?;
        let collection = collection
            .parse::<i64>()
            .map_err(|_| CardboxError::InvalidCardId(s.to_string()))?;
        if row.is_empty() {
            return Err(CardboxError::InvalidCardId(s.to_string()));
        }
        Ok(Self::new(CollectionId(collection), row))
    }
}

impl From<CardId> for String {
    fn from(id: CardId) -> Self {
        id.key()
    }
}

impl TryFrom<String> for CardId {
    type Error = CardboxError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One line of a card's review log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub interval: u8,
    pub learned_until: DateTime<Utc>,
}

/// Replayed state of a card at a past date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardState {
    pub interval: u8,
    pub studied: bool,
    pub learned: bool,
}

impl Default for CardState {
    fn default() -> Self {
        Self {
            interval: 1,
            studied: false,
            learned: false,
        }
    }
}

/// Materialized, schedulable card of one box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub enabled: bool,
    pub in_active_pool: bool,
    pub last_correct: DateTime<Utc>,
    pub last_studied: DateTime<Utc>,
    pub learned_until: DateTime<Utc>,
    /// Spaced-repetition strength, 1 (new) to 12 (long-term)
    pub interval: u8,
    pub correct_count: u32,
    pub wrong_count: u32,
    /// Last time the reconciler or the scheduler changed this record
    pub modified: DateTime<Utc>,
    pub history: Vec<HistoryEntry>,
}

impl Card {
    /// A fresh, enabled card that is immediately due
    pub fn new(id: CardId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            enabled: true,
            in_active_pool: false,
            last_correct: never_learned(),
            last_studied: never_studied(),
            learned_until: never_learned(),
            interval: 1,
            correct_count: 0,
            wrong_count: 0,
            modified: now,
            history: Vec::new(),
        }
    }

    pub fn is_learned(&self, now: DateTime<Utc>) -> bool {
        self.learned_until > now
    }

    pub fn has_been_studied(&self) -> bool {
        !self.history.is_empty()
    }

    /// State as of the start of `date` (UTC), replayed from the history
    pub fn state_at(&self, date: NaiveDate) -> CardState {
        let cutoff = start_of_day(date);
        self.history
            .iter()
            .filter(|entry| entry.at < cutoff)
            .last()
            .map(|entry| CardState {
                interval: entry.interval,
                studied: true,
                learned: cutoff < entry.learned_until,
            })
            .unwrap_or_default()
    }
}

/// Midnight UTC of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// A user's study context over one or more cardsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardBox {
    pub id: BoxId,
    pub owner: String,
    pub title: String,
    /// Subscribed cardsets
    pub cardsets: Vec<CollectionId>,
    /// Identifier of the reschedule policy, see [`crate::study::SchedulePolicy`]
    pub schedule_policy: String,
    pub last_studied: DateTime<Utc>,
    #[serde(with = "serde_duration_micros")]
    pub time_studied: Duration,
}

impl CardBox {
    pub fn new(owner: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: BoxId::new(),
            owner: owner.into(),
            title: title.into(),
            cardsets: Vec::new(),
            schedule_policy: "linear".to_string(),
            last_studied: never_studied(),
            time_studied: Duration::ZERO,
        }
    }
}

/// Immutable per-day summary of a box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatsSnapshot {
    pub box_id: BoxId,
    pub day: NaiveDate,
    /// Enabled cards seen by the aggregation
    pub card_count: u32,
    pub studied_count: u32,
    pub learned_count: u32,
    pub avg_interval: f64,
    pub min_interval: u8,
    pub max_interval: u8,
    pub intervals: [u32; NUM_INTERVALS],
}

/// Live learning summary of a box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub percent_learned: f64,
    pub learned_count: usize,
    pub card_count: usize,
}

// Custom serde module for Duration (serialize/deserialize as microseconds)
mod serde_duration_micros {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_micros().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(micros))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_card_id_round_trips_through_key() {
        let id = CardId::new(CollectionId(42), "aGVsbG8");
        assert_eq!(id.key(), "42-aGVsbG8");
        assert_eq!("42-aGVsbG8".parse::<CardId>().unwrap(), id);
    }

    #[test]
    fn test_card_id_splits_on_first_separator() {
        let id: CardId = "7-a-b-c".parse().unwrap();
        assert_eq!(id.collection, CollectionId(7));
        assert_eq!(id.row, RowId("a-b-c".to_string()));
    }

    #[test]
    fn test_card_id_rejects_malformed_keys() {
        assert!("nodash".parse::<CardId>().is_err());
        assert!("x-row".parse::<CardId>().is_err());
        assert!("3-".parse::<CardId>().is_err());
    }

    #[test]
    fn test_card_id_serializes_as_key() {
        let id = CardId::new(CollectionId(3), "cm93");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"3-cm93\"");
    }

    #[test]
    fn test_fresh_card_is_due_and_ordered() {
        let now = Utc::now();
        let card = Card::new(CardId::new(CollectionId(1), "a"), now);
        assert!(card.enabled);
        assert!(!card.is_learned(now));
        assert!(card.learned_until >= card.last_studied);
        assert_eq!(card.interval, 1);
    }

    #[test]
    fn test_state_at_replays_history_before_date() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let midnight = start_of_day(day);
        let mut card = Card::new(CardId::new(CollectionId(1), "a"), midnight);
        card.history.push(HistoryEntry {
            at: midnight - ChronoDuration::days(2),
            correct_count: 1,
            wrong_count: 0,
            interval: 2,
            learned_until: midnight + ChronoDuration::days(2),
        });
        card.history.push(HistoryEntry {
            at: midnight + ChronoDuration::hours(3),
            correct_count: 2,
            wrong_count: 0,
            interval: 3,
            learned_until: midnight + ChronoDuration::days(8),
        });

        let state = card.state_at(day);
        assert_eq!(state.interval, 2);
        assert!(state.studied);
        assert!(state.learned);

        let before = card.state_at(day - ChronoDuration::days(5));
        assert_eq!(before, CardState::default());
    }

    #[test]
    fn test_time_studied_keeps_fractional_seconds() {
        let mut card_box = CardBox::new("ann", "French");
        card_box.time_studied = Duration::from_millis(302_500);

        let json = serde_json::to_value(&card_box).unwrap();
        assert_eq!(json["time_studied"], 302_500_000);
        let back: CardBox = serde_json::from_value(json).unwrap();
        assert_eq!(back.time_studied, Duration::from_millis(302_500));
    }
}
