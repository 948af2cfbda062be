//! Reschedule policies
//!
//! A box names its policy by identifier. Policies are a closed set; an
//! unknown identifier, or a policy result that would put `learned_until`
//! before `last_studied`, falls back to [`SchedulePolicy::Linear`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::clock::truncate_secs;
use crate::error::{CardboxError, Result};
use crate::types::Card;

/// Computes when a card becomes due again
pub trait ReschedulePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// New `learned_until` for a card whose answer fields are already updated
    fn reschedule(&self, card: &Card) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// `max(last_studied + 1 min, last_correct + (interval - 1) * 4 days)`
    #[default]
    Linear,

    /// `max(last_studied + 1 min, last_correct + (2^(interval - 1) - 1) days)`
    Exponential,
}

impl SchedulePolicy {
    pub const ALL: [SchedulePolicy; 2] = [SchedulePolicy::Linear, SchedulePolicy::Exponential];

    /// Strict lookup, for validating authored scheduler pages
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == name)
            .ok_or_else(|| CardboxError::InvalidPolicy(format!("unknown policy '{}'", name)))
    }

    /// Lenient lookup used at study time
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|_| {
            warn!("Unknown schedule policy '{}', using linear", name);
            SchedulePolicy::Linear
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulePolicy::Linear => "linear",
            SchedulePolicy::Exponential => "exponential",
        }
    }

    fn raw_due(&self, card: &Card) -> Option<DateTime<Utc>> {
        let steps = i64::from(card.interval.max(1)) - 1;
        let wait = match self {
            SchedulePolicy::Linear => Duration::try_days(steps * 4)?,
            SchedulePolicy::Exponential => {
                let days = 1i64.checked_shl(u32::try_from(steps).ok()?)? - 1;
                Duration::try_days(days)?
            }
        };
        let earliest = card.last_studied.checked_add_signed(Duration::minutes(1))?;
        let by_interval = card.last_correct.checked_add_signed(wait)?;
        Some(earliest.max(by_interval))
    }
}

impl ReschedulePolicy for SchedulePolicy {
    fn name(&self) -> &'static str {
        self.as_str()
    }

    fn reschedule(&self, card: &Card) -> DateTime<Utc> {
        match self.raw_due(card).map(truncate_secs) {
            Some(due) if due >= card.last_studied => due,
            _ if *self != SchedulePolicy::Linear => {
                warn!(
                    "Policy {} produced an invalid due date for card {}, using linear",
                    self, card.id
                );
                SchedulePolicy::Linear.reschedule(card)
            }
            // Linear only overflows on timestamps near the end of chrono's range
            _ => truncate_secs(card.last_studied) + Duration::seconds(60),
        }
    }
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SchedulePolicy {
    type Err = CardboxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CardId, CollectionId};
    use chrono::TimeZone;

    fn card_at(interval: u8, last_correct: DateTime<Utc>, last_studied: DateTime<Utc>) -> Card {
        let mut card = Card::new(CardId::new(CollectionId(1), "a"), last_studied);
        card.interval = interval;
        card.last_correct = last_correct;
        card.last_studied = last_studied;
        card
    }

    #[test]
    fn test_linear_uses_interval_days() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let card = card_at(6, t, t);
        assert_eq!(SchedulePolicy::Linear.reschedule(&card), t + Duration::days(20));
    }

    #[test]
    fn test_linear_minimum_is_one_minute_after_study() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let card = card_at(1, t - Duration::days(3), t);
        assert_eq!(SchedulePolicy::Linear.reschedule(&card), t + Duration::minutes(1));
    }

    #[test]
    fn test_result_is_truncated_to_seconds() {
        let t = Utc.timestamp_opt(1_700_000_000, 987_654_000).unwrap();
        let card = card_at(1, t, t);
        let due = SchedulePolicy::Linear.reschedule(&card);
        assert_eq!(due.timestamp_subsec_nanos(), 0);
        assert!(due >= card.last_studied);
    }

    #[test]
    fn test_exponential_doubles() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let card = card_at(4, t, t);
        assert_eq!(SchedulePolicy::Exponential.reschedule(&card), t + Duration::days(7));
    }

    #[test]
    fn test_unknown_policy_fails_closed() {
        assert_eq!(SchedulePolicy::resolve("lambda c: c.interval * 9"), SchedulePolicy::Linear);
        assert!(SchedulePolicy::from_name("bogus").is_err());
        assert_eq!("exponential".parse::<SchedulePolicy>().unwrap(), SchedulePolicy::Exponential);
    }
}
