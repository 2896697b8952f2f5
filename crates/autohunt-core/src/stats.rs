use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HuntError;
use crate::types::SessionId;

/// The fixed set of session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    HealsUsed,
    FoodUsed,
    AttacksMade,
    CreaturesKilled,
    ItemsLooted,
    ItemsDiscarded,
    ExpGained,
}

impl Counter {
    pub const ALL: [Counter; 7] = [
        Counter::HealsUsed,
        Counter::FoodUsed,
        Counter::AttacksMade,
        Counter::CreaturesKilled,
        Counter::ItemsLooted,
        Counter::ItemsDiscarded,
        Counter::ExpGained,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealsUsed => "heals_used",
            Self::FoodUsed => "food_used",
            Self::AttacksMade => "attacks_made",
            Self::CreaturesKilled => "creatures_killed",
            Self::ItemsLooted => "items_looted",
            Self::ItemsDiscarded => "items_discarded",
            Self::ExpGained => "exp_gained",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Counter {
    type Err = HuntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Counter::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| HuntError::UnknownCounter(s.to_string()))
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Stopped,
    Emergency,
}

/// Statistics for one hunting session. Also the persisted session record
/// once `ended_at` is stamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: SessionId,
    pub heals_used: u64,
    pub food_used: u64,
    pub attacks_made: u64,
    pub creatures_killed: u64,
    pub items_looted: u64,
    pub items_discarded: u64,
    pub exp_gained: u64,
    pub time_running_secs: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_reason: Option<EndReason>,
}

impl SessionStats {
    pub fn new(session_id: SessionId, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            heals_used: 0,
            food_used: 0,
            attacks_made: 0,
            creatures_killed: 0,
            items_looted: 0,
            items_discarded: 0,
            exp_gained: 0,
            time_running_secs: 0,
            created_at,
            ended_at: None,
            end_reason: None,
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::HealsUsed => self.heals_used,
            Counter::FoodUsed => self.food_used,
            Counter::AttacksMade => self.attacks_made,
            Counter::CreaturesKilled => self.creatures_killed,
            Counter::ItemsLooted => self.items_looted,
            Counter::ItemsDiscarded => self.items_discarded,
            Counter::ExpGained => self.exp_gained,
        }
    }

    fn slot(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::HealsUsed => &mut self.heals_used,
            Counter::FoodUsed => &mut self.food_used,
            Counter::AttacksMade => &mut self.attacks_made,
            Counter::CreaturesKilled => &mut self.creatures_killed,
            Counter::ItemsLooted => &mut self.items_looted,
            Counter::ItemsDiscarded => &mut self.items_discarded,
            Counter::ExpGained => &mut self.exp_gained,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Mutable counters for the active session.
///
/// Counters only ever grow; the only way back to zero is [`StatsTracker::reset`],
/// which starts a new session. Readers get copies via [`StatsTracker::snapshot`].
#[derive(Debug, Clone)]
pub struct StatsTracker {
    stats: SessionStats,
}

impl StatsTracker {
    pub fn new(session_id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            stats: SessionStats::new(session_id, now),
        }
    }

    /// Replace every counter with zero under a new session identity.
    pub fn reset(&mut self, session_id: SessionId, now: DateTime<Utc>) {
        self.stats = SessionStats::new(session_id, now);
    }

    /// Increment a counter by name. Unknown names are rejected, never ignored.
    pub fn increment(&mut self, counter: &str, amount: u64) -> crate::Result<u64> {
        let counter = counter.parse::<Counter>()?;
        Ok(self.bump(counter, amount))
    }

    pub fn bump(&mut self, counter: Counter, amount: u64) -> u64 {
        let slot = self.stats.slot(counter);
        *slot = slot.saturating_add(amount);
        *slot
    }

    /// Record elapsed running time. Never moves backwards.
    pub fn set_elapsed(&mut self, secs: u64) {
        self.stats.time_running_secs = self.stats.time_running_secs.max(secs);
    }

    /// Stamp the end of the session. Idempotent: the first stamp wins.
    pub fn finalize(&mut self, now: DateTime<Utc>, reason: EndReason) -> SessionStats {
        if self.stats.ended_at.is_none() {
            self.stats.ended_at = Some(now);
            self.stats.end_reason = Some(reason);
        }
        self.stats.clone()
    }

    pub fn session_id(&self) -> SessionId {
        self.stats.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.stats.created_at
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.stats.get(counter)
    }

    pub fn snapshot(&self) -> SessionStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn increment_by_name() {
        let mut t = StatsTracker::new(Uuid::new_v4(), Utc::now());
        assert_eq!(t.increment("heals_used", 1).unwrap(), 1);
        assert_eq!(t.increment("heals_used", 2).unwrap(), 3);
        assert_eq!(t.get(Counter::HealsUsed), 3);
    }

    #[test]
    fn unknown_counter_rejected() {
        let mut t = StatsTracker::new(Uuid::new_v4(), Utc::now());
        let err = t.increment("heal_used", 1).unwrap_err();
        assert!(matches!(err, HuntError::UnknownCounter(ref n) if n == "heal_used"));
        assert_eq!(t.snapshot().heals_used, 0);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut t = StatsTracker::new(Uuid::new_v4(), Utc::now());
        for c in Counter::ALL {
            t.bump(c, 5);
        }
        t.set_elapsed(30);
        let next = Uuid::new_v4();
        t.reset(next, Utc::now());
        let snap = t.snapshot();
        assert_eq!(snap.session_id, next);
        assert!(Counter::ALL.iter().all(|c| snap.get(*c) == 0));
        assert_eq!(snap.time_running_secs, 0);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut t = StatsTracker::new(Uuid::new_v4(), Utc::now());
        let before = t.snapshot();
        t.bump(Counter::ItemsLooted, 1);
        assert_eq!(before.items_looted, 0);
        assert_eq!(t.snapshot().items_looted, 1);
    }

    #[test]
    fn elapsed_never_decreases() {
        let mut t = StatsTracker::new(Uuid::new_v4(), Utc::now());
        t.set_elapsed(10);
        t.set_elapsed(4);
        assert_eq!(t.snapshot().time_running_secs, 10);
    }

    #[test]
    fn finalize_keeps_first_stamp() {
        let mut t = StatsTracker::new(Uuid::new_v4(), Utc::now());
        let first = t.finalize(Utc::now(), EndReason::Emergency);
        let second = t.finalize(Utc::now() + chrono::Duration::seconds(5), EndReason::Stopped);
        assert_eq!(first.ended_at, second.ended_at);
        assert_eq!(second.end_reason, Some(EndReason::Emergency));
    }
}
