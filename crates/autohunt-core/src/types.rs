use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a hunting session (one per Stopped → Running transition).
pub type SessionId = Uuid;

/// Unique identifier for a waypoint.
pub type WaypointId = Uuid;

/// Integer game/screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ── Waypoints ──────────────────────────────────────────────────

/// A named point on the hunting route. Immutable once created; removal is by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(default = "Uuid::new_v4")]
    pub id: WaypointId,
    pub name: String,
    pub x: i32,
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            x,
            y,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// How the navigator walks the waypoint list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointMode {
    /// A → B → C → A → …
    #[default]
    Loop,
    /// A → B → C → B → A → …
    BackAndForth,
    /// A → B → C, then the route is complete.
    Once,
}

impl fmt::Display for WaypointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loop => "loop",
            Self::BackAndForth => "back_and_forth",
            Self::Once => "once",
        })
    }
}

// ── Perception ─────────────────────────────────────────────────

/// A current/max resource bar (HP or MP) with its derived percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vital {
    pub current: u32,
    pub max: u32,
    pub percent: f64,
}

impl Vital {
    pub fn new(current: u32, max: u32) -> Self {
        let percent = if max == 0 {
            0.0
        } else {
            (current as f64 / max as f64) * 100.0
        };
        Self {
            current,
            max,
            percent,
        }
    }

    /// A bar where only the fill ratio is known (e.g. from bar color analysis).
    pub fn from_percent(percent: f64) -> Self {
        let percent = percent.clamp(0.0, 100.0);
        Self {
            current: percent.round() as u32,
            max: 100,
            percent,
        }
    }

    pub fn full() -> Self {
        Self::new(100, 100)
    }
}

/// A creature recognised on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creature {
    pub name: String,
    pub position: Position,
    /// Distance from the player, in squares.
    pub distance: u32,
    /// Estimated health, 0–100.
    pub health: u8,
}

impl Creature {
    pub fn new(name: impl Into<String>, position: Position, distance: u32) -> Self {
        Self {
            name: name.into(),
            position,
            distance,
            health: 100,
        }
    }
}

/// An item lying on the ground that may be picked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootItem {
    pub name: String,
    pub position: Position,
    pub value: u64,
}

impl LootItem {
    pub fn new(name: impl Into<String>, position: Position, value: u64) -> Self {
        Self {
            name: name.into(),
            position,
            value,
        }
    }
}

/// A point-in-time, read-only view of the game produced once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub hp: Vital,
    pub mp: Vital,
    pub alive: bool,
    pub player: Position,
    /// Sorted by ascending distance; ties keep detection order.
    pub creatures: Vec<Creature>,
    pub loot: Vec<LootItem>,
    /// Set by the source from its clock. The Unix epoch until stamped.
    pub captured_at: DateTime<Utc>,
}

impl PerceptionSnapshot {
    pub fn new(hp: Vital, mp: Vital) -> Self {
        Self {
            alive: hp.percent > 0.0,
            hp,
            mp,
            player: Position::default(),
            creatures: Vec::new(),
            loot: Vec::new(),
            captured_at: DateTime::<Utc>::default(),
        }
    }

    /// Attach detected creatures, sorting them by distance. The sort is stable,
    /// so creatures at the same distance keep their detection order.
    pub fn with_creatures(mut self, mut creatures: Vec<Creature>) -> Self {
        creatures.sort_by_key(|c| c.distance);
        self.creatures = creatures;
        self
    }

    pub fn with_loot(mut self, loot: Vec<LootItem>) -> Self {
        self.loot = loot;
        self
    }

    pub fn with_player(mut self, player: Position) -> Self {
        self.player = player;
        self
    }

    pub fn with_captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }
}

// ── Run state ──────────────────────────────────────────────────

/// Lifecycle of the decision loop. Exactly one value per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl RunState {
    /// Running or paused: a session exists.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
        })
    }
}

/// Derived game-state summary published alongside stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub hp_percent: f64,
    pub mp_percent: f64,
    pub alive: bool,
    pub target_creature: Option<String>,
    pub position: Option<Position>,
    pub waypoint_index: Option<usize>,
}

impl GameSummary {
    pub fn observe(&mut self, snapshot: &PerceptionSnapshot) {
        self.hp_percent = snapshot.hp.percent;
        self.mp_percent = snapshot.mp.percent;
        self.alive = snapshot.alive;
        self.position = Some(snapshot.player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vital_percent_handles_zero_max() {
        assert_eq!(Vital::new(10, 0).percent, 0.0);
        assert_eq!(Vital::new(50, 200).percent, 25.0);
    }

    #[test]
    fn creatures_sorted_stably_by_distance() {
        let snap = PerceptionSnapshot::new(Vital::full(), Vital::full()).with_creatures(vec![
            Creature::new("rotworm", Position::new(1, 1), 4),
            Creature::new("rat", Position::new(2, 2), 2),
            Creature::new("cyclops", Position::new(3, 3), 2),
        ]);
        let names: Vec<_> = snap.creatures.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["rat", "cyclops", "rotworm"]);
    }

    #[test]
    fn waypoint_id_generated_when_missing() {
        let wp: Waypoint = serde_json::from_str(r#"{"name":"A","x":1,"y":2}"#).unwrap();
        assert_eq!(wp.position(), Position::new(1, 2));
        assert!(wp.description.is_none());
        assert!(!wp.id.is_nil());
    }

    #[test]
    fn waypoint_mode_serde_names() {
        let mode: WaypointMode = serde_json::from_str("\"back_and_forth\"").unwrap();
        assert_eq!(mode, WaypointMode::BackAndForth);
        assert_eq!(mode.to_string(), "back_and_forth");
    }
}
