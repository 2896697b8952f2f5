//! Capability seams to the game client.
//!
//! Screen capture, recognition and input simulation live outside this
//! workspace. The decision loop only ever talks to these two traits, and treats
//! every call as blocking I/O that may fail or time out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::PerceptionSnapshot;

/// Pointer button used for a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Produces a perception snapshot on demand.
#[async_trait]
pub trait GameStateSource: Send + Sync {
    /// Human-readable name for logs, e.g. "screen", "simulated".
    fn name(&self) -> &str;

    /// Capture the current game state. `PerceptionUnavailable` when the game
    /// window cannot be read this time around.
    async fn capture(&self) -> crate::Result<PerceptionSnapshot>;
}

/// Executes input actions against the game client.
#[async_trait]
pub trait Actuator: Send + Sync {
    fn name(&self) -> &str;

    /// Type and submit a spell incantation.
    async fn cast(&self, spell: &str) -> crate::Result<()>;

    /// Press a single hotkey, e.g. "F1" or "space".
    async fn hotkey(&self, key: &str) -> crate::Result<()>;

    async fn click_at(&self, x: i32, y: i32, button: MouseButton) -> crate::Result<()>;

    /// Walk the character towards a map position.
    async fn move_to(&self, x: i32, y: i32) -> crate::Result<()>;

    /// Drop an unwanted item from the backpack.
    async fn drop_item(&self, item: &str) -> crate::Result<()>;
}
