//! A simulated game for running the loop without a game client.
//!
//! [`SimulatedGame`] invents plausible snapshots from a seeded rng and
//! [`DryRunActuator`] logs actions instead of performing them.

use async_trait::async_trait;
use autohunt_core::{
    Actuator, Clock, Creature, GameStateSource, LootItem, MouseButton, PerceptionSnapshot,
    Position, Result, SystemClock, Vital,
};
use parking_lot::Mutex;
use std::sync::Arc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::policy::chance;

/// Known loot and its value in gold.
const LOOT_VALUES: &[(&str, u64)] = &[
    ("gold coin", 1),
    ("platinum coin", 100),
    ("crystal coin", 10_000),
    ("small ruby", 250),
    ("small emerald", 250),
    ("small sapphire", 250),
];

const CREATURE_SPOT_CHANCE: f64 = 0.15;
const LOOT_SPOT_CHANCE: f64 = 0.08;

pub struct SimulatedGame {
    rng: Mutex<StdRng>,
    clock: Arc<dyn Clock>,
    creatures: Vec<String>,
    loot: Vec<String>,
}

impl SimulatedGame {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            clock: Arc::new(SystemClock),
            creatures: vec!["rat".into(), "rotworm".into(), "cyclops".into()],
            loot: LOOT_VALUES.iter().map(|(name, _)| name.to_string()).collect(),
        }
    }

    /// Clock used to stamp each snapshot.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creature names that may show up on screen.
    pub fn with_creatures(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.creatures = names.into_iter().collect();
        self
    }

    /// Item names that may show up on the ground.
    pub fn with_loot(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.loot = names.into_iter().collect();
        self
    }

    fn value_of(name: &str) -> u64 {
        LOOT_VALUES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }
}

#[async_trait]
impl GameStateSource for SimulatedGame {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn capture(&self) -> Result<PerceptionSnapshot> {
        let mut rng = self.rng.lock();

        let hp = Vital::new(rng.gen_range(50..=100), rng.gen_range(100..=150));
        let mp = Vital::new(rng.gen_range(50..=100), rng.gen_range(100..=150));
        let player = Position::new(rng.gen_range(1000..=1100), rng.gen_range(1000..=1100));

        let mut creatures = Vec::new();
        for name in &self.creatures {
            if chance(CREATURE_SPOT_CHANCE, &mut *rng) {
                let mut creature = Creature::new(
                    name.clone(),
                    Position::new(rng.gen_range(300..=850), rng.gen_range(150..=550)),
                    rng.gen_range(1..=7),
                );
                creature.health = rng.gen_range(50..=100);
                creatures.push(creature);
            }
        }

        let mut loot = Vec::new();
        for name in &self.loot {
            if chance(LOOT_SPOT_CHANCE, &mut *rng) {
                loot.push(LootItem::new(
                    name.clone(),
                    Position::new(rng.gen_range(400..=750), rng.gen_range(250..=450)),
                    Self::value_of(name),
                ));
            }
        }

        Ok(PerceptionSnapshot::new(hp, mp)
            .with_player(player)
            .with_creatures(creatures)
            .with_loot(loot)
            .with_captured_at(self.clock.now()))
    }
}

/// Logs every action at info level and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActuator;

#[async_trait]
impl Actuator for DryRunActuator {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn cast(&self, spell: &str) -> Result<()> {
        info!(spell, "cast");
        Ok(())
    }

    async fn hotkey(&self, key: &str) -> Result<()> {
        info!(key, "hotkey");
        Ok(())
    }

    async fn click_at(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        info!(x, y, %button, "click");
        Ok(())
    }

    async fn move_to(&self, x: i32, y: i32) -> Result<()> {
        info!(x, y, "move");
        Ok(())
    }

    async fn drop_item(&self, item: &str) -> Result<()> {
        info!(item, "drop item");
        Ok(())
    }
}
