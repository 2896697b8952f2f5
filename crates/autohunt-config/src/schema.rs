use autohunt_core::{HuntError, Waypoint, WaypointId, WaypointMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration, maps to `autohunt.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    /// Behavior profile loaded into the controller at startup, if present.
    pub hunt: Option<HuntConfig>,
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Enable CORS (for a browser dashboard served elsewhere).
    pub cors: bool,
    /// Queue depth per status subscriber before it is dropped as too slow.
    pub status_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8001".into(),
            cors: false,
            status_buffer: 64,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding session records and saved profiles.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("autohunt.db"),
        }
    }
}

// ── Hunt profile ───────────────────────────────────────────────

/// The behavior profile: toggles, thresholds, action bindings, route and pacing.
///
/// The controller treats this as an immutable per-tick snapshot; edits made
/// while a run is active are installed at the next tick boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuntConfig {
    /// Display name of the profile.
    pub name: String,
    pub behavior: BehaviorConfig,
    pub thresholds: ThresholdConfig,
    pub actions: ActionConfig,
    pub chances: ChanceConfig,
    pub targeting: TargetingConfig,
    pub route: RouteConfig,
    pub timing: TimingConfig,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            behavior: BehaviorConfig::default(),
            thresholds: ThresholdConfig::default(),
            actions: ActionConfig::default(),
            chances: ChanceConfig::default(),
            targeting: TargetingConfig::default(),
            route: RouteConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Cast heal spells when HP or MP fall under their thresholds.
    pub heal: bool,
    pub food: bool,
    pub attack: bool,
    pub loot: bool,
    /// Follow the waypoint route.
    pub walk: bool,
    pub anti_idle: bool,
    /// Pick up everything on the loot list, then drop what is on the discard list.
    pub loot_all_and_filter: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            heal: true,
            food: true,
            attack: true,
            loot: true,
            walk: false,
            anti_idle: true,
            loot_all_and_filter: true,
        }
    }
}

/// Percent thresholds (0–100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub heal_at_hp: f64,
    pub heal_at_mp: f64,
    /// At or below this HP the run is halted immediately.
    pub emergency_logout_hp: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            heal_at_hp: 70.0,
            heal_at_mp: 50.0,
            emergency_logout_hp: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub heal_spell: String,
    pub mana_spell: String,
    pub attack_spell: String,
    pub food_hotkey: String,
    /// Keys pressed at random to look active.
    pub anti_idle_keys: Vec<String>,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            heal_spell: "exura".into(),
            mana_spell: "exura gran".into(),
            attack_spell: "exori".into(),
            food_hotkey: "F1".into(),
            anti_idle_keys: vec!["space".into(), "ctrl".into()],
        }
    }
}

/// Per-tick probabilities (0.0–1.0) for background and combat rolls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanceConfig {
    pub food: f64,
    pub anti_idle: f64,
    /// Chance that an attack finishes its target.
    pub kill: f64,
}

impl Default for ChanceConfig {
    fn default() -> Self {
        Self {
            food: 0.05,
            anti_idle: 0.02,
            kill: 0.30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetingConfig {
    /// Creature names eligible for attack.
    pub creatures: BTreeSet<String>,
    /// Item names to pick up.
    pub loot: BTreeSet<String>,
    /// Item names dropped right after pickup when `loot_all_and_filter` is on.
    pub discard: BTreeSet<String>,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        let set = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        Self {
            creatures: set(&["rat", "rotworm", "cyclops"]),
            loot: set(&["gold coin", "platinum coin", "crystal coin"]),
            discard: set(&["leather armor", "studded armor", "chain armor"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub mode: WaypointMode,
    /// Minimum milliseconds between two waypoint moves.
    pub delay_ms: u64,
    pub waypoints: Vec<Waypoint>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            mode: WaypointMode::Loop,
            delay_ms: 1000,
            waypoints: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Lower bound of the randomized pause between ticks.
    pub tick_min_ms: u64,
    /// Upper bound of the randomized pause between ticks.
    pub tick_max_ms: u64,
    /// Per-call timeout for perception and actuation.
    pub call_timeout_ms: u64,
    /// Seed for every random decision of a run. Unset = seeded from the OS.
    pub seed: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_min_ms: 500,
            tick_max_ms: 2000,
            call_timeout_ms: 5000,
            seed: None,
        }
    }
}

impl HuntConfig {
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.route.waypoints
    }

    pub fn add_waypoint(&mut self, waypoint: Waypoint) {
        self.route.waypoints.push(waypoint);
    }

    /// Remove a waypoint by id, returning it.
    pub fn remove_waypoint(&mut self, id: WaypointId) -> autohunt_core::Result<Waypoint> {
        let pos = self
            .route
            .waypoints
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| HuntError::WaypointNotFound(id.to_string()))?;
        Ok(self.route.waypoints.remove(pos))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timing.call_timeout_ms)
    }

    pub fn waypoint_delay(&self) -> Duration {
        Duration::from_millis(self.route.delay_ms)
    }

    /// Validate the profile and return a list of warnings/errors.
    pub fn check(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // ── Thresholds ───
        for (field, value) in [
            ("thresholds.heal_at_hp", self.thresholds.heal_at_hp),
            ("thresholds.heal_at_mp", self.thresholds.heal_at_mp),
            ("thresholds.emergency_logout_hp", self.thresholds.emergency_logout_hp),
        ] {
            if !(0.0..=100.0).contains(&value) {
                warnings.push(ConfigWarning::error(
                    field,
                    format!("{value} is not a percentage"),
                    Some("Use a value between 0 and 100"),
                ));
            }
        }
        if self.behavior.heal
            && self.thresholds.emergency_logout_hp >= self.thresholds.heal_at_hp
        {
            warnings.push(ConfigWarning::warning(
                "thresholds.emergency_logout_hp",
                format!(
                    "emergency logout at {}% fires before healing at {}%",
                    self.thresholds.emergency_logout_hp, self.thresholds.heal_at_hp
                ),
                Some("Keep emergency_logout_hp below heal_at_hp"),
            ));
        }

        // ── Chances ───
        for (field, value) in [
            ("chances.food", self.chances.food),
            ("chances.anti_idle", self.chances.anti_idle),
            ("chances.kill", self.chances.kill),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(ConfigWarning::error(
                    field,
                    format!("{value} is not a probability"),
                    Some("Use a value between 0.0 and 1.0"),
                ));
            }
        }

        // ── Timing ───
        if self.timing.tick_min_ms > self.timing.tick_max_ms {
            warnings.push(ConfigWarning::error(
                "timing.tick_min_ms",
                format!(
                    "tick window is empty ({} > {})",
                    self.timing.tick_min_ms, self.timing.tick_max_ms
                ),
                None,
            ));
        }
        if self.timing.call_timeout_ms == 0 {
            warnings.push(ConfigWarning::error(
                "timing.call_timeout_ms",
                "timeout is 0, every capture would fail".into(),
                Some("Set to e.g. 5000"),
            ));
        }

        // ── Route ───
        if self.behavior.walk && self.route.waypoints.is_empty() {
            warnings.push(ConfigWarning::warning(
                "route.waypoints",
                "walking is enabled but the route is empty".into(),
                None,
            ));
        }

        // ── Actions ───
        for (enabled, field, value) in [
            (self.behavior.heal, "actions.heal_spell", &self.actions.heal_spell),
            (self.behavior.heal, "actions.mana_spell", &self.actions.mana_spell),
            (self.behavior.attack, "actions.attack_spell", &self.actions.attack_spell),
            (self.behavior.food, "actions.food_hotkey", &self.actions.food_hotkey),
        ] {
            if enabled && value.trim().is_empty() {
                warnings.push(ConfigWarning::warning(field, "is empty".into(), None));
            }
        }
        if self.behavior.anti_idle && self.actions.anti_idle_keys.is_empty() {
            warnings.push(ConfigWarning::info(
                "actions.anti_idle_keys",
                "anti-idle is enabled without keys, it will never fire".into(),
            ));
        }

        warnings
    }

    /// Like [`HuntConfig::check`], but the first error becomes a `ConfigValidation` error.
    pub fn validate(&self) -> autohunt_core::Result<Vec<ConfigWarning>> {
        let warnings = self.check();
        if let Some(err) = warnings
            .iter()
            .find(|w| w.severity == WarningSeverity::Error)
        {
            return Err(HuntError::ConfigValidation {
                field: err.field.clone(),
                reason: err.message.clone(),
            });
        }
        Ok(warnings)
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl ConfigWarning {
    fn error(field: &str, message: String, hint: Option<&str>) -> Self {
        Self {
            field: field.into(),
            message,
            severity: WarningSeverity::Error,
            hint: hint.map(Into::into),
        }
    }

    fn warning(field: &str, message: String, hint: Option<&str>) -> Self {
        Self {
            field: field.into(),
            message,
            severity: WarningSeverity::Warning,
            hint: hint.map(Into::into),
        }
    }

    fn info(field: &str, message: String) -> Self {
        Self {
            field: field.into(),
            message,
            severity: WarningSeverity::Info,
            hint: None,
        }
    }
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl AppConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            warnings.push(ConfigWarning::error(
                "server.listen",
                format!("'{}' is not a socket address", self.server.listen),
                Some("Use host:port, e.g. 127.0.0.1:8001"),
            ));
        }
        if self.server.status_buffer == 0 {
            warnings.push(ConfigWarning::warning(
                "server.status_buffer",
                "0 is raised to 1".into(),
                None,
            ));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning::warning(
                "logging.format",
                format!("unknown format '{}'", self.logging.format),
                Some("Valid values: pretty, json"),
            ));
        }

        if let Some(ref hunt) = self.hunt {
            for mut w in hunt.check() {
                w.field = format!("hunt.{}", w.field);
                warnings.push(w);
            }
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| w.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(errors.join("\n"));
        }
        Ok(warnings)
    }
}
