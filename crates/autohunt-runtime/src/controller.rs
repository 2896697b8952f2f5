//! # Decision loop controller
//!
//! Owns the `Stopped → Running ⇄ Paused → Stopped` lifecycle and the tick body.
//!
//! All loop state (run state, configuration, navigator, stats, rng) sits
//! behind one mutex. The lock is never held across a call into the game:
//! a tick takes what it needs, releases the lock for perception and
//! actuation, and re-checks the run before every actuator call and before
//! committing results. A tick that started before `stop()` therefore never
//! issues a new command once the stop is visible.
//!
//! Each run gets a generation number and a [`CancellationToken`]. A loop
//! task or an in-flight tick that belongs to an older generation finds
//! nothing to do and exits.

use autohunt_config::{ConfigWarning, HuntConfig};
use autohunt_core::{
    Actuator, Clock, Counter, EndReason, GameStateSource, GameSummary, HuntError, MouseButton,
    Position, Result, RunState, SessionId, SessionStats, StatsTracker,
    StatusBroadcaster, StatusEvent, StatusKind, Subscription, SystemClock, Waypoint, WaypointId,
};
use futures::FutureExt;
use parking_lot::{Mutex, MutexGuard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::navigator::{self, NavigatorState};
use crate::policy::{Decision, Intent, PolicyEngine};

/// Callback receiving the finalized record of every session that ends.
pub type SessionEndHook = Arc<dyn Fn(&SessionStats) + Send + Sync>;

/// Whether `start()` spawns the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// A background task ticks on the jittered schedule.
    #[default]
    Spawned,
    /// Nothing ticks unless the owner calls [`Controller::tick`].
    Manual,
}

/// Result of `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub session_id: SessionId,
    /// The loop was already active; nothing was reset.
    pub already_running: bool,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Paused: no perception, actuation or stats.
    Idle,
    /// Perception failed or timed out; nothing changed.
    Skipped,
    Acted { executed: usize, failed: usize },
    /// Emergency threshold reached; the run is over.
    Halted,
    /// The run this tick belonged to is gone.
    Inactive,
}

/// Point-in-time view returned by [`Controller::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub run_state: RunState,
    pub session_id: Option<SessionId>,
    pub stats: Option<SessionStats>,
    pub game: GameSummary,
    pub config_loaded: bool,
    pub subscribers: usize,
}

struct LoopState {
    run_state: RunState,
    /// Configuration the current (or next) run uses.
    config: Option<Arc<HuntConfig>>,
    /// Edits made while a run is active; installed at the next tick boundary.
    pending: Option<Arc<HuntConfig>>,
    navigator: NavigatorState,
    route_complete: bool,
    /// `None` until the first run starts; keeps the last record afterwards.
    stats: Option<StatsTracker>,
    game: GameSummary,
    rng: StdRng,
    generation: u64,
    cancel: Option<CancellationToken>,
    ticks: u64,
}

impl LoopState {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.run_state.is_active()
    }

    /// The configuration edits should start from.
    fn latest_config(&self) -> Option<Arc<HuntConfig>> {
        self.pending.clone().or_else(|| self.config.clone())
    }

    fn session_id(&self) -> Option<SessionId> {
        self.stats.as_ref().map(|s| s.session_id())
    }
}

struct Inner {
    source: Arc<dyn GameStateSource>,
    actuator: Arc<dyn Actuator>,
    clock: Arc<dyn Clock>,
    policy: PolicyEngine,
    broadcaster: StatusBroadcaster,
    mode: LoopMode,
    state: Mutex<LoopState>,
    seq: AtomicU64,
    on_end: Mutex<Vec<SessionEndHook>>,
}

/// Builder for [`Controller`].
pub struct ControllerBuilder {
    source: Arc<dyn GameStateSource>,
    actuator: Arc<dyn Actuator>,
    clock: Arc<dyn Clock>,
    broadcaster: StatusBroadcaster,
    seed: Option<u64>,
    mode: LoopMode,
    config: Option<HuntConfig>,
}

impl ControllerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn broadcaster(mut self, broadcaster: StatusBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Seed for the controller's rng. A `timing.seed` in the configuration
    /// reseeds it again at every start.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn mode(mut self, mode: LoopMode) -> Self {
        self.mode = mode;
        self
    }

    /// Preload a configuration. It is validated by `start()`.
    pub fn config(mut self, config: HuntConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Controller {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Controller {
            inner: Arc::new(Inner {
                source: self.source,
                actuator: self.actuator,
                clock: self.clock,
                policy: PolicyEngine::new(),
                broadcaster: self.broadcaster,
                mode: self.mode,
                state: Mutex::new(LoopState {
                    run_state: RunState::Stopped,
                    config: self.config.map(Arc::new),
                    pending: None,
                    navigator: NavigatorState::default(),
                    route_complete: false,
                    stats: None,
                    game: GameSummary::default(),
                    rng,
                    generation: 0,
                    cancel: None,
                    ticks: 0,
                }),
                seq: AtomicU64::new(0),
                on_end: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Handle to the decision loop. Cheap to clone; all clones drive the same loop.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn builder(
        source: Arc<dyn GameStateSource>,
        actuator: Arc<dyn Actuator>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            source,
            actuator,
            clock: Arc::new(SystemClock),
            broadcaster: StatusBroadcaster::default(),
            seed: None,
            mode: LoopMode::default(),
            config: None,
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Begin a new session. Already running or paused: report the live
    /// session and change nothing.
    pub fn start(&self) -> Result<StartOutcome> {
        let mut st = self.inner.state.lock();
        if st.run_state.is_active() {
            if let Some(session_id) = st.session_id() {
                debug!(%session_id, "start requested while active");
                return Ok(StartOutcome {
                    session_id,
                    already_running: true,
                });
            }
        }

        let config = st.config.clone().ok_or(HuntError::ConfigurationMissing)?;
        config.validate()?;

        if let Some(seed) = config.timing.seed {
            st.rng = StdRng::seed_from_u64(seed);
        }
        let session_id = Uuid::new_v4();
        let now = self.inner.clock.now();
        match st.stats.as_mut() {
            Some(tracker) => tracker.reset(session_id, now),
            None => st.stats = Some(StatsTracker::new(session_id, now)),
        }
        st.navigator = NavigatorState::default();
        st.route_complete = false;
        st.game = GameSummary::default();
        st.run_state = RunState::Running;
        st.generation += 1;
        st.ticks = 0;
        let cancel = CancellationToken::new();
        st.cancel = Some(cancel.clone());
        let generation = st.generation;

        self.publish(&st, StatusKind::Started);
        drop(st);

        info!(%session_id, profile = %config.name, "hunting session started");
        if self.inner.mode == LoopMode::Spawned {
            tokio::spawn(self.clone().run_loop(generation, cancel));
        }

        Ok(StartOutcome {
            session_id,
            already_running: false,
        })
    }

    /// End the current session. Returns the finalized record, or `None` if
    /// nothing was running.
    pub fn stop(&self) -> Option<SessionStats> {
        let st = self.inner.state.lock();
        self.end_session(st, EndReason::Stopped)
    }

    /// Running → Paused, Paused → Running. Returns the new state.
    pub fn toggle_pause(&self) -> Result<RunState> {
        let mut st = self.inner.state.lock();
        let (next, kind) = match st.run_state {
            RunState::Stopped => return Err(HuntError::NotRunning),
            RunState::Running => (RunState::Paused, StatusKind::Paused),
            RunState::Paused => (RunState::Running, StatusKind::Resumed),
        };
        st.run_state = next;
        self.publish(&st, kind);
        info!(state = %next, "run state toggled");
        Ok(next)
    }

    fn end_session(
        &self,
        mut st: MutexGuard<'_, LoopState>,
        reason: EndReason,
    ) -> Option<SessionStats> {
        if !st.run_state.is_active() {
            return None;
        }
        if let Some(cancel) = st.cancel.take() {
            cancel.cancel();
        }
        st.run_state = RunState::Stopped;
        if let Some(pending) = st.pending.take() {
            st.config = Some(pending);
        }

        let now = self.inner.clock.now();
        let record = st.stats.as_mut().map(|tracker| {
            tracker.set_elapsed(elapsed_secs(tracker.created_at(), now));
            tracker.finalize(now, reason)
        })?;

        let kind = match reason {
            EndReason::Stopped => StatusKind::Stopped,
            EndReason::Emergency => StatusKind::EmergencyHalt,
        };
        self.publish(&st, kind);
        drop(st);

        match reason {
            EndReason::Stopped => info!(session_id = %record.session_id, "hunting session stopped"),
            EndReason::Emergency => {
                warn!(session_id = %record.session_id, "emergency halt, hunting session ended")
            }
        }

        let hooks = self.inner.on_end.lock().clone();
        for hook in hooks {
            hook(&record);
        }
        Some(record)
    }

    // ── Configuration ──────────────────────────────────────────

    /// Install a configuration. Applied immediately while stopped, or at the
    /// next tick boundary while a run is active.
    pub fn load_configuration(&self, config: HuntConfig) -> Result<Vec<ConfigWarning>> {
        let warnings = config.validate()?;
        self.install(Arc::new(config));
        Ok(warnings)
    }

    /// The configuration the loop will use from the next tick on.
    pub fn configuration(&self) -> Option<HuntConfig> {
        self.inner
            .state
            .lock()
            .latest_config()
            .map(|c| c.as_ref().clone())
    }

    pub fn add_waypoint(&self, waypoint: Waypoint) -> Result<Waypoint> {
        self.edit_config(|config| {
            config.add_waypoint(waypoint.clone());
            Ok(waypoint.clone())
        })
    }

    pub fn remove_waypoint(&self, id: WaypointId) -> Result<Waypoint> {
        self.edit_config(|config| config.remove_waypoint(id))
    }

    /// Copy-on-write edit of the latest configuration.
    fn edit_config<T>(&self, edit: impl FnOnce(&mut HuntConfig) -> Result<T>) -> Result<T> {
        let mut st = self.inner.state.lock();
        let mut config = st
            .latest_config()
            .ok_or(HuntError::ConfigurationMissing)?
            .as_ref()
            .clone();
        let out = edit(&mut config)?;
        Self::install_locked(&mut st, Arc::new(config));
        Ok(out)
    }

    fn install(&self, config: Arc<HuntConfig>) {
        let mut st = self.inner.state.lock();
        Self::install_locked(&mut st, config);
    }

    fn install_locked(st: &mut LoopState, config: Arc<HuntConfig>) {
        if st.run_state.is_active() {
            debug!("configuration staged for the next tick");
            st.pending = Some(config);
        } else {
            st.navigator.clamp(config.waypoints().len());
            st.config = Some(config);
        }
    }

    // ── Observation ────────────────────────────────────────────

    pub fn status(&self) -> StatusReport {
        let st = self.inner.state.lock();
        StatusReport {
            run_state: st.run_state,
            session_id: st.session_id(),
            stats: st.stats.as_ref().map(StatsTracker::snapshot),
            game: st.game.clone(),
            config_loaded: st.config.is_some(),
            subscribers: self.inner.broadcaster.subscriber_count(),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.inner.state.lock().run_state
    }

    /// Last perceived player position.
    pub fn current_position(&self) -> Option<Position> {
        self.inner.state.lock().game.position
    }

    pub fn subscribe_status(&self) -> Subscription {
        self.inner.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.inner.broadcaster
    }

    /// Register a callback for finalized session records. Runs outside the
    /// state lock, on whichever task ended the session.
    pub fn on_session_end(&self, hook: impl Fn(&SessionStats) + Send + Sync + 'static) {
        self.inner.on_end.lock().push(Arc::new(hook));
    }

    fn publish(&self, st: &LoopState, kind: StatusKind) {
        // Published under the state lock so events leave in state order.
        let event = StatusEvent {
            seq: self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1,
            kind,
            run_state: st.run_state,
            session_id: st.session_id(),
            stats: st.stats.as_ref().map(StatsTracker::snapshot),
            game: st.game.clone(),
            at: self.inner.clock.now(),
        };
        self.inner.broadcaster.publish(event);
    }

    // ── Tick ───────────────────────────────────────────────────

    /// Run one tick of the current session.
    pub async fn tick(&self) -> TickOutcome {
        let generation = self.inner.state.lock().generation;
        self.tick_generation(generation).await
    }

    async fn tick_generation(&self, generation: u64) -> TickOutcome {
        // 1. Take the tick's configuration and cancellation token.
        let (config, cancel, session_id, tick) = {
            let mut st = self.inner.state.lock();
            if !st.is_current(generation) {
                return TickOutcome::Inactive;
            }
            if st.run_state == RunState::Paused {
                return TickOutcome::Idle;
            }
            if let Some(pending) = st.pending.take() {
                st.navigator.clamp(pending.waypoints().len());
                st.config = Some(pending);
                info!("installed updated configuration");
            }
            let (Some(config), Some(cancel), Some(session_id)) =
                (st.config.clone(), st.cancel.clone(), st.session_id())
            else {
                return TickOutcome::Inactive;
            };
            st.ticks += 1;
            (config, cancel, session_id, st.ticks)
        };
        let limit = config.call_timeout();

        // 2. Perceive.
        let snapshot = match bounded("capture", limit, self.inner.source.capture()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%session_id, tick, error = %e, "perception failed, skipping tick");
                return TickOutcome::Skipped;
            }
        };

        // 3. Decide.
        let intents = {
            let mut st = self.inner.state.lock();
            if !st.is_current(generation) {
                return TickOutcome::Inactive;
            }
            if st.run_state == RunState::Paused {
                return TickOutcome::Idle;
            }
            let now = self.inner.clock.now();
            let delay =
                chrono::Duration::from_std(config.waypoint_delay()).unwrap_or(chrono::Duration::MAX);
            let walk = if config.behavior.walk
                && !st.route_complete
                && st.navigator.move_due(now, delay)
            {
                navigator::advance(config.waypoints(), config.route.mode, &st.navigator)
            } else {
                None
            };
            let decision = {
                let st = &mut *st;
                self.inner
                    .policy
                    .evaluate(&config, &snapshot, walk, &mut st.rng)
            };
            match decision {
                Decision::Halt => {
                    warn!(
                        %session_id,
                        hp = snapshot.hp.percent,
                        threshold = config.thresholds.emergency_logout_hp,
                        "HP at emergency threshold"
                    );
                    st.game.observe(&snapshot);
                    self.end_session(st, EndReason::Emergency);
                    return TickOutcome::Halted;
                }
                Decision::Act(intents) => intents,
            }
        };

        // 4. Act, in priority order, re-checking the run before every command.
        let mut done = Vec::with_capacity(intents.len());
        let mut failed = 0;
        for intent in intents {
            if !self.may_act(generation, &cancel) {
                debug!(%session_id, tick, "run interrupted, dropping remaining intents");
                break;
            }
            match self.execute(&intent, limit, generation, &cancel).await {
                Ok(()) => {
                    debug!(%session_id, tick, intent = %intent, "intent executed");
                    done.push(intent);
                }
                Err(e) => {
                    failed += 1;
                    warn!(%session_id, tick, intent = %intent, error = %e, "intent failed");
                }
            }
        }

        // 5. Commit and publish.
        let mut st = self.inner.state.lock();
        if !st.is_current(generation) {
            return TickOutcome::Inactive;
        }
        let now = self.inner.clock.now();
        st.game.observe(&snapshot);
        let mut route_done = false;
        for intent in &done {
            if let Some(tracker) = st.stats.as_mut() {
                for counter in intent.counters() {
                    tracker.bump(*counter, 1);
                }
            }
            match intent {
                Intent::Attack {
                    creature, lethal, ..
                } => {
                    st.game.target_creature = (!lethal).then(|| creature.name.clone());
                }
                Intent::Walk { step } => {
                    st.navigator = NavigatorState {
                        last_move: Some(now),
                        ..step.next
                    };
                    st.game.waypoint_index = Some(st.navigator.index);
                    if step.complete {
                        st.route_complete = true;
                        route_done = true;
                    }
                }
                _ => {}
            }
        }
        if let Some(tracker) = st.stats.as_mut() {
            tracker.set_elapsed(elapsed_secs(tracker.created_at(), now));
        }
        self.publish(&st, StatusKind::Tick);
        if route_done {
            info!(%session_id, "route complete, auto-walk disabled for this session");
            self.publish(&st, StatusKind::RouteComplete);
        }

        TickOutcome::Acted {
            executed: done.len(),
            failed,
        }
    }

    fn may_act(&self, generation: u64, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let st = self.inner.state.lock();
        st.generation == generation && st.run_state == RunState::Running
    }

    async fn execute(
        &self,
        intent: &Intent,
        limit: Duration,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let actuator = &self.inner.actuator;
        match intent {
            Intent::HealHp { spell } | Intent::HealMp { spell } => {
                bounded("cast", limit, actuator.cast(spell)).await
            }
            Intent::Feed { hotkey } => bounded("hotkey", limit, actuator.hotkey(hotkey)).await,
            Intent::Attack {
                creature, spell, ..
            } => {
                let at = creature.position;
                bounded("click", limit, actuator.click_at(at.x, at.y, MouseButton::Right)).await?;
                if !self.may_act(generation, cancel) {
                    return Err(HuntError::NotRunning);
                }
                bounded("cast", limit, actuator.cast(spell)).await
            }
            Intent::Loot { item } => {
                let at = item.position;
                bounded("click", limit, actuator.click_at(at.x, at.y, MouseButton::Right)).await
            }
            Intent::Discard { item } => bounded("drop", limit, actuator.drop_item(item)).await,
            Intent::Walk { step } => {
                bounded("move", limit, actuator.move_to(step.target.x, step.target.y)).await
            }
            Intent::AntiIdle { key } => bounded("hotkey", limit, actuator.hotkey(key)).await,
        }
    }

    /// Random pause before the next tick, within the configured window.
    fn next_delay(&self) -> Duration {
        let mut st = self.inner.state.lock();
        let (min, max) = match st.config.as_ref() {
            Some(c) => (c.timing.tick_min_ms, c.timing.tick_max_ms),
            None => (500, 2000),
        };
        let ms = if min >= max {
            min
        } else {
            st.rng.gen_range(min..=max)
        };
        Duration::from_millis(ms)
    }

    async fn run_loop(self, generation: u64, cancel: CancellationToken) {
        debug!(generation, "decision loop task started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = AssertUnwindSafe(self.tick_generation(generation))
                .catch_unwind()
                .await;
            match outcome {
                Ok(TickOutcome::Halted | TickOutcome::Inactive) => break,
                Ok(_) => {}
                Err(_) => error!(generation, "tick panicked, continuing with the next tick"),
            }
            let delay = self.next_delay();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(generation, "decision loop task exited");
    }

    /// Counter lookup by name on the live session.
    pub fn counter(&self, name: &str) -> Result<u64> {
        let counter = name.parse::<Counter>()?;
        let st = self.inner.state.lock();
        Ok(st.stats.as_ref().map(|s| s.get(counter)).unwrap_or(0))
    }
}

async fn bounded<T>(
    operation: &str,
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(HuntError::Timeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}

fn elapsed_secs(since: chrono::DateTime<chrono::Utc>, now: chrono::DateTime<chrono::Utc>) -> u64 {
    (now - since).num_seconds().max(0) as u64
}
