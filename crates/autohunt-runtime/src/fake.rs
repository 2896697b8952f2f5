//! Deterministic capability fakes for testing.
//!
//! [`ScriptedSource`] replays queued snapshots and [`RecordingActuator`]
//! records every call it receives. Neither touches the real game.

use async_trait::async_trait;
use autohunt_core::{Actuator, GameStateSource, HuntError, MouseButton, PerceptionSnapshot, Result};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

enum Scripted {
    Snapshot(PerceptionSnapshot),
    Unavailable(String),
}

/// A game-state source that plays back a queue of snapshots.
///
/// Once the queue is empty it keeps returning the fallback snapshot, or
/// `PerceptionUnavailable` when none is set.
#[derive(Clone)]
pub struct ScriptedSource {
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    fallback: Arc<Mutex<Option<PerceptionSnapshot>>>,
    delay: Option<Duration>,
    captures: Arc<Mutex<usize>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(None)),
            delay: None,
            captures: Arc::new(Mutex::new(0)),
        }
    }

    /// Source that returns `snapshot` on every capture.
    pub fn repeating(snapshot: PerceptionSnapshot) -> Self {
        let source = Self::new();
        *source.fallback.lock() = Some(snapshot);
        source
    }

    pub fn with_snapshot(self, snapshot: PerceptionSnapshot) -> Self {
        self.push(snapshot);
        self
    }

    pub fn with_unavailable(self, reason: &str) -> Self {
        self.queue
            .lock()
            .push_back(Scripted::Unavailable(reason.to_string()));
        self
    }

    /// Sleep before answering each capture (to exercise the call timeout).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, snapshot: PerceptionSnapshot) {
        self.queue.lock().push_back(Scripted::Snapshot(snapshot));
    }

    pub fn set_fallback(&self, snapshot: Option<PerceptionSnapshot>) {
        *self.fallback.lock() = snapshot;
    }

    /// Number of `capture` calls made so far.
    pub fn captures(&self) -> usize {
        *self.captures.lock()
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStateSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn capture(&self) -> Result<PerceptionSnapshot> {
        *self.captures.lock() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().pop_front();
        match next {
            Some(Scripted::Snapshot(s)) => Ok(s),
            Some(Scripted::Unavailable(reason)) => Err(HuntError::PerceptionUnavailable(reason)),
            None => self
                .fallback
                .lock()
                .clone()
                .ok_or_else(|| HuntError::PerceptionUnavailable("script exhausted".into())),
        }
    }
}

/// One recorded actuator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorCall {
    Cast(String),
    Hotkey(String),
    Click { x: i32, y: i32, button: MouseButton },
    Move { x: i32, y: i32 },
    Drop(String),
}

impl ActuatorCall {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cast(_) => "cast",
            Self::Hotkey(_) => "hotkey",
            Self::Click { .. } => "click",
            Self::Move { .. } => "move",
            Self::Drop(_) => "drop",
        }
    }
}

type CallHook = Box<dyn Fn(&ActuatorCall) + Send + Sync>;

/// An actuator that records every call and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<ActuatorCall>>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
    hook: Arc<Mutex<Option<CallHook>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `kind` ("cast", "hotkey", "click", "move", "drop") fail.
    /// The failed call is still recorded.
    pub fn fail_on(&self, kind: &'static str) {
        self.failing.lock().insert(kind);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Run `hook` after each call is recorded, before it returns.
    pub fn on_call(&self, hook: impl Fn(&ActuatorCall) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, call: ActuatorCall) -> Result<()> {
        let kind = call.kind();
        self.calls.lock().push(call.clone());
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(&call);
        }
        if self.failing.lock().contains(kind) {
            return Err(HuntError::actuation(kind, "scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn cast(&self, spell: &str) -> Result<()> {
        self.record(ActuatorCall::Cast(spell.to_string()))
    }

    async fn hotkey(&self, key: &str) -> Result<()> {
        self.record(ActuatorCall::Hotkey(key.to_string()))
    }

    async fn click_at(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        self.record(ActuatorCall::Click { x, y, button })
    }

    async fn move_to(&self, x: i32, y: i32) -> Result<()> {
        self.record(ActuatorCall::Move { x, y })
    }

    async fn drop_item(&self, item: &str) -> Result<()> {
        self.record(ActuatorCall::Drop(item.to_string()))
    }
}
