use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::stats::SessionStats;
use crate::types::{GameSummary, RunState, SessionId};

/// What triggered a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Started,
    Tick,
    Paused,
    Resumed,
    Stopped,
    EmergencyHalt,
    RouteComplete,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Tick => "tick",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Stopped => "stopped",
            Self::EmergencyHalt => "emergency_halt",
            Self::RouteComplete => "route_complete",
        }
    }
}

/// A status update pushed to every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Monotonic per controller; subscribers can detect gaps.
    pub seq: u64,
    pub kind: StatusKind,
    pub run_state: RunState,
    pub session_id: Option<SessionId>,
    pub stats: Option<SessionStats>,
    pub game: GameSummary,
    pub at: DateTime<Utc>,
}

/// Why a sink refused an event. Any refusal unsubscribes the sink.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("subscriber buffer full")]
    Full,
    #[error("subscriber closed")]
    Closed,
    #[error("subscriber rejected event: {0}")]
    Rejected(String),
}

/// Anything that can take delivery of status events.
///
/// `deliver` runs inside `publish` and must not block. The controller
/// publishes while holding its state lock, so a sink must not call back into
/// the controller. A sink that panics is treated as a refusal.
pub trait StatusSink: Send + Sync {
    fn deliver(&self, event: &Arc<StatusEvent>) -> Result<(), DeliveryError>;
}

impl StatusSink for mpsc::Sender<Arc<StatusEvent>> {
    fn deliver(&self, event: &Arc<StatusEvent>) -> Result<(), DeliveryError> {
        self.try_send(Arc::clone(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

pub type SubscriptionId = u64;

struct Subscriber {
    id: SubscriptionId,
    sink: Box<dyn StatusSink>,
}

struct Registry {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Registry {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }
}

/// Fan-out publisher for status events.
///
/// Each subscriber owns an isolated bounded queue. `publish` never waits on a
/// subscriber: one that is full, closed, or refuses the event is dropped from
/// the subscriber set and everyone else still gets the event.
#[derive(Clone)]
pub struct StatusBroadcaster {
    registry: Arc<Registry>,
}

impl StatusBroadcaster {
    /// `capacity` is the per-subscriber queue depth.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Join with a fresh bounded queue. Dropping the subscription leaves.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.registry.capacity);
        let id = self.subscribe_sink(tx);
        Subscription {
            id,
            rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Join with a custom sink (callback, bridge to another transport, ...).
    pub fn subscribe_sink(&self, sink: impl StatusSink + 'static) -> SubscriptionId {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.subscribers.lock().push(Subscriber {
            id,
            sink: Box::new(sink),
        });
        debug!(subscription = id, "status subscriber joined");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(subscription = id, "status subscriber left");
        }
        removed
    }

    /// Deliver to every subscriber. Returns how many accepted the event.
    pub fn publish(&self, event: StatusEvent) -> usize {
        let event = Arc::new(event);
        let mut subs = self.registry.subscribers.lock();
        let mut delivered = 0;
        subs.retain(|sub| match deliver_guarded(sub.sink.as_ref(), &event) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                debug!(subscription = sub.id, error = %e, "dropping status subscriber");
                false
            }
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.lock().len()
    }
}

/// Run one delivery, turning a panicking sink into a `Rejected` refusal.
fn deliver_guarded(sink: &dyn StatusSink, event: &Arc<StatusEvent>) -> Result<(), DeliveryError> {
    panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(event))).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "subscriber panicked".to_string());
        warn!(reason = %reason, "status subscriber panicked");
        Err(DeliveryError::Rejected(reason))
    })
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A live subscription. Unsubscribes itself when dropped.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Arc<StatusEvent>>,
    registry: Arc<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. `None` once the subscription has been dropped
    /// by the broadcaster.
    pub async fn recv(&mut self) -> Option<Arc<StatusEvent>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<StatusEvent>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
