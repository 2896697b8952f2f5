//! # autohunt-core
//!
//! Core types, traits, and primitives for the autohunt decision loop.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! perception snapshots, the capability seams to the game client, session
//! statistics, and the status broadcaster that observers subscribe to.

pub mod capability;
pub mod clock;
pub mod error;
pub mod event;
pub mod stats;
pub mod types;

pub use capability::{Actuator, GameStateSource, MouseButton};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{HuntError, Result};
pub use event::{StatusBroadcaster, StatusEvent, StatusKind, StatusSink, Subscription, SubscriptionId};
pub use stats::{Counter, EndReason, SessionStats, StatsTracker};
pub use types::*;
