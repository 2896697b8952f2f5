//! # autohunt-runtime
//!
//! The decision loop. A [`Controller`] pulls a perception snapshot every
//! tick, lets the [`PolicyEngine`] pick intents in fixed priority order,
//! carries them out through the [`Actuator`](autohunt_core::Actuator), and
//! publishes the resulting status. The [`navigator`] walks the waypoint route.

pub mod controller;
pub mod fake;
pub mod navigator;
pub mod policy;
pub mod sim;

pub use controller::{
    Controller, ControllerBuilder, LoopMode, SessionEndHook, StartOutcome, StatusReport,
    TickOutcome,
};
pub use fake::{ActuatorCall, RecordingActuator, ScriptedSource};
pub use navigator::{NavigatorState, Step};
pub use policy::{Decision, Intent, PolicyEngine, chance};
pub use sim::{DryRunActuator, SimulatedGame};
