//! # autohunt-config
//!
//! Configuration system for autohunt. Reads from `autohunt.toml`, environment
//! variables, and CLI overrides, in that precedence order.
//!
//! The `[hunt]` table is the behavior profile the decision loop runs with; the
//! other tables configure the host process. Supports hot-reload via filesystem watcher.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{AppConfig, ConfigWarning, HuntConfig, WarningSeverity};
