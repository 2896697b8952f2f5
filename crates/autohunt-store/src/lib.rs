//! # autohunt-store
//!
//! SQLite persistence: finished session records and saved hunt profiles.

pub mod store;

pub use store::{HistoryTotals, SavedProfile, SessionStore};
