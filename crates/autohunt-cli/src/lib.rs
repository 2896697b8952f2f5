//! # autohunt-cli
//!
//! Command-line interface for the autohunt decision loop.
//!
//! ## Commands
//!
//! - `autohunt start`: Run the loop against the simulated game, with the HTTP API
//! - `autohunt status`: Ask a running instance for its status
//! - `autohunt config`: Show the effective configuration
//! - `autohunt init`: Write a starter `autohunt.toml`
//! - `autohunt sessions`: List recorded sessions and lifetime totals

pub mod commands;

pub use commands::Cli;
