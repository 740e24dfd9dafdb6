//! Relay CLI - Command-line interface
//!
//! The `relay` binary manages provider profiles and streams queries
//! through the fallback chain.

pub mod commands;
pub mod config;

pub use commands::{Cli, Commands, ProfileCommands};
pub use config::CliConfig;
