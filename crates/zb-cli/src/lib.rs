//! Zenbox command-line and HTTP front end.
//!
//! The `zenbox` binary records phone connections, reports usage statistics,
//! and serves the JSON API the web front end polls.

mod cli;
pub mod commands;
mod config;
pub mod server;

pub use cli::{Cli, Commands, ConfigAction};
pub use config::{Config, WatcherSettings};
