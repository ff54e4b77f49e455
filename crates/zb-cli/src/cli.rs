//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Phone-free time tracker.
///
/// Records when your phone is docked over USB and turns the connected time
/// into daily goals, points, and a weekly history.
#[derive(Debug, Parser)]
#[command(name = "zenbox", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the device watcher.
    Serve {
        /// Address to listen on (overrides the configured one).
        #[arg(long)]
        bind: Option<String>,

        /// Do not start the device watcher.
        #[arg(long)]
        no_watch: bool,
    },

    /// Show usage statistics.
    Stats {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the raw event log as JSON lines.
    Events,

    /// Record that a phone was connected.
    Connected {
        /// Name of the device.
        #[arg(long)]
        device_name: Option<String>,
    },

    /// Record that a phone was disconnected.
    Disconnected {
        /// Name of the device.
        #[arg(long)]
        device_name: Option<String>,
    },

    /// Show or change user settings.
    #[command(subcommand)]
    Config(ConfigAction),

    /// Import a legacy CSV event log (`timestamp,isConnected[,deviceName]`).
    Import {
        /// Path to the CSV file.
        file: PathBuf,
    },

    /// List attached USB devices and whether each looks like a phone.
    Scan {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// User settings actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the user settings.
    Show,

    /// Set the daily target in minutes (30-480).
    SetTarget {
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::parse_from(["zenbox", "serve", "--bind", "127.0.0.1:9000", "--no-watch"]);
        match cli.command {
            Some(Commands::Serve { bind, no_watch }) => {
                assert_eq!(bind.as_deref(), Some("127.0.0.1:9000"));
                assert!(no_watch);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_set_target_with_global_flags() {
        let cli = Cli::parse_from(["zenbox", "config", "set-target", "90", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Some(Commands::Config(ConfigAction::SetTarget { minutes: 90 }))
        ));
    }

    #[test]
    fn test_parse_negative_target_reaches_validation() {
        let cli = Cli::parse_from(["zenbox", "config", "set-target", "-5"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Config(ConfigAction::SetTarget { minutes: -5 }))
        ));
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
