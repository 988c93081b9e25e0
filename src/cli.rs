//! Command-line interface definition for Podwatch
//!
//! This module defines the CLI structure using clap's derive API.

use crate::commands::replay::ReplayArgs;
use crate::commands::validate::ValidateArgs;
use clap::{Parser, Subcommand};

/// Podwatch - pod restart alerts for chat webhooks
///
/// Watches pod warning events and posts restart alerts to the webhooks of
/// matching subscriptions.
#[derive(Parser, Debug, Clone)]
#[command(name = "podwatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Podwatch
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check subscription records for configuration problems
    Validate(ValidateArgs),

    /// Drive recorded events through the watcher against real webhooks
    Replay(ReplayArgs),
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::try_parse_from(["podwatch", "validate", "--subscriptions", "subs.yaml"])
            .unwrap();
        assert_eq!(cli.config, "config/config.yaml");
        assert!(!cli.verbose);
        if let Commands::Validate(args) = cli.command {
            assert_eq!(args.subscriptions, PathBuf::from("subs.yaml"));
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_cli_parse_replay() {
        let cli = Cli::try_parse_from([
            "podwatch",
            "--config",
            "custom.yaml",
            "-v",
            "replay",
            "--subscriptions",
            "subs.yaml",
            "--cluster",
            "cluster.yaml",
            "--events",
            "events.yaml",
        ])
        .unwrap();

        assert_eq!(cli.config, "custom.yaml");
        assert!(cli.verbose);
        if let Commands::Replay(args) = cli.command {
            assert_eq!(args.subscriptions, PathBuf::from("subs.yaml"));
            assert_eq!(args.cluster, PathBuf::from("cluster.yaml"));
            assert_eq!(args.events, PathBuf::from("events.yaml"));
        } else {
            panic!("Expected Replay command");
        }
    }

    #[test]
    fn test_cli_replay_requires_all_inputs() {
        let result = Cli::try_parse_from(["podwatch", "replay", "--subscriptions", "subs.yaml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["podwatch"]).is_err());
    }
}
