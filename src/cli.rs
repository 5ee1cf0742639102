//! Command-line interface definition for Metadraft
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the draft service and to maintain the store.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Metadraft - autosave draft service for metadata editing sessions
#[derive(Parser, Debug, Clone)]
#[command(name = "metadraft")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the draft storage root
    #[arg(long, global = true)]
    pub storage_root: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Metadraft
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the draft HTTP service
    Serve {
        /// Override the listen address from config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run one retention sweep and exit
    Sweep,

    /// Show the latest draft held for a session credential
    Inspect {
        /// Session credential to look up
        #[arg(short, long)]
        session: String,

        /// Print the full payload as JSON
        #[arg(long)]
        payload: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::try_parse_from(["metadraft", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { bind: Some(ref b) } if b == "0.0.0.0:9000"));
    }

    #[test]
    fn test_cli_parse_sweep_with_root() {
        let cli = Cli::try_parse_from(["metadraft", "sweep", "--storage-root", "/tmp/d"]).unwrap();
        assert!(matches!(cli.command, Commands::Sweep));
        assert_eq!(cli.storage_root, Some(PathBuf::from("/tmp/d")));
    }

    #[test]
    fn test_cli_inspect_requires_session() {
        assert!(Cli::try_parse_from(["metadraft", "inspect"]).is_err());
        let cli = Cli::try_parse_from(["metadraft", "inspect", "-s", "abc"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect { ref session, payload: false } if session == "abc"));
    }

    #[test]
    fn test_cli_default_config_path() {
        let cli = Cli::try_parse_from(["metadraft", "sweep"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("config/config.yaml"));
    }
}
