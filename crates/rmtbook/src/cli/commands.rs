//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::config::Config;
use crate::jobs::JobKind;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind instead of the configured one
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<IpAddr>,

    /// Port to listen on instead of the configured one
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeCommand {
    /// Apply the command-line overrides to a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

/// Background job commands.
#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// Run one job now and print what it did
    Run {
        /// The job to run
        #[arg(value_enum)]
        kind: JobKind,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Account commands.
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create the practitioner account
    ///
    /// The password is read from `RMTBOOK_RMT_PASSWORD` when `--password`
    /// is not given.
    CreateRmt {
        /// Sign-in email
        #[arg(long)]
        email: String,

        /// Given name
        #[arg(long)]
        first_name: String,

        /// Family name
        #[arg(long)]
        last_name: String,

        /// Password for the account
        #[arg(long)]
        password: Option<String>,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_overrides() {
        let mut config = Config::default();
        let cmd = ServeCommand {
            bind: Some("0.0.0.0".parse().unwrap()),
            port: Some(8080),
        };
        cmd.apply(&mut config);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_serve_without_overrides_keeps_config() {
        let mut config = Config::default();
        ServeCommand {
            bind: None,
            port: None,
        }
        .apply(&mut config);
        assert_eq!(config.server.port, Config::default().server.port);
    }
}
