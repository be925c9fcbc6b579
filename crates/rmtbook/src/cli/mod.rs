//! Command-line interface for rmtbook.
//!
//! This module provides the CLI structure and command definitions for the
//! `rmtbook` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, JobsCommand, ServeCommand, StatusCommand, UserCommand};

/// rmtbook - Booking and records for a massage therapy practice
///
/// Serves the booking API, runs reminder and cleanup jobs, and manages the
/// practice database.
#[derive(Debug, Parser)]
#[command(name = "rmtbook")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API and background jobs
    Serve(ServeCommand),

    /// Run background jobs by hand
    #[command(subcommand)]
    Jobs(JobsCommand),

    /// Manage accounts
    #[command(subcommand)]
    User(UserCommand),

    /// Show database statistics
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;
    use crate::logging::Verbosity;
    use clap::CommandFactory;

    fn cli_with(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "rmtbook");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(cli_with(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli_with(3, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli_with(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli_with(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli_with(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_serve_with_port() {
        let cli = Cli::try_parse_from(["rmtbook", "serve", "--port", "8080"]).unwrap();
        let Command::Serve(serve) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.port, Some(8080));
        assert_eq!(serve.bind, None);
    }

    #[test]
    fn test_parse_jobs_run() {
        let cli = Cli::try_parse_from(["rmtbook", "jobs", "run", "send-reminders"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Jobs(JobsCommand::Run {
                kind: JobKind::SendReminders,
                json: false
            })
        ));
    }

    #[test]
    fn test_parse_jobs_run_rejects_unknown() {
        assert!(Cli::try_parse_from(["rmtbook", "jobs", "run", "vacuum"]).is_err());
    }

    #[test]
    fn test_parse_create_rmt() {
        let cli = Cli::try_parse_from([
            "rmtbook",
            "user",
            "create-rmt",
            "--email",
            "rmt@example.com",
            "--first-name",
            "Alex",
            "--last-name",
            "Lee",
        ])
        .unwrap();
        let Command::User(UserCommand::CreateRmt {
            email, password, ..
        }) = cli.command
        else {
            panic!("expected user create-rmt");
        };
        assert_eq!(email, "rmt@example.com");
        assert!(password.is_none());
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["rmtbook", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rmtbook", "status", "--json", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Status(StatusCommand { json: true })));
    }
}
