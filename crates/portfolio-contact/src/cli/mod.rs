//! Command-line interface for portfolio-contact.
//!
//! This module provides the CLI structure for the `contactd` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, EmailCommand, ServeCommand, SubmissionsCommand};

/// contactd - Contact form backend for a portfolio site
///
/// Accepts contact form submissions over HTTP, stores them in SQLite and
/// notifies the site owner by email.
#[derive(Debug, Parser)]
#[command(name = "contactd")]
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
    /// Run the HTTP server
    Serve(ServeCommand),

    /// Inspect and manage stored submissions
    #[command(subcommand)]
    Submissions(SubmissionsCommand),

    /// Check and test email delivery
    #[command(subcommand)]
    Email(EmailCommand),

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
    use std::net::SocketAddr;

    use super::*;
    use crate::logging::Verbosity;
    use crate::submission::SubmissionStatus;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Serve(ServeCommand { bind: None }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "contactd");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_quiet_wins_over_verbose() {
        assert_eq!(cli(2, true).verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_with_bind() {
        let cli = Cli::try_parse_from(["contactd", "serve", "--bind", "127.0.0.1:8080"]).unwrap();
        match cli.command {
            Command::Serve(ServeCommand { bind }) => {
                assert_eq!(bind, Some(SocketAddr::from(([127, 0, 0, 1], 8080))));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_submissions_list_with_status() {
        let cli =
            Cli::try_parse_from(["contactd", "submissions", "list", "--status", "read", "-l", "5"])
                .unwrap();
        match cli.command {
            Command::Submissions(SubmissionsCommand::List { status, limit, json }) => {
                assert_eq!(status, Some(SubmissionStatus::Read));
                assert_eq!(limit, 5);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_submissions_mark_rejects_unknown_status() {
        let result = Cli::try_parse_from(["contactd", "submissions", "mark", "1", "deleted"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_email_test() {
        let cli = Cli::try_parse_from(["contactd", "email", "test", "me@example.com"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Email(EmailCommand::Test { ref to }) if to == "me@example.com"
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let args = ["contactd", "-c", "/custom/config.toml", "config", "path"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose() {
        let cli = Cli::try_parse_from(["contactd", "-v", "serve"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_parse_with_quiet() {
        let cli = Cli::try_parse_from(["contactd", "-q", "submissions", "stats"]).unwrap();
        assert!(cli.quiet);
    }
}
