//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::submission::SubmissionStatus;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to listen on, overriding the configuration
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,
}

/// Stored submission commands.
#[derive(Debug, Subcommand)]
pub enum SubmissionsCommand {
    /// List recent submissions
    List {
        /// Only show submissions with this status
        #[arg(short, long)]
        status: Option<SubmissionStatus>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show one submission in full
    Show {
        /// Submission id
        id: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Change the inbox status of a submission
    Mark {
        /// Submission id
        id: i64,

        /// New status (new, read, replied, archived)
        status: SubmissionStatus,
    },

    /// Flag a submission as spam
    Spam {
        /// Submission id
        id: i64,

        /// Remove the spam flag instead
        #[arg(long)]
        clear: bool,
    },

    /// Permanently delete a submission
    Delete {
        /// Submission id
        id: i64,
    },

    /// Show submission statistics
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete old submissions
    Prune {
        /// Age in days; defaults to `storage.max_age_days`
        #[arg(short, long)]
        days: Option<u32>,
    },
}

/// Email commands.
#[derive(Debug, Subcommand)]
pub enum EmailCommand {
    /// Show the mail transport status
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Connect to the mail server and check the credentials
    Verify,

    /// Send a test email
    Test {
        /// Recipient address
        to: String,
    },
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
    fn test_serve_command_debug() {
        let cmd = ServeCommand { bind: None };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("bind"));
    }

    #[test]
    fn test_submissions_command_debug() {
        let cmd = SubmissionsCommand::Mark {
            id: 3,
            status: SubmissionStatus::Replied,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Mark"));
        assert!(debug_str.contains("Replied"));
    }

    #[test]
    fn test_email_command_debug() {
        let cmd = EmailCommand::Test {
            to: "me@example.com".to_string(),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("me@example.com"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
