//! Error types for portfolio-contact.
//!
//! This module defines the error type shared by storage, configuration and
//! email delivery. HTTP-facing failures are mapped onto the response envelope
//! in [`crate::http::envelope`].

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for portfolio-contact operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Email Errors ===
    /// SMTP credentials or addresses are missing.
    #[error("email service not configured: {reason}")]
    EmailNotConfigured {
        /// What is missing.
        reason: String,
    },

    /// An email address could not be parsed.
    #[error("invalid email address '{address}': {message}")]
    EmailAddress {
        /// The offending address.
        address: String,
        /// Parser message.
        message: String,
    },

    /// Building the MIME message failed.
    #[error("failed to build email: {0}")]
    EmailBuild(#[from] lettre::error::Error),

    /// The SMTP transport reported an error.
    #[error("SMTP error: {0}")]
    EmailTransport(#[from] lettre::transport::smtp::Error),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for portfolio-contact operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an "email not configured" error.
    #[must_use]
    pub fn email_not_configured(reason: impl Into<String>) -> Self {
        Self::EmailNotConfigured {
            reason: reason.into(),
        }
    }

    /// Create an address parse error.
    #[must_use]
    pub fn email_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmailAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Check if this error originated in the database layer.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
        )
    }

    /// Check if this error means email delivery is switched off.
    #[must_use]
    pub fn is_email_not_configured(&self) -> bool {
        matches!(self, Self::EmailNotConfigured { .. })
    }
}
