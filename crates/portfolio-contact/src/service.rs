//! The contact submission pipeline.
//!
//! [`ContactService::submit`] validates the form, evaluates the admission
//! policy and stores the submission under a single storage lock, then hands
//! the stored record to the notifier without waiting for delivery.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::admission::{AdmissionPolicy, Rejection, Verdict};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::notify::{MailerStatus, Notifier};
use crate::storage::{Storage, SubmissionStats};
use crate::submission::{timestamp_now, Submission};
use crate::validation::{ContactForm, FieldError};

/// Where a request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Resolved client address.
    pub ip: IpAddr,
    /// Raw `User-Agent` header, if any.
    pub user_agent: Option<String>,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            user_agent: None,
        }
    }
}

/// Why [`ContactService::submit`] did not accept a submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// One or more fields failed validation.
    #[error("validation failed for {} field(s)", .0.len())]
    Invalid(Vec<FieldError>),

    /// The admission policy turned the submission away.
    #[error("submission rejected: {0}")]
    Rejected(Rejection),

    /// Storage failed.
    #[error(transparent)]
    Storage(#[from] Error),

    /// The blocking task could not complete.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reachability of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    /// Answering.
    Connected,
    /// Not answering.
    Disconnected,
}

/// Snapshot returned by [`ContactService::health`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// `OK` when the database answers, `DEGRADED` otherwise.
    pub status: &'static str,
    /// When the report was taken.
    pub timestamp: DateTime<Utc>,
    /// Seconds since the service was created.
    pub uptime_secs: u64,
    /// Crate version.
    pub version: &'static str,
    /// Database reachability.
    pub database: ComponentState,
    /// Email configuration, without secrets.
    pub email: MailerStatus,
}

impl HealthReport {
    /// Whether every required dependency answers.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.database == ComponentState::Connected
    }
}

/// Runs the submission pipeline against shared storage.
#[derive(Debug, Clone)]
pub struct ContactService {
    storage: Arc<Mutex<Storage>>,
    policy: AdmissionPolicy,
    notifier: Notifier,
    started: Instant,
}

impl ContactService {
    /// Create a service from its parts.
    #[must_use]
    pub fn new(storage: Storage, policy: AdmissionPolicy, notifier: Notifier) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            policy,
            notifier,
            started: Instant::now(),
        }
    }

    /// Open storage and build the SMTP notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        Ok(Self::new(
            storage,
            AdmissionPolicy::from_config(&config.admission),
            Notifier::from_config(&config.email),
        ))
    }

    /// The notifier used for accepted submissions.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run `f` against the storage on the blocking pool.
    async fn with_storage<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || {
            let guard = storage.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| Error::internal(format!("storage task failed: {e}")))?
    }

    /// Validate, admit, store and notify.
    ///
    /// Email delivery happens in the background and never affects the result.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] if the form is invalid, the admission policy
    /// rejects it, or storage fails.
    pub async fn submit(
        &self,
        form: ContactForm,
        client: ClientInfo,
    ) -> std::result::Result<Submission, SubmitError> {
        let valid = form.validate().map_err(SubmitError::Invalid)?;
        let mut submission = Submission::new(valid, client.ip, client.user_agent.as_deref());

        let storage = Arc::clone(&self.storage);
        let policy = self.policy;
        let outcome = tokio::task::spawn_blocking(
            move || -> Result<std::result::Result<Submission, Rejection>> {
                let storage = storage.lock().unwrap_or_else(PoisonError::into_inner);
                // Stamped under the lock so stored timestamps follow insert order
                submission.timestamp = timestamp_now();
                match policy.evaluate(&storage, &submission, submission.timestamp)? {
                    Verdict::Admit => storage.insert(&submission).map(Ok),
                    Verdict::Reject(rejection) => Ok(Err(rejection)),
                }
            },
        )
        .await
        .map_err(|e| SubmitError::Internal(e.to_string()))?;

        let stored = match outcome {
            Ok(Ok(stored)) => stored,
            Ok(Err(rejection)) => {
                warn!(ip = %client.ip, "Contact submission rejected: {}", rejection);
                return Err(SubmitError::Rejected(rejection));
            }
            Err(e) => {
                error!(ip = %client.ip, "Failed to store contact submission: {}", e);
                return Err(SubmitError::Storage(e));
            }
        };

        info!(
            id = stored.id,
            ip = %stored.ip_address,
            fingerprint = stored.short_fingerprint(),
            "Contact submission accepted"
        );

        drop(self.notifier.dispatch(stored.clone()));
        Ok(stored)
    }

    /// Aggregate statistics as of now.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub async fn stats(&self) -> Result<SubmissionStats> {
        self.with_storage(|storage| storage.stats(Utc::now())).await
    }

    /// Delete submissions older than `max_age`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails or the age is out of range.
    pub async fn prune(&self, max_age: Duration) -> Result<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|_| Error::internal(format!("retention age out of range: {max_age:?}")))?;
        self.with_storage(move |storage| storage.prune_older_than(max_age))
            .await
    }

    /// Check the database and report mailer status.
    pub async fn health(&self) -> HealthReport {
        let database = match self.with_storage(Storage::ping).await {
            Ok(()) => ComponentState::Connected,
            Err(e) => {
                warn!("Health check: database unavailable: {}", e);
                ComponentState::Disconnected
            }
        };

        HealthReport {
            status: if database == ComponentState::Connected {
                "OK"
            } else {
                "DEGRADED"
            },
            timestamp: Utc::now(),
            uptime_secs: self.started.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION"),
            database,
            email: self.notifier.status(),
        }
    }
}
