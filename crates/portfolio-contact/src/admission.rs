//! Submission admission policy.
//!
//! Decides whether a validated submission may be persisted: a sender IP may
//! only produce a bounded number of accepted submissions per window, and the
//! same email + message pair is suppressed for a short period after it was
//! first accepted. The rate limit is checked before the duplicate check.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::AdmissionConfig;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::submission::Submission;

/// Thresholds applied to every new submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Accepted submissions allowed per IP within `ip_window`.
    pub max_per_ip: u32,
    /// Trailing window for the per-IP count.
    pub ip_window: Duration,
    /// Trailing window for duplicate suppression.
    pub duplicate_window: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::from_config(&AdmissionConfig::default())
    }
}

/// Why a submission was turned away.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The sender IP already reached its quota for the window.
    #[error("{recent} submissions from this IP inside the window (limit {limit})")]
    IpRateLimited {
        /// Accepted submissions from the IP inside the window.
        recent: i64,
        /// Configured quota.
        limit: u32,
    },
    /// The same email and message were accepted recently.
    #[error("same email and message already accepted")]
    Duplicate {
        /// Id of the earlier submission.
        original_id: Option<i64>,
    },
}

/// Outcome of [`AdmissionPolicy::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The submission may be stored.
    Admit,
    /// The submission must not be stored.
    Reject(Rejection),
}

impl AdmissionPolicy {
    /// Build a policy from configuration.
    #[must_use]
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self {
            max_per_ip: config.max_per_ip,
            ip_window: Duration::from_secs(config.ip_window_secs),
            duplicate_window: Duration::from_secs(config.duplicate_window_secs),
        }
    }

    /// Evaluate `submission` against what is already stored, as of `now`.
    ///
    /// The caller must hold the storage exclusively until the admitted
    /// submission is inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage query fails or a window is too large to
    /// represent.
    pub fn evaluate(
        &self,
        storage: &Storage,
        submission: &Submission,
        now: DateTime<Utc>,
    ) -> Result<Verdict> {
        let ip_since = now - to_chrono(self.ip_window)?;
        let recent = storage.count_recent_by_ip(submission.ip_address, ip_since)?;
        if recent >= i64::from(self.max_per_ip) {
            debug!(
                ip = %submission.ip_address,
                recent,
                limit = self.max_per_ip,
                "Per-IP limit reached"
            );
            return Ok(Verdict::Reject(Rejection::IpRateLimited {
                recent,
                limit: self.max_per_ip,
            }));
        }

        let dup_since = now - to_chrono(self.duplicate_window)?;
        if let Some(original) = storage.find_duplicate(&submission.fingerprint, dup_since)? {
            debug!(
                fingerprint = submission.short_fingerprint(),
                original_id = original.id,
                "Duplicate submission"
            );
            return Ok(Verdict::Reject(Rejection::Duplicate {
                original_id: original.id,
            }));
        }

        Ok(Verdict::Admit)
    }
}

fn to_chrono(window: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(window)
        .map_err(|_| Error::internal(format!("admission window out of range: {window:?}")))
}
