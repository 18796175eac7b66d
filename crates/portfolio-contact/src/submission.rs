//! Contact submission record.
//!
//! A [`Submission`] is one accepted contact-form message together with the
//! metadata the admission policy needs (sender IP, timestamp, fingerprint).

use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidForm;

/// Maximum stored length of the `User-Agent` header, in characters.
pub const MAX_USER_AGENT_CHARS: usize = 500;

/// User agent recorded when the client sends none.
pub const UNKNOWN_USER_AGENT: &str = "Unknown";

/// Lifecycle of a submission in the operator's inbox.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Not yet looked at.
    #[default]
    New,
    /// Opened by the operator.
    Read,
    /// Answered.
    Replied,
    /// Filed away.
    Archived,
}

impl SubmissionStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::New, Self::Read, Self::Replied, Self::Archived];

    /// The stored representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Read => "read",
            Self::Replied => "replied",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown submission status '{0}' (expected new, read, replied or archived)")]
pub struct ParseStatusError(pub String);

impl FromStr for SubmissionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "read" => Ok(Self::Read),
            "replied" => Ok(Self::Replied),
            "archived" => Ok(Self::Archived),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// An accepted contact-form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Identifier assigned by the storage layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Sender name.
    pub name: String,

    /// Normalised (trimmed, lowercased) sender email.
    pub email: String,

    /// Subject line.
    pub subject: String,

    /// Message body.
    pub message: String,

    /// Address the request came from.
    pub ip_address: IpAddr,

    /// Client user agent, truncated to [`MAX_USER_AGENT_CHARS`].
    pub user_agent: String,

    /// When the submission was accepted.
    pub timestamp: DateTime<Utc>,

    /// Inbox status.
    pub status: SubmissionStatus,

    /// Operator-set spam flag.
    pub is_spam: bool,

    /// BLAKE3 digest of email and message, used for duplicate detection.
    pub fingerprint: String,
}

/// The public part of a submission returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// Storage id.
    pub id: i64,
    /// Acceptance time.
    pub timestamp: DateTime<Utc>,
    /// Inbox status.
    pub status: SubmissionStatus,
}

impl Submission {
    /// Create a new submission from validated form input.
    ///
    /// Sets the timestamp to now (microsecond precision, matching storage),
    /// status to `new` and computes the fingerprint.
    #[must_use]
    pub fn new(form: ValidForm, ip_address: IpAddr, user_agent: Option<&str>) -> Self {
        let fingerprint = Self::compute_fingerprint(&form.email, &form.message);
        Self {
            id: None,
            name: form.name,
            email: form.email,
            subject: form.subject,
            message: form.message,
            ip_address,
            user_agent: clamp_user_agent(user_agent),
            timestamp: timestamp_now(),
            status: SubmissionStatus::New,
            is_spam: false,
            fingerprint,
        }
    }

    /// Compute the duplicate-detection fingerprint.
    ///
    /// Both inputs must already be normalised.
    #[must_use]
    pub fn compute_fingerprint(email: &str, message: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(email.as_bytes());
        hasher.update(b"\n");
        hasher.update(message.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// The client-facing receipt. `None` until the record has been stored.
    #[must_use]
    pub fn receipt(&self) -> Option<Receipt> {
        self.id.map(|id| Receipt {
            id,
            timestamp: self.timestamp,
            status: self.status,
        })
    }

    /// Short fingerprint prefix for log lines.
    #[must_use]
    pub fn short_fingerprint(&self) -> &str {
        self.fingerprint.get(..12).unwrap_or(&self.fingerprint)
    }
}

/// The current time at storage precision (microseconds).
#[must_use]
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn clamp_user_agent(user_agent: Option<&str>) -> String {
    match user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
        Some(ua) => ua.chars().take(MAX_USER_AGENT_CHARS).collect(),
        None => UNKNOWN_USER_AGENT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> ValidForm {
        ValidForm {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            subject: "Analytical engine".to_string(),
            message: "I would like to discuss a project.".to_string(),
        }
    }

    fn localhost() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    #[test]
    fn test_status_display_and_parse() {
        for status in SubmissionStatus::ALL {
            assert_eq!(status.to_string().parse::<SubmissionStatus>(), Ok(status));
        }
        assert_eq!("  Replied ".parse(), Ok(SubmissionStatus::Replied));
        assert!("deleted".parse::<SubmissionStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SubmissionStatus::Archived).unwrap();
        assert_eq!(json, "\"archived\"");
    }

    #[test]
    fn test_submission_new() {
        let submission = Submission::new(form(), localhost(), Some("curl/8.0"));

        assert!(submission.id.is_none());
        assert_eq!(submission.status, SubmissionStatus::New);
        assert!(!submission.is_spam);
        assert_eq!(submission.user_agent, "curl/8.0");
        assert_eq!(submission.fingerprint.len(), 64);
    }

    #[test]
    fn test_missing_user_agent_is_unknown() {
        let submission = Submission::new(form(), localhost(), None);
        assert_eq!(submission.user_agent, UNKNOWN_USER_AGENT);

        let submission = Submission::new(form(), localhost(), Some("   "));
        assert_eq!(submission.user_agent, UNKNOWN_USER_AGENT);
    }

    #[test]
    fn test_long_user_agent_is_truncated() {
        let long = "x".repeat(MAX_USER_AGENT_CHARS + 50);
        let submission = Submission::new(form(), localhost(), Some(&long));
        assert_eq!(submission.user_agent.chars().count(), MAX_USER_AGENT_CHARS);
    }

    #[test]
    fn test_fingerprint_depends_on_email_and_message() {
        let a = Submission::compute_fingerprint("a@example.com", "hello there world");
        let b = Submission::compute_fingerprint("a@example.com", "hello there world");
        let c = Submission::compute_fingerprint("b@example.com", "hello there world");
        let d = Submission::compute_fingerprint("a@example.com", "hello there, world");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_fingerprint_separator_prevents_ambiguity() {
        let a = Submission::compute_fingerprint("ab", "c");
        let b = Submission::compute_fingerprint("a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_receipt_requires_id() {
        let mut submission = Submission::new(form(), localhost(), None);
        assert!(submission.receipt().is_none());

        submission.id = Some(42);
        let receipt = submission.receipt().unwrap();
        assert_eq!(receipt.id, 42);
        assert_eq!(receipt.status, SubmissionStatus::New);
        assert_eq!(receipt.timestamp, submission.timestamp);
    }

    #[test]
    fn test_short_fingerprint() {
        let submission = Submission::new(form(), localhost(), None);
        assert_eq!(submission.short_fingerprint().len(), 12);
    }
}
