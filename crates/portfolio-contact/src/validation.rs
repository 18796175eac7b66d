//! Contact form validation and normalisation.
//!
//! Raw form input is normalised first (trim, collapse whitespace, strip HTML
//! tags, lowercase email) and the field constraints are checked against the
//! normalised text, so anything that reaches storage satisfies them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Name length bounds, in characters.
pub const NAME_LEN: (usize, usize) = (2, 100);
/// Maximum email length, in characters.
pub const EMAIL_MAX_LEN: usize = 254;
/// Subject length bounds, in characters.
pub const SUBJECT_LEN: (usize, usize) = (5, 200);
/// Message length bounds, in characters.
pub const MESSAGE_LEN: (usize, usize) = (10, 1000);

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z\s\-']+$").expect("name pattern is valid"));

/// Shape check on top of the mailbox parser: one `@` and a dotted domain.
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Raw contact form payload as posted by the frontend.
///
/// Every field is optional so that a missing field becomes a validation error
/// rather than a deserialisation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    /// Sender name.
    pub name: Option<String>,
    /// Sender email.
    pub email: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Message body.
    pub message: Option<String>,
}

/// Normalised form input that satisfies every field constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidForm {
    /// Sender name.
    pub name: String,
    /// Lowercased sender email.
    pub email: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub message: String,
}

/// A single failed field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name as posted.
    pub field: &'static str,
    /// Human-readable message.
    pub message: String,
    /// The offending value, for format errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            value: None,
        }
    }

    fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }
}

impl ContactForm {
    /// Build a form from an arbitrary JSON body.
    ///
    /// Fields that are absent, `null` or not strings are treated as missing,
    /// so they surface as "required" errors instead of a parse failure.
    #[must_use]
    pub fn from_json(body: &serde_json::Value) -> Self {
        let field = |name: &str| {
            body.get(name)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        Self {
            name: field("name"),
            email: field("email"),
            subject: field("subject"),
            message: field("message"),
        }
    }

    /// Normalise and validate every field.
    ///
    /// All failing fields are reported, one error per field.
    ///
    /// # Errors
    ///
    /// Returns the list of field errors if any constraint fails.
    pub fn validate(&self) -> Result<ValidForm, Vec<FieldError>> {
        let mut errors = Vec::new();

        let name = check(&mut errors, validate_name(self.name.as_deref()));
        let email = check(&mut errors, validate_email(self.email.as_deref()));
        let subject = check(&mut errors, validate_subject(self.subject.as_deref()));
        let message = check(&mut errors, validate_message(self.message.as_deref()));

        match (name, email, subject, message) {
            (Some(name), Some(email), Some(subject), Some(message)) if errors.is_empty() => {
                Ok(ValidForm {
                    name,
                    email,
                    subject,
                    message,
                })
            }
            _ => Err(errors),
        }
    }
}

fn check(errors: &mut Vec<FieldError>, result: Result<String, FieldError>) -> Option<String> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err);
            None
        }
    }
}

/// Normalise an email address: trim and lowercase.
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalise free text: strip HTML tags, collapse whitespace runs, trim.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let stripped = HTML_TAG.replace_all(raw, "");
    WHITESPACE_RUN
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

fn required(field: &'static str, label: &str, raw: Option<&str>) -> Result<String, FieldError> {
    match raw.map(normalize_text).filter(|v| !v.is_empty()) {
        Some(value) => Ok(value),
        None => Err(FieldError::new(field, format!("{label} is required"))),
    }
}

fn validate_length(
    field: &'static str,
    label: &str,
    value: &str,
    (min, max): (usize, usize),
) -> Result<(), FieldError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(FieldError::new(
            field,
            format!("{label} must be between {min} and {max} characters"),
        ));
    }
    Ok(())
}

fn validate_name(raw: Option<&str>) -> Result<String, FieldError> {
    let name = required("name", "Name", raw)?;
    validate_length("name", "Name", &name, NAME_LEN)?;
    if !NAME_PATTERN.is_match(&name) {
        return Err(FieldError::new(
            "name",
            "Name can only contain letters, spaces, hyphens, and apostrophes",
        )
        .with_value(&name));
    }
    Ok(name)
}

fn validate_email(raw: Option<&str>) -> Result<String, FieldError> {
    let email = raw
        .map(normalize_email)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FieldError::new("email", "Email is required"))?;
    if email.chars().count() > EMAIL_MAX_LEN {
        return Err(FieldError::new(
            "email",
            format!("Email cannot exceed {EMAIL_MAX_LEN} characters"),
        ));
    }
    if !EMAIL_PATTERN.is_match(&email) || email.parse::<lettre::Address>().is_err() {
        return Err(
            FieldError::new("email", "Please provide a valid email address").with_value(&email),
        );
    }
    Ok(email)
}

fn validate_subject(raw: Option<&str>) -> Result<String, FieldError> {
    let subject = required("subject", "Subject", raw)?;
    validate_length("subject", "Subject", &subject, SUBJECT_LEN)?;
    Ok(subject)
}

fn validate_message(raw: Option<&str>) -> Result<String, FieldError> {
    let message = required("message", "Message", raw)?;
    validate_length("message", "Message", &message, MESSAGE_LEN)?;
    Ok(message)
}
