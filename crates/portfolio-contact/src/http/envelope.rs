//! JSON response envelope.
//!
//! Success bodies are `{"success": true, ...}`; failures are
//! `{"success": false, "error": {"message", "code", "details"?}}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::admission::Rejection;
use crate::service::SubmitError;
use crate::validation::FieldError;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad or missing form fields, or an unparsable body.
    ValidationError,
    /// Per-IP submission quota reached.
    IpRateLimitExceeded,
    /// Same email and message accepted recently.
    DuplicateSubmission,
    /// Storage failure while saving.
    DatabaseError,
    /// Anything else.
    InternalServerError,
    /// Request-level limiter tripped.
    RateLimitExceeded,
    /// Unknown route.
    NotFound,
    /// Statistics query failed.
    StatsError,
}

impl ErrorCode {
    /// HTTP status for this code.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::IpRateLimitExceeded | Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::DuplicateSubmission => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DatabaseError | Self::InternalServerError | Self::StatsError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// An error rendered as the failure envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    pub details: Option<Value>,
}

impl ApiError {
    /// Create an error with a message and no details.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Field validation failure.
    #[must_use]
    pub fn validation(errors: &[FieldError]) -> Self {
        Self::new(ErrorCode::ValidationError, "Validation failed")
            .with_details(json!(errors))
    }

    /// Too many requests at the HTTP layer.
    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            "Too many requests from this IP, please try again later.",
        )
    }

    /// Unknown route.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound, "Route not found")
    }

    /// Statistics failure.
    #[must_use]
    pub fn stats() -> Self {
        Self::new(ErrorCode::StatsError, "Failed to fetch statistics")
    }

    /// Generic server failure; details are logged, not returned.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            ErrorCode::InternalServerError,
            "An unexpected error occurred. Please try again later.",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(ErrorCode::ValidationError, "Validation failed").with_details(json!([{
            "field": "body",
            "message": rejection.body_text(),
        }]))
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Invalid(errors) => Self::validation(&errors),
            SubmitError::Rejected(Rejection::IpRateLimited { .. }) => Self::new(
                ErrorCode::IpRateLimitExceeded,
                "Too many submissions from this IP address. Please try again later.",
            ),
            SubmitError::Rejected(Rejection::Duplicate { .. }) => Self::new(
                ErrorCode::DuplicateSubmission,
                "Duplicate submission detected. Please wait before submitting again.",
            ),
            SubmitError::Storage(e) if e.is_database_error() => {
                error!("Database error while saving submission: {}", e);
                Self::new(
                    ErrorCode::DatabaseError,
                    "Database error occurred while saving your message. Please try again.",
                )
            }
            SubmitError::Storage(e) => {
                error!("Error while saving submission: {}", e);
                Self::internal()
            }
            SubmitError::Internal(message) => {
                error!("Internal error while saving submission: {}", message);
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "message": self.message,
            "code": self.code,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        (
            self.code.status(),
            Json(json!({ "success": false, "error": error })),
        )
            .into_response()
    }
}
