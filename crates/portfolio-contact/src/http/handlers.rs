//! Route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::error;

use super::envelope::ApiError;
use super::AppState;
use crate::service::ClientInfo;
use crate::validation::ContactForm;

/// Confirmation shown to the visitor after a successful submission.
pub const THANK_YOU_MESSAGE: &str = "Thank you for your message! I will get back to you soon.";

/// `GET /`
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Portfolio API Server Running",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

/// `POST /api/contact`
pub async fn submit_contact(
    State(state): State<AppState>,
    client: ClientInfo,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = payload?;
    let form = ContactForm::from_json(&body);

    let stored = state.service.submit(form, client).await?;
    let receipt = stored.receipt().ok_or_else(|| {
        error!("Stored submission has no id");
        ApiError::internal()
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": THANK_YOU_MESSAGE,
            "data": receipt,
        })),
    ))
}

/// `GET /api/contact/stats`
pub async fn contact_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state.service.stats().await.map_err(|e| {
        error!("Failed to fetch statistics: {}", e);
        ApiError::stats()
    })?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "totalSubmissions": stats.total,
            "todaySubmissions": stats.today,
            "thisWeekSubmissions": stats.this_week,
        },
    })))
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let report = state.service.health().await;
    let healthy = report.is_healthy();

    let mut body = serde_json::to_value(&report).map_err(|e| {
        error!("Failed to serialize health report: {}", e);
        ApiError::internal()
    })?;
    body["success"] = Value::Bool(healthy);

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(body)))
}

/// `GET /api/cors-test`
pub async fn cors_test(headers: HeaderMap) -> Json<Value> {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    Json(json!({
        "success": true,
        "message": "CORS is working correctly",
        "origin": origin,
        "timestamp": Utc::now(),
    }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
