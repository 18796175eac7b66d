//! HTTP surface of the contact service.
//!
//! Routes:
//! - `POST /api/contact` submits the contact form
//! - `GET /api/contact/stats` returns submission counts
//! - `GET /api/health` checks storage and reports email status
//! - `GET /api/cors-test` echoes the request origin for CORS checks
//! - `GET /` returns a banner
//!
//! Every response body uses the envelope in [`envelope`].

pub mod client_ip;
pub mod envelope;
pub mod handlers;
pub mod limiter;

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{Config, ServerConfig};
use crate::error::Result;
use crate::service::ContactService;

pub use envelope::{ApiError, ErrorCode};
pub use limiter::RequestLimiter;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The submission pipeline.
    pub service: ContactService,
    /// Request-level limiter.
    pub limiter: RequestLimiter,
    /// Whether proxy headers identify the client.
    pub trust_forwarded_headers: bool,
}

impl AppState {
    /// Build state from the server configuration.
    #[must_use]
    pub fn new(service: ContactService, config: &ServerConfig) -> Self {
        Self {
            service,
            limiter: RequestLimiter::new(
                config.request_limit,
                Duration::from_secs(config.request_window_secs),
            ),
            trust_forwarded_headers: config.trust_forwarded_headers,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/contact", post(handlers::submit_contact))
        .route("/api/contact/stats", get(handlers::contact_stats))
        .route("/api/health", get(handlers::health))
        .route("/api/cors-test", get(handlers::cors_test))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            limiter::limit_requests,
        ))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins. An empty list allows any origin without
/// credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Bind, serve until Ctrl-C or SIGTERM, then wait for pending emails.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(config: &Config, service: ContactService) -> Result<()> {
    let notifier = service.notifier().clone();
    let state = AppState::new(service, &config.server);

    if state.limiter.is_enabled() {
        let limiter = state.limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window());
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        });
    }

    let app = router(state, &config.server);

    let listener = TcpListener::bind(config.server.bind).await?;
    info!("Server running on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if !notifier.drain(config.email.timeout()).await {
        warn!("Email deliveries still pending at shutdown were abandoned");
    }

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::admission::AdmissionPolicy;
    use crate::notify::testing::{notifier, Behavior, RecordingMailer};
    use crate::storage::Storage;

    fn app_with(mailer: &Arc<RecordingMailer>, server: &ServerConfig) -> Router {
        let service = ContactService::new(
            Storage::open_in_memory().unwrap(),
            AdmissionPolicy::default(),
            notifier(mailer),
        );
        router(AppState::new(service, server), server)
    }

    fn app(mailer: &Arc<RecordingMailer>) -> Router {
        app_with(mailer, &ServerConfig::default())
    }

    fn form(email: &str, message: &str) -> Value {
        json!({
            "name": "Ada Lovelace",
            "email": email,
            "subject": "Project inquiry",
            "message": message,
        })
    }

    /// Attach the socket peer address the way `serve` does.
    fn from_peer(mut request: Request<Body>, ip: &str) -> Request<Body> {
        let peer = SocketAddr::new(ip.parse().unwrap(), 40_000);
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    fn post_contact(body: &Value, ip: &str) -> Request<Body> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .header("content-type", "application/json")
            .header("user-agent", "integration-test")
            .body(Body::from(body.to_string()))
            .unwrap();
        from_peer(request, ip)
    }

    fn post_contact_forwarded(body: &Value, peer: &str, forwarded_for: &str) -> Request<Body> {
        let mut request = post_contact(body, peer);
        request
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse().unwrap());
        request
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn wait_for_attempts(mailer: &RecordingMailer, expected: usize) {
        for _ in 0..200 {
            if mailer.attempts() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {expected} attempts, saw {}", mailer.attempts());
    }

    #[tokio::test]
    async fn test_sixth_submission_from_ip_is_rate_limited() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);

        for i in 0..5 {
            let body = form(
                &format!("visitor{i}@example.com"),
                &format!("Hello, this is message number {i}."),
            );
            let (status, _) = send(&app, post_contact(&body, "198.51.100.1")).await;
            assert_eq!(status, StatusCode::CREATED, "submission {i}");
        }

        let body = form("visitor6@example.com", "Hello, this is one too many.");
        let (status, json) = send(&app, post_contact(&body, "198.51.100.1")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "IP_RATE_LIMIT_EXCEEDED");

        // Another client is still welcome
        let (status, _) = send(&app, post_contact(&body, "198.51.100.2")).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_conflict() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);
        let body = form("same@example.com", "I am sending this exact text twice.");

        let (status, _) = send(&app, post_contact(&body, "198.51.100.1")).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = send(&app, post_contact(&body, "198.51.100.9")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "DUPLICATE_SUBMISSION");
    }

    #[tokio::test]
    async fn test_name_with_digits_is_bad_request() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);
        let mut body = form("r2@example.com", "Beep boop, this is a droid.");
        body["name"] = json!("R2D2");

        let (status, json) = send(&app, post_contact(&body, "198.51.100.1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["details"][0]["field"], "name");
        assert_eq!(json["error"]["details"][0]["value"], "R2D2");
        assert_eq!(mailer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_accepted_submission_does_not_wait_for_email() {
        let mailer = RecordingMailer::new(Behavior::Stall(Duration::from_secs(30)));
        let app = app(&mailer);
        let body = form("patient@example.com", "I can wait for the reply.");

        let (status, json) = tokio::time::timeout(
            Duration::from_secs(5),
            send(&app, post_contact(&body, "198.51.100.1")),
        )
        .await
        .expect("response should not wait for email delivery");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], handlers::THANK_YOU_MESSAGE);
        assert!(json["data"]["id"].as_i64().is_some());
        assert!(json["data"]["timestamp"].is_string());
        assert_eq!(json["data"]["status"], "new");
    }

    #[tokio::test]
    async fn test_email_failure_does_not_change_response() {
        let mailer = RecordingMailer::new(Behavior::Fail);
        let app = app(&mailer);
        let body = form("unlucky@example.com", "The mail server is down today.");

        let (status, json) = send(&app, post_contact(&body, "198.51.100.1")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["success"], true);

        wait_for_attempts(&mailer, 2).await;
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);
        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_missing_fields_are_required() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);

        let (status, json) = send(&app, post_contact(&json!({ "name": 7 }), "198.51.100.1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let details = json["error"]["details"].as_array().unwrap();
        assert_eq!(details.len(), 4);
        assert_eq!(details[0]["message"], "Name is required");
    }

    #[tokio::test]
    async fn test_stats_counts_submissions() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);
        let body = form("counted@example.com", "Please count this message.");
        send(&app, post_contact(&body, "198.51.100.1")).await;

        let (status, json) = send(&app, get("/api/contact/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["totalSubmissions"], 1);
        assert_eq!(json["data"]["todaySubmissions"], 1);
        assert_eq!(json["data"]["thisWeekSubmissions"], 1);
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);

        let (status, json) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["status"], "OK");
        assert_eq!(json["database"], "connected");
        assert!(json["email"]["host"].is_string());

        let (status, json) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Portfolio API Server Running");
    }

    #[tokio::test]
    async fn test_cors_test_echoes_origin() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);

        let request = Request::builder()
            .uri("/api/cors-test")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "CORS is working correctly");
        assert_eq!(json["origin"], "http://localhost:5173");
        assert!(json["timestamp"].is_string());

        let (_, json) = send(&app, get("/api/cors-test")).await;
        assert!(json["origin"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found_envelope() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);

        let (status, json) = send(&app, get("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_request_limiter_returns_envelope() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let server = ServerConfig {
            request_limit: 2,
            ..ServerConfig::default()
        };
        let app = app_with(&mailer, &server);

        // A fresh forwarded address on every request changes nothing
        let request = |i: u8| {
            let request = Request::builder()
                .uri("/")
                .header("x-forwarded-for", format!("10.0.0.{i}"))
                .body(Body::empty())
                .unwrap();
            from_peer(request, "203.0.113.50")
        };
        assert_eq!(send(&app, request(1)).await.0, StatusCode::OK);
        assert_eq!(send(&app, request(2)).await.0, StatusCode::OK);

        let (status, json) = send(&app, request(3)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_evade_ip_limit() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);

        let mut statuses = Vec::new();
        for i in 0..6 {
            let body = form(
                &format!("rotating{i}@example.com"),
                &format!("Trying a new forwarded address, attempt {i}."),
            );
            let request = post_contact_forwarded(&body, "203.0.113.77", &format!("10.9.9.{i}"));
            statuses.push(send(&app, request).await.0);
        }

        assert_eq!(&statuses[..5], &[StatusCode::CREATED; 5]);
        assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_forwarded_for_used_when_trusted() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let server = ServerConfig {
            trust_forwarded_headers: true,
            ..ServerConfig::default()
        };
        let app = app_with(&mailer, &server);

        for i in 0..5 {
            let body = form(
                &format!("proxied{i}@example.com"),
                &format!("Sent through the reverse proxy, number {i}."),
            );
            let request = post_contact_forwarded(&body, "10.0.0.1", "198.51.100.10");
            assert_eq!(send(&app, request).await.0, StatusCode::CREATED);
        }

        // Same proxy peer, different client behind it
        let body = form("other@example.com", "A different visitor behind the proxy.");
        let request = post_contact_forwarded(&body, "10.0.0.1", "198.51.100.11");
        assert_eq!(send(&app, request).await.0, StatusCode::CREATED);

        let body = form("proxied9@example.com", "The first visitor tries once more.");
        let request = post_contact_forwarded(&body, "10.0.0.1", "198.51.100.10");
        assert_eq!(send(&app, request).await.0, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let mailer = RecordingMailer::new(Behavior::Succeed);
        let app = app(&mailer);

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/contact")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:5173")
        );
    }
}
