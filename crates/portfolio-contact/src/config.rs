//! Configuration management for portfolio-contact.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "portfolio-contact";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "submissions.db";

/// Environment variable prefix. Sections are separated by a double underscore,
/// e.g. `PORTFOLIO_EMAIL__PASSWORD`.
const ENV_PREFIX: &str = "PORTFOLIO_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PORTFOLIO_`)
/// 2. TOML config file at `~/.config/portfolio-contact/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Submission admission policy.
    pub admission: AdmissionConfig,
    /// Outbound email configuration.
    pub email: EmailConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener to.
    pub bind: SocketAddr,
    /// Origins allowed by CORS. Empty allows any origin without credentials.
    pub cors_origins: Vec<String>,
    /// Read the client address from `X-Forwarded-For` / `X-Real-IP`.
    ///
    /// Off by default: clients can set these headers freely, so only enable
    /// this behind a reverse proxy that overwrites them.
    pub trust_forwarded_headers: bool,
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
    /// Requests allowed per client IP in one window. 0 disables the limiter.
    pub request_limit: u64,
    /// Length of the request limiter window in seconds.
    pub request_window_secs: u64,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/portfolio-contact/submissions.db`
    pub database_path: Option<PathBuf>,
    /// Maximum age of submissions to retain in days.
    /// Set to 0 for unlimited.
    pub max_age_days: u32,
}

/// Admission policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Accepted submissions allowed per IP address inside `ip_window_secs`.
    pub max_per_ip: u32,
    /// Rate limit window in seconds.
    pub ip_window_secs: u64,
    /// Window in seconds inside which identical email + message is a duplicate.
    pub duplicate_window_secs: u64,
}

/// Outbound email configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Master switch for notifications.
    pub enabled: bool,
    /// SMTP relay host.
    pub host: String,
    /// SMTP port.
    pub port: u16,
    /// Use implicit TLS (port 465) instead of STARTTLS.
    pub secure: bool,
    /// SMTP username.
    pub username: Option<String>,
    /// SMTP password.
    pub password: Option<String>,
    /// Sender address. Falls back to `username`.
    pub from_address: Option<String>,
    /// Operator address receiving notifications. Falls back to the sender.
    pub notify_address: Option<String>,
    /// Name used to sign auto-replies.
    pub owner_name: String,
    /// Link included in outgoing mail.
    pub portfolio_url: String,
    /// UTC offset, in minutes, used when rendering timestamps.
    pub display_utc_offset_minutes: i32,
    /// SMTP command timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username.as_ref().map(|_| "***"))
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from_address", &self.from_address)
            .field("notify_address", &self.notify_address)
            .field("owner_name", &self.owner_name)
            .field("portfolio_url", &self.portfolio_url)
            .field("display_utc_offset_minutes", &self.display_utc_offset_minutes)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            trust_forwarded_headers: false,
            max_body_bytes: 1024 * 1024,
            request_limit: 100,
            request_window_secs: 15 * 60,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_per_ip: 5,
            ip_window_secs: 60 * 60,
            duplicate_window_secs: 5 * 60,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "smtp.gmail.com".to_string(),
            port: 587,
            secure: false,
            username: None,
            password: None,
            from_address: None,
            notify_address: None,
            owner_name: "Prince Kumar".to_string(),
            portfolio_url: "http://localhost:5173".to_string(),
            display_utc_offset_minutes: 330, // Asia/Kolkata
            timeout_secs: 30,
        }
    }
}

impl EmailConfig {
    /// Whether SMTP credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        non_empty(self.username.as_deref()).is_some()
            && non_empty(self.password.as_deref()).is_some()
    }

    /// Resolved sender address.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        non_empty(self.from_address.as_deref()).or_else(|| non_empty(self.username.as_deref()))
    }

    /// Resolved operator address.
    #[must_use]
    pub fn operator(&self) -> Option<&str> {
        non_empty(self.notify_address.as_deref()).or_else(|| self.sender())
    }

    /// SMTP command timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        Self::from_figment(Self::figment(&config_file))
    }

    /// The layered figment used by [`Config::load_from`].
    #[must_use]
    pub fn figment(config_file: &std::path::Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate a configuration from a figment.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.admission.max_per_ip == 0 {
            return Err(invalid("admission.max_per_ip must be greater than 0"));
        }
        if self.admission.ip_window_secs == 0 {
            return Err(invalid("admission.ip_window_secs must be greater than 0"));
        }
        if self.admission.duplicate_window_secs == 0 {
            return Err(invalid(
                "admission.duplicate_window_secs must be greater than 0",
            ));
        }

        if self.server.request_limit > 0 && self.server.request_window_secs == 0 {
            return Err(invalid(
                "server.request_window_secs must be greater than 0 when the limiter is on",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes must be greater than 0"));
        }
        for origin in &self.server.cors_origins {
            if origin.parse::<axum::http::HeaderValue>().is_err() || !origin.contains("://") {
                return Err(invalid(format!("invalid CORS origin: {origin}")));
            }
        }

        // Sixteen hours covers every real-world zone
        if self.email.display_utc_offset_minutes.abs() > 16 * 60 {
            return Err(invalid(format!(
                "email.display_utc_offset_minutes out of range: {}",
                self.email.display_utc_offset_minutes
            )));
        }
        for address in [
            self.email.from_address.as_deref(),
            self.email.notify_address.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if address.parse::<lettre::Address>().is_err() {
                return Err(invalid(format!("invalid email address: {address}")));
            }
        }
        if self.email.port == 0 {
            return Err(invalid("email.port must be greater than 0"));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the retention age as a Duration.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        if self.storage.max_age_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.storage.max_age_days) * 24 * 60 * 60,
            ))
        }
    }

    /// Get the request limiter window as a Duration.
    #[must_use]
    pub fn request_window(&self) -> Duration {
        Duration::from_secs(self.server.request_window_secs)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind.port(), 5000);
        assert!(!config.server.trust_forwarded_headers);
        assert_eq!(config.admission.max_per_ip, 5);
        assert_eq!(config.admission.ip_window_secs, 3600);
        assert_eq!(config.admission.duplicate_window_secs, 300);
        assert!(config.email.enabled);
    }

    #[test]
    fn test_default_email_config() {
        let email = EmailConfig::default();

        assert_eq!(email.host, "smtp.gmail.com");
        assert_eq!(email.port, 587);
        assert!(!email.secure);
        assert!(!email.has_credentials());
        assert_eq!(email.display_utc_offset_minutes, 330);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_max_per_ip() {
        let mut config = Config::default();
        config.admission.max_per_ip = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_per_ip"));
    }

    #[test]
    fn test_validate_zero_duplicate_window() {
        let mut config = Config::default();
        config.admission.duplicate_window_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate_window_secs"));
    }

    #[test]
    fn test_validate_limiter_window_only_checked_when_enabled() {
        let mut config = Config::default();
        config.server.request_window_secs = 0;
        assert!(config.validate().is_err());

        config.server.request_limit = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_cors_origin() {
        let mut config = Config::default();
        config.server.cors_origins = vec!["localhost".to_string()];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("CORS"));
    }

    #[test]
    fn test_validate_bad_sender_address() {
        let mut config = Config::default();
        config.email.from_address = Some("not an address".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("not an address"));
    }

    #[test]
    fn test_validate_offset_out_of_range() {
        let mut config = Config::default();
        config.email.display_utc_offset_minutes = 24 * 60;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sender_falls_back_to_username() {
        let mut email = EmailConfig::default();
        email.username = Some("me@example.com".to_string());

        assert_eq!(email.sender(), Some("me@example.com"));
        assert_eq!(email.operator(), Some("me@example.com"));

        email.from_address = Some("noreply@example.com".to_string());
        email.notify_address = Some("inbox@example.com".to_string());
        assert_eq!(email.sender(), Some("noreply@example.com"));
        assert_eq!(email.operator(), Some("inbox@example.com"));
    }

    #[test]
    fn test_blank_credentials_are_missing() {
        let mut email = EmailConfig::default();
        email.username = Some("me@example.com".to_string());
        email.password = Some("   ".to_string());

        assert!(!email.has_credentials());
    }

    #[test]
    fn test_email_debug_masks_secrets() {
        let mut email = EmailConfig::default();
        email.password = Some("hunter2".to_string());

        let debug_str = format!("{email:?}");
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("***"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config
            .database_path()
            .to_string_lossy()
            .contains("submissions.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_max_age() {
        let mut config = Config::default();
        assert!(config.max_age().is_none());

        config.storage.max_age_days = 30;
        assert_eq!(
            config.max_age(),
            Some(Duration::from_secs(30 * 24 * 60 * 60))
        );
    }

    #[test]
    fn test_request_window() {
        let config = Config::default();
        assert_eq!(config.request_window(), Duration::from_secs(900));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("portfolio-contact"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [admission]
                max_per_ip = 3

                [email]
                owner_name = "Someone Else"
                "#,
            ));

        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.admission.max_per_ip, 3);
        assert_eq!(config.admission.duplicate_window_secs, 300);
        assert_eq!(config.email.owner_name, "Someone Else");
    }

    #[test]
    fn test_forwarded_headers_opt_in() {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string("[server]\ntrust_forwarded_headers = true\n"));

        let config = Config::from_figment(figment).unwrap();
        assert!(config.server.trust_forwarded_headers);
    }

    #[test]
    fn test_invalid_toml_value_fails_validation() {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string("[admission]\nip_window_secs = 0\n"));

        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("max_per_ip"));
        assert!(json.contains("cors_origins"));
    }
}
