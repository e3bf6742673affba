//! Configuration management
//!
//! Configuration is read from `config.yml`; environment variables prefixed
//! with `STUDENT_HUB_` override individual fields. Missing values fall back
//! to defaults.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::services::session::ROTATION_THRESHOLD_SECS;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub holidays: HolidayConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (cookie auth needs an explicit origin)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5050
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/student_hub.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign session tokens. Token issuance fails without it.
    #[serde(default)]
    pub token_secret: Option<String>,
    /// Lifetime of a freshly issued token, in seconds
    #[serde(default = "default_token_duration")]
    pub token_duration_secs: i64,
    /// How long after expiry a token may still be exchanged for a new one
    #[serde(default = "default_grace_interval")]
    pub grace_interval_secs: i64,
    /// Upper bound on remembered revoked tokens. Rotation fails once it is reached.
    #[serde(default = "default_revocation_capacity")]
    pub revocation_capacity: u64,
    /// Add the `Secure` attribute to the session cookie
    #[serde(default)]
    pub cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_duration_secs: default_token_duration(),
            grace_interval_secs: default_grace_interval(),
            revocation_capacity: default_revocation_capacity(),
            cookie_secure: false,
        }
    }
}

fn default_token_duration() -> i64 {
    86_400
}

fn default_grace_interval() -> i64 {
    3600
}

fn default_revocation_capacity() -> u64 {
    100_000
}

/// Holiday scheduling configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HolidayConfig {
    /// Latest end date accepted for holidays and range queries
    #[serde(default)]
    pub max_end_date: Option<NaiveDate>,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the default configuration. Invalid YAML
    /// is reported with its location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides.
    ///
    /// Recognised variables:
    /// - STUDENT_HUB_SERVER_HOST, STUDENT_HUB_SERVER_PORT, STUDENT_HUB_SERVER_CORS_ORIGIN
    /// - STUDENT_HUB_DATABASE_DRIVER, STUDENT_HUB_DATABASE_URL
    /// - STUDENT_HUB_AUTH_TOKEN_SECRET, STUDENT_HUB_AUTH_TOKEN_DURATION_SECS,
    ///   STUDENT_HUB_AUTH_GRACE_INTERVAL_SECS, STUDENT_HUB_AUTH_REVOCATION_CAPACITY,
    ///   STUDENT_HUB_AUTH_COOKIE_SECURE
    /// - STUDENT_HUB_HOLIDAYS_MAX_END_DATE
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session layer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Tokens must outlive the rotation window
        if self.auth.token_duration_secs <= ROTATION_THRESHOLD_SECS {
            return Err(ConfigError::Invalid {
                field: "auth.token_duration_secs",
                message: format!(
                    "must be greater than {} seconds, got {}",
                    ROTATION_THRESHOLD_SECS, self.auth.token_duration_secs
                ),
            });
        }
        if self.auth.revocation_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "auth.revocation_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("STUDENT_HUB_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parsed::<u16>("STUDENT_HUB_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(origin) = std::env::var("STUDENT_HUB_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }

        if let Ok(driver) = std::env::var("STUDENT_HUB_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("STUDENT_HUB_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(secret) = std::env::var("STUDENT_HUB_AUTH_TOKEN_SECRET") {
            if !secret.is_empty() {
                self.auth.token_secret = Some(secret);
            }
        }
        if let Some(secs) = env_parsed::<i64>("STUDENT_HUB_AUTH_TOKEN_DURATION_SECS") {
            self.auth.token_duration_secs = secs;
        }
        if let Some(secs) = env_parsed::<i64>("STUDENT_HUB_AUTH_GRACE_INTERVAL_SECS") {
            self.auth.grace_interval_secs = secs;
        }
        if let Some(capacity) = env_parsed::<u64>("STUDENT_HUB_AUTH_REVOCATION_CAPACITY") {
            self.auth.revocation_capacity = capacity;
        }
        if let Some(secure) = env_parsed::<bool>("STUDENT_HUB_AUTH_COOKIE_SECURE") {
            self.auth.cookie_secure = secure;
        }

        if let Some(date) = env_parsed::<NaiveDate>("STUDENT_HUB_HOLIDAYS_MAX_END_DATE") {
            self.holidays.max_end_date = Some(date);
        }
    }
}

/// Read and parse an environment variable, ignoring unparseable values
fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Format YAML parsing error with location
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Config tests that touch the process environment serialize on this mutex.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "STUDENT_HUB_SERVER_HOST",
    "STUDENT_HUB_SERVER_PORT",
    "STUDENT_HUB_SERVER_CORS_ORIGIN",
    "STUDENT_HUB_DATABASE_DRIVER",
    "STUDENT_HUB_DATABASE_URL",
    "STUDENT_HUB_AUTH_TOKEN_SECRET",
    "STUDENT_HUB_AUTH_TOKEN_DURATION_SECS",
    "STUDENT_HUB_AUTH_GRACE_INTERVAL_SECS",
    "STUDENT_HUB_AUTH_REVOCATION_CAPACITY",
    "STUDENT_HUB_AUTH_COOKIE_SECURE",
    "STUDENT_HUB_HOLIDAYS_MAX_END_DATE",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}
