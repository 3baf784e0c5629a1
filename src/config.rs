use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "KrishiGateway";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_AI_SERVICE_URL: &str = "http://localhost:8000";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Chat class: 50 requests per 15-minute window.
pub const DEFAULT_CHAT_LIMIT: u32 = 50;
/// Image-analysis class: 10 requests per 15-minute window.
pub const DEFAULT_IMAGE_LIMIT: u32 = 10;
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(15 * 60);
/// Upload ceiling for image analysis (10 MiB).
pub const DEFAULT_UPLOAD_MAX_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "krishi_gateway=info,tower_http=info"
}

/// Get the application data directory
/// ~/KrishiGateway/ when a home directory is known, the working directory otherwise.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the gateway's SQLite database.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("gateway.db")
}

/// Runtime configuration for the gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub ai_service_url: String,
    pub jwt_secret: String,
    pub database_path: PathBuf,
    pub cors_origin: String,
    pub chat_limit: u32,
    pub image_limit: u32,
    pub rate_window: Duration,
    pub upload_max_bytes: usize,
    /// Total attempts per upstream call. 1 means fail-fast.
    pub ai_retry_attempts: u32,
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        Ok(Self {
            bind_addr: parse_or(&lookup, "GATEWAY_BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?,
            ai_service_url: lookup("AI_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_AI_SERVICE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            jwt_secret,
            database_path: lookup("GATEWAY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_database_path),
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string()),
            chat_limit: parse_or(&lookup, "CHAT_RATE_LIMIT", Some(DEFAULT_CHAT_LIMIT))?,
            image_limit: parse_or(&lookup, "IMAGE_RATE_LIMIT", Some(DEFAULT_IMAGE_LIMIT))?,
            rate_window: Duration::from_secs(parse_or(
                &lookup,
                "RATE_WINDOW_SECS",
                Some(DEFAULT_RATE_WINDOW.as_secs()),
            )?),
            upload_max_bytes: parse_or(&lookup, "UPLOAD_MAX_BYTES", Some(DEFAULT_UPLOAD_MAX_BYTES))?,
            ai_retry_attempts: parse_or::<u32, _>(&lookup, "AI_RETRY_ATTEMPTS", Some(1))?.max(1),
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => default.ok_or(ConfigError::Missing(key)),
    }
}
