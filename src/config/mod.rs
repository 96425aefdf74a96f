//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::time::Duration;

use crate::error::{Error, Result};
use secrecy::SecretString;

const DEFAULT_DATABASE_URL: &str = "sqlite://reconciler.db";
const DEFAULT_TARGET_GROUP: &str = "6.6";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug)]
pub struct Config {
    pub database_url: String,
    pub case_api: CaseApiConfig,
    /// Target-group code used to select candidates upstream.
    pub target_group_code: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Connection parameters for the case-management API.
#[derive(Debug, Clone)]
pub struct CaseApiConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub api_key: SecretString,
    pub resource: String,
    /// Upper bound on every remote request.
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let base_url = required_var("BASE_URL")?.trim_end_matches('/').to_string();
        let token_url = std::env::var("TOKEN_URL").unwrap_or_else(|_| format!("{base_url}/token"));

        let request_timeout = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                Error::Config(format!("REQUEST_TIMEOUT_SECS must be a whole number, got {raw:?}"))
            })?),
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            database_url: Self::database_url_from_env(),
            case_api: CaseApiConfig {
                base_url,
                token_url,
                client_id: required_var("CLIENT_ID")?,
                client_secret: SecretString::from(required_var("CLIENT_SECRET")?),
                api_key: SecretString::from(required_var("API_KEY")?),
                resource: required_var("RESOURCE")?,
                request_timeout,
            },
            target_group_code: std::env::var("TARGET_GROUP_CODE")
                .unwrap_or_else(|_| DEFAULT_TARGET_GROUP.to_string()),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Queue database location. Operator commands need only this, not
    /// the API credentials.
    pub fn database_url_from_env() -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
