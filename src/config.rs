use std::env;
use std::path::PathBuf;
use anyhow::{Context, Result};

/// Default base URL of the trip-management API.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:4000";
/// Default safety margin applied when checking token expiry.
pub const DEFAULT_TOKEN_SKEW_SECONDS: i64 = 30;
/// Default storage key of the admin session.
pub const DEFAULT_ADMIN_STORAGE_KEY: &str = "fleetdesk-admin-auth";
/// Default storage key of the client-portal session.
pub const DEFAULT_CLIENT_STORAGE_KEY: &str = "fleetdesk-client-auth";

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The base URL of the backend REST API.
    pub api_url: String,
    /// The directory holding persisted sessions.
    pub session_dir: PathBuf,
    /// Seconds subtracted from a token's lifetime when checking expiry.
    pub token_skew_seconds: i64,
    /// The storage key of the admin session.
    pub admin_storage_key: String,
    /// The storage key of the client-portal session.
    pub client_storage_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            session_dir: PathBuf::from(".fleetdesk"),
            token_skew_seconds: DEFAULT_TOKEN_SKEW_SECONDS,
            admin_storage_key: DEFAULT_ADMIN_STORAGE_KEY.to_string(),
            client_storage_key: DEFAULT_CLIENT_STORAGE_KEY.to_string(),
        }
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let token_skew_seconds: i64 = env::var("TOKEN_SKEW_SECONDS")
            .unwrap_or_else(|_| DEFAULT_TOKEN_SKEW_SECONDS.to_string())
            .parse()
            .context("Invalid TOKEN_SKEW_SECONDS")?;

        if token_skew_seconds < 0 {
            anyhow::bail!("TOKEN_SKEW_SECONDS must not be negative");
        }

        let admin_storage_key = env::var("ADMIN_STORAGE_KEY")
            .unwrap_or_else(|_| DEFAULT_ADMIN_STORAGE_KEY.to_string());
        let client_storage_key = env::var("CLIENT_STORAGE_KEY")
            .unwrap_or_else(|_| DEFAULT_CLIENT_STORAGE_KEY.to_string());

        if admin_storage_key == client_storage_key {
            anyhow::bail!("ADMIN_STORAGE_KEY and CLIENT_STORAGE_KEY must differ");
        }

        Ok(Self {
            api_url: env::var("FLEETDESK_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            session_dir: env::var("FLEETDESK_SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".fleetdesk")),
            token_skew_seconds,
            admin_storage_key,
            client_storage_key,
        })
    }
}
