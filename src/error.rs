use http::StatusCode;
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A transport error talking to the backend.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] sonic_rs::Error),

    /// The backend rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The backend reported the bearer token as invalid or expired.
    #[error("Session expired")]
    SessionExpired,

    /// A login response carried no recognizable token.
    #[error("Login response did not contain a token")]
    MissingToken,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A session storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A non-success response from the backend.
    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Converts the error into the message shown inline to the user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Http(e) => {
                tracing::error!("HTTP error: {}", e);
                "Could not reach the server. Please try again.".to_string()
            }

            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Local storage error".to_string()
            }

            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                "Unexpected response from the server".to_string()
            }

            AppError::Authentication(msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                msg.clone()
            }

            AppError::SessionExpired => {
                tracing::warn!("Session expired");
                "Your session has expired. Please sign in again.".to_string()
            }

            AppError::MissingToken => {
                tracing::warn!("Login response without token");
                "Login failed: the server did not return a session token".to_string()
            }

            AppError::Validation(msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                "Local storage error".to_string()
            }

            AppError::Api { status, message } => {
                tracing::debug!("API error {}: {}", status, message);
                message.clone()
            }

            AppError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                msg.clone()
            }
        }
    }
}
