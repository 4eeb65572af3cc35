use garde::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AppError, Result};

/// Credentials entered on a login form.
///
/// The password is wiped from memory when the value is dropped.
#[derive(Validate, Zeroize, ZeroizeOnDrop)]
pub struct LoginCredentials {
    /// The account email.
    #[garde(email)]
    pub email: String,
    /// The account password.
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

impl LoginCredentials {
    /// Creates credentials, trimming whitespace around the email.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        let email: String = email.into();
        Self {
            email: email.trim().to_string(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validates login credentials.
///
/// # Arguments
///
/// * `credentials` - The credentials to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the credentials are usable.
pub fn validate_credentials(credentials: &LoginCredentials) -> Result<()> {
    if credentials.email.is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }

    if credentials.password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }

    credentials
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))
}
