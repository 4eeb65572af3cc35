use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TOKEN_SKEW_SECONDS;
use crate::models::user::{UserClaims, deserialize_lenient, deserialize_text};

/// The claims embedded in a bearer token.
///
/// Every field is optional: backends disagree on which claims they issue, and
/// the subject id shows up as `sub`, `id` or `user_id`. A claim of an
/// unexpected type reads as absent and never hides the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Standard JWT subject.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub sub: Option<String>,
    /// Explicit user id claim.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub id: Option<String>,
    /// Alternate user id claim.
    #[serde(default, alias = "userId", deserialize_with = "deserialize_text")]
    pub user_id: Option<String>,
    /// The user's email address.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub email: Option<String>,
    /// The user's display name.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub name: Option<String>,
    /// The user's role.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub role: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub exp: Option<f64>,
}

impl Claims {
    /// The subject id, taken from `id`, `user_id` or `sub` in that order.
    pub fn subject(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.user_id.as_deref())
            .or(self.sub.as_deref())
    }

    /// Converts the claims into the user identity they describe.
    pub fn into_user(self) -> UserClaims {
        let id = self.subject().map(str::to_string);
        UserClaims {
            id,
            email: self.email,
            name: self.name,
            role: self.role,
        }
    }
}

/// Decodes one base64url token segment, padded or not.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(trimmed))
        .ok()
}

/// Decodes the claims of a bearer token.
///
/// Returns `None` for anything malformed; the signature is not checked.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.trim().split('.');
    let _header = segments.next()?;
    let payload = segments.next().filter(|s| !s.is_empty())?;

    let bytes = decode_segment(payload)?;
    match sonic_rs::from_slice::<Claims>(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!("Token payload is not a claims object: {}", e);
            None
        }
    }
}

/// Whether the token is expired `skew_seconds` from `now`.
///
/// Undecodable tokens and tokens without `exp` count as expired.
pub fn is_expired_at(token: &str, skew_seconds: i64, now: DateTime<Utc>) -> bool {
    let Some(exp) = decode(token).and_then(|claims| claims.exp) else {
        return true;
    };
    let deadline = now.timestamp().saturating_add(skew_seconds);
    exp <= deadline as f64
}

/// Whether the token is expired `skew_seconds` from now.
pub fn is_expired(token: &str, skew_seconds: i64) -> bool {
    is_expired_at(token, skew_seconds, Utc::now())
}

/// Decodes tokens and judges their expiry for a session store.
pub trait TokenCodec: Send + Sync {
    /// Decodes the claims of `token`, or `None` when malformed.
    fn decode(&self, token: &str) -> Option<Claims>;

    /// Whether `token` counts as expired at `now`.
    fn is_expired_at(&self, token: &str, now: DateTime<Utc>) -> bool;

    /// Whether `token` counts as expired right now.
    fn is_expired(&self, token: &str) -> bool {
        self.is_expired_at(token, Utc::now())
    }
}

/// The codec for JWT compact-form bearer tokens.
#[derive(Debug, Clone, Copy)]
pub struct JwtCodec {
    /// Seconds subtracted from the token lifetime.
    pub skew_seconds: i64,
}

impl JwtCodec {
    /// Creates a codec with the given expiry skew.
    pub fn new(skew_seconds: i64) -> Self {
        Self { skew_seconds }
    }
}

impl Default for JwtCodec {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_SKEW_SECONDS)
    }
}

impl TokenCodec for JwtCodec {
    fn decode(&self, token: &str) -> Option<Claims> {
        decode(token)
    }

    fn is_expired_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        is_expired_at(token, self.skew_seconds, now)
    }
}
