use http::{HeaderMap, Method, StatusCode, header};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::models::user::{UserClaims, deserialize_lenient};
use crate::services::api::{ApiClient, RawResponse};
use crate::services::session::Portal;
use crate::validation::auth::{LoginCredentials, validate_credentials};

/// The admin login endpoint.
pub const ADMIN_LOGIN_PATH: &str = "/auth/login";
/// The client portal login endpoint.
pub const CLIENT_LOGIN_PATH: &str = "/api/v1/client/login";
/// The client portal logout endpoint.
pub const CLIENT_LOGOUT_PATH: &str = "/api/v1/client/logout";

#[derive(Serialize)]
struct CredentialsBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct AdminLoginBody<'a> {
    user: CredentialsBody<'a>,
}

#[derive(Deserialize, Default)]
struct LoginData {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    user: Option<UserClaims>,
}

/// The shapes a login reply comes in.
///
/// Each field is read on its own, so an odd `user` object never costs the
/// token and vice versa.
#[derive(Deserialize, Default)]
struct LoginReply {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    jwt: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    access_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    data: Option<LoginData>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    user: Option<UserClaims>,
}

fn bearer_from_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    if value.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => value,
    };
    (!token.is_empty()).then(|| token.to_string())
}

/// Finds the token in a login reply.
///
/// Checked in order: `Authorization` header, `token`, `jwt`, `access_token`,
/// `data.token`.
fn extract_token(headers: &HeaderMap, reply: &LoginReply) -> Option<String> {
    let nested = reply.data.as_ref().and_then(|data| data.token.clone());
    bearer_from_header(headers)
        .into_iter()
        .chain([reply.token.clone(), reply.jwt.clone(), reply.access_token.clone(), nested].into_iter().flatten())
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

fn login_failure(response: &RawResponse) -> AppError {
    let message = if response.body.trim().is_empty()
        && matches!(response.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    {
        "Invalid email or password".to_string()
    } else {
        response.error_message()
    };
    AppError::Authentication(message)
}

/// Signs a portal in and out against the backend.
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    /// Creates the service on top of a portal's API client.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn portal(&self) -> Portal {
        self.api.store().profile().portal
    }

    /// The login endpoints of a portal, in the order they are tried.
    pub fn login_paths(portal: Portal) -> &'static [&'static str] {
        match portal {
            Portal::Admin => &[ADMIN_LOGIN_PATH],
            Portal::Client => &[CLIENT_LOGIN_PATH, ADMIN_LOGIN_PATH],
        }
    }

    fn login_body(&self, credentials: &LoginCredentials) -> Result<String> {
        let inner = CredentialsBody {
            email: &credentials.email,
            password: &credentials.password,
        };
        let body = match self.portal() {
            Portal::Admin => sonic_rs::to_string(&AdminLoginBody { user: inner })?,
            Portal::Client => sonic_rs::to_string(&inner)?,
        };
        Ok(body)
    }

    /// Logs in and stores the resulting session.
    ///
    /// On any failure the stored session is left as it was.
    ///
    /// # Arguments
    ///
    /// * `credentials` - The email and password entered by the user.
    ///
    /// # Returns
    ///
    /// A `Result` containing the new `Session`.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Session> {
        let portal = self.portal();
        tracing::info!("🔐 {} login attempt for {}", portal, credentials.email);
        validate_credentials(credentials)?;

        let body = self.login_body(credentials)?;
        let response = self
            .api
            .post_with_fallback(Self::login_paths(portal), &body)
            .await?;

        if !response.status.is_success() {
            tracing::warn!("❌ {} login rejected with {}", portal, response.status);
            return Err(login_failure(&response));
        }

        let reply: LoginReply = if response.body.trim().is_empty() {
            LoginReply::default()
        } else {
            sonic_rs::from_str(&response.body).unwrap_or_else(|e| {
                tracing::warn!("❌ Unexpected login reply shape: {}", e);
                LoginReply::default()
            })
        };

        let token = extract_token(&response.headers, &reply).ok_or_else(|| {
            tracing::warn!("❌ {} login reply carried no token", portal);
            AppError::MissingToken
        })?;
        let user = reply.user.or_else(|| reply.data.and_then(|data| data.user));

        let store = self.api.store();
        store.set_session(token, user);
        tracing::info!("✅ {} login succeeded for {}", portal, credentials.email);

        Ok(store.session())
    }

    /// Logs out. The local session is cleared even if the backend call fails.
    pub async fn logout(&self) {
        if self.portal() == Portal::Client {
            match self
                .api
                .send_raw(Method::POST, CLIENT_LOGOUT_PATH, None, true)
                .await
            {
                Ok(response) if response.status.is_success() => {
                    tracing::debug!("✅ Backend logout acknowledged");
                }
                Ok(response) => {
                    tracing::debug!("Backend logout answered {}, ignoring", response.status);
                }
                Err(e) => {
                    tracing::debug!("Backend logout failed, ignoring: {}", e);
                }
            }
        }

        self.api.store().clear_session();
    }
}
