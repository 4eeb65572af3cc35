use std::sync::Arc;

use http::{HeaderMap, Method, StatusCode, header};
use reqwest::{RequestBuilder, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{AppError, Result};
use crate::models::user::deserialize_text;
use crate::services::session::SessionStore;

/// A response read to completion.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The response status.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body as text.
    pub body: String,
}

impl RawResponse {
    /// Decodes the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = if self.body.trim().is_empty() { "null" } else { self.body.as_str() };
        Ok(sonic_rs::from_str(body)?)
    }

    /// The most specific human-readable message the body offers.
    pub fn error_message(&self) -> String {
        error_message(self.status, &self.body)
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default, deserialize_with = "deserialize_text")]
    message: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    error: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    detail: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    code: Option<String>,
}

fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = sonic_rs::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.error)
        .or(parsed.detail)
        .filter(|msg| !msg.trim().is_empty())
        .unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() || text.len() > 200 || text.starts_with(['{', '[', '<']) {
                format!("Request failed (HTTP {})", status.as_u16())
            } else {
                text.to_string()
            }
        })
}

/// Tokens that are not the session's bearer token.
const OTHER_TOKENS: [&str; 8] = [
    "csrf",
    "xsrf",
    "reset",
    "refresh",
    "verification",
    "invite",
    "invitation",
    "confirmation",
];

const REJECTIONS: [&str; 4] = ["invalid", "expired", "malformed", "revoked"];

/// Whether `text` says the bearer token is bad: it names a JWT, a bearer or
/// access token, or a bare "token", alongside a rejection word.
fn mentions_bad_token(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    let about_token = words.iter().enumerate().any(|(i, word)| match *word {
        "jwt" | "bearer" => true,
        "token" => i == 0 || !OTHER_TOKENS.contains(&words[i - 1]),
        _ => false,
    });
    let bad = words.iter().any(|word| REJECTIONS.contains(word));
    about_token && bad
}

/// Whether a 401 response says the bearer token itself was rejected.
///
/// An `invalid_token` challenge in `WWW-Authenticate` settles it. Failing
/// that, a symbolic `code` field in a JSON body decides alone; the body text
/// is read only when there is no such code.
pub fn is_invalid_token_signal(headers: &HeaderMap, body: &str) -> bool {
    let challenge = headers
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("invalid_token"));
    if challenge {
        return true;
    }

    let parsed: ErrorBody = sonic_rs::from_str(body).unwrap_or_default();
    if let Some(code) = parsed.code.filter(|code| code.chars().any(|c| c.is_ascii_alphabetic())) {
        return mentions_bad_token(&code);
    }
    mentions_bad_token(body)
}

/// The HTTP client for the backend API, bound to one session store.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
}

impl ApiClient {
    /// Creates a client for the API at `base_url`.
    pub fn new(base_url: &str, store: Arc<SessionStore>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Self::with_http(http, base_url, store)
    }

    /// Creates a client that reuses an existing `reqwest::Client`.
    pub fn with_http(http: reqwest::Client, base_url: &str, store: Arc<SessionStore>) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid API base URL {:?}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(AppError::Config(format!("API base URL {:?} cannot be a base", base_url)));
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    /// The session store requests are authorized from.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn url(&self, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| AppError::Validation(format!("Invalid API path {:?}: {}", path, e)))
    }

    /// The bearer token for the next request.
    ///
    /// Before the store is hydrated the token is read from storage directly.
    pub fn bearer_token(&self) -> Option<String> {
        if self.store.is_hydrated() {
            self.store.token()
        } else {
            self.store.persisted_token()
        }
    }

    fn request(&self, method: Method, path: &str, body: Option<String>, authorize: bool) -> Result<RequestBuilder> {
        let mut request = self
            .http
            .request(method, self.url(path)?)
            .header(header::ACCEPT, "application/json");

        if authorize {
            if let Some(token) = self.bearer_token() {
                request = request.bearer_auth(token);
            }
        }
        if let Some(body) = body {
            request = request.header(header::CONTENT_TYPE, "application/json").body(body);
        }
        Ok(request)
    }

    async fn execute(request: RequestBuilder) -> Result<RawResponse> {
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(RawResponse { status, headers, body })
    }

    /// Sends a request and returns the response whatever its status.
    ///
    /// No session bookkeeping happens here; callers inspect the status.
    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        authorize: bool,
    ) -> Result<RawResponse> {
        tracing::debug!("➡️ {} {}", method, path);
        let request = self.request(method, path, body, authorize)?;
        Self::execute(request).await
    }

    /// Sends an authorized request, clearing the session when the backend
    /// rejects the token.
    pub async fn send(&self, method: Method, path: &str, body: Option<String>) -> Result<RawResponse> {
        let response = self.send_raw(method, path, body, true).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            if is_invalid_token_signal(&response.headers, &response.body) {
                tracing::warn!("❌ Backend rejected the {} token, clearing session", self.store.profile().portal);
                self.store.clear_session();
                return Err(AppError::SessionExpired);
            }
            tracing::debug!("401 without token signal on {}", path);
        }

        if !response.status.is_success() {
            return Err(AppError::Api {
                status: response.status,
                message: response.error_message(),
            });
        }
        Ok(response)
    }

    /// Sends an unauthenticated `POST` to each path in turn.
    ///
    /// Moves on only when an endpoint answers 404 or 405.
    pub async fn post_with_fallback(&self, paths: &[&str], body: &str) -> Result<RawResponse> {
        let mut last = None;
        for path in paths {
            let response = self
                .send_raw(Method::POST, path, Some(body.to_string()), false)
                .await?;
            if matches!(response.status, StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED) {
                tracing::debug!("↪️ {} answered {}, trying next endpoint", path, response.status);
                last = Some(response);
                continue;
            }
            return Ok(response);
        }
        last.ok_or_else(|| AppError::Validation("No endpoints to try".to_string()))
    }

    /// `GET` a JSON resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, None).await?.json()
    }

    /// `POST` a JSON body and decode the JSON reply.
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let body = sonic_rs::to_string(body)?;
        self.send(Method::POST, path, Some(body)).await?.json()
    }

    /// `PUT` a JSON body and decode the JSON reply.
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let body = sonic_rs::to_string(body)?;
        self.send(Method::PUT, path, Some(body)).await?.json()
    }

    /// `DELETE` a resource.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }
}
