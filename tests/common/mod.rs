#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use serde_json::{Value, json};

use fleetdesk::config::Config;
use fleetdesk::state::AppState;
use fleetdesk::storage::MemoryStorage;

/// Serves `router` on an ephemeral port and returns its base URL.
pub async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Builds an unsigned JWT carrying `claims`.
pub fn make_token(claims: Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.test-signature")
}

/// A token valid for another hour.
pub fn live_token(email: &str) -> String {
    make_token(json!({
        "sub": 11,
        "email": email,
        "name": "Dispatch Desk",
        "role": "admin",
        "exp": Utc::now().timestamp() + 3600,
    }))
}

/// App state talking to `api_url`, persisting into `storage`.
pub fn app_state(api_url: &str, storage: Arc<MemoryStorage>) -> AppState {
    let config = Config {
        api_url: api_url.to_string(),
        ..Config::default()
    };
    AppState::with_storage(&config, storage).unwrap()
}
