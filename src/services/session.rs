use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::crypto::token::{JwtCodec, TokenCodec};
use crate::error::AppError;
use crate::models::session::{PersistedSession, Session};
use crate::models::user::UserClaims;
use crate::storage::SessionStorage;

/// Which surface a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Portal {
    /// The operations dashboard.
    Admin,
    /// The client-facing portal under `/client`.
    Client,
}

impl Portal {
    /// The route protected views redirect to when signed out.
    pub fn login_route(self) -> &'static str {
        match self {
            Portal::Admin => "/login",
            Portal::Client => "/client/login",
        }
    }

    /// Whether `path` belongs to this portal's screens.
    fn owns(self, path: &str) -> bool {
        let in_client_area = path == "/client" || path.starts_with("/client/");
        match self {
            Portal::Admin => !in_client_area,
            Portal::Client => in_client_area,
        }
    }
}

impl std::fmt::Display for Portal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Portal::Admin => f.write_str("admin"),
            Portal::Client => f.write_str("client"),
        }
    }
}

/// Strips query, fragment and trailing slashes from a route.
fn normalize_route(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// The capability set a session store is built from.
#[derive(Clone)]
pub struct SessionProfile {
    /// The portal this profile serves.
    pub portal: Portal,
    /// The storage key the session is persisted under.
    pub storage_key: String,
    /// The route unauthenticated visitors are sent to.
    pub login_route: String,
    /// Decodes tokens and judges expiry.
    pub codec: Arc<dyn TokenCodec>,
}

impl SessionProfile {
    /// The admin dashboard profile.
    pub fn admin(config: &Config) -> Self {
        Self {
            portal: Portal::Admin,
            storage_key: config.admin_storage_key.clone(),
            login_route: Portal::Admin.login_route().to_string(),
            codec: Arc::new(JwtCodec::new(config.token_skew_seconds)),
        }
    }

    /// The client portal profile.
    pub fn client(config: &Config) -> Self {
        Self {
            portal: Portal::Client,
            storage_key: config.client_storage_key.clone(),
            login_route: Portal::Client.login_route().to_string(),
            codec: Arc::new(JwtCodec::new(config.token_skew_seconds)),
        }
    }

    /// Whether `path` is a protected view of this portal.
    pub fn is_protected(&self, path: &str) -> bool {
        let route = normalize_route(path);
        self.portal.owns(route) && route != normalize_route(&self.login_route)
    }
}

impl std::fmt::Debug for SessionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProfile")
            .field("portal", &self.portal)
            .field("storage_key", &self.storage_key)
            .field("login_route", &self.login_route)
            .finish_non_exhaustive()
    }
}

/// What subscribers of a store observe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// The current session.
    pub session: Session,
    /// Whether the store has been loaded from storage.
    pub hydrated: bool,
}

/// Owns one session: keeps it in memory, persists it and notifies subscribers.
pub struct SessionStore {
    profile: SessionProfile,
    storage: Arc<dyn SessionStorage>,
    state: watch::Sender<SessionState>,
}

impl SessionStore {
    /// Creates an unhydrated store. Call [`SessionStore::hydrate`] before use.
    pub fn new(profile: SessionProfile, storage: Arc<dyn SessionStorage>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { profile, storage, state }
    }

    /// The profile this store was built from.
    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    /// Loads the persisted session, replacing whatever is held in memory.
    pub fn hydrate(&self) {
        let session = self.load();
        tracing::debug!(
            "🔄 Hydrated {} session (token present: {})",
            self.profile.portal,
            session.token.is_some()
        );
        self.state.send_replace(SessionState { session, hydrated: true });
    }

    /// Whether [`SessionStore::hydrate`] has completed.
    pub fn is_hydrated(&self) -> bool {
        self.state.borrow().hydrated
    }

    /// Stores `token`, deriving the user from its claims and `user_override`.
    ///
    /// The override only applies when it carries an id, email or name.
    pub fn set_session(&self, token: impl Into<String>, user_override: Option<UserClaims>) {
        let token = token.into();
        if token.trim().is_empty() {
            tracing::warn!("❌ Refusing to store an empty {} token", self.profile.portal);
            self.clear_session();
            return;
        }

        let decoded = self.profile.codec.decode(&token).map(|claims| claims.into_user());
        let user = match user_override.filter(UserClaims::has_identity) {
            Some(explicit) => Some(explicit.overlay(decoded.unwrap_or_default())),
            None => decoded,
        };

        let session = Session { token: Some(token), user };
        self.save(&session);
        self.state.send_modify(|state| {
            state.session = session;
            state.hydrated = true;
        });
        tracing::info!("✅ {} session stored", self.profile.portal);
    }

    /// Forgets the token and user, in memory and in storage.
    pub fn clear_session(&self) {
        if let Err(e) = self.storage.remove(&self.profile.storage_key) {
            tracing::warn!("❌ Failed to remove persisted {} session: {}", self.profile.portal, e);
        }
        self.state.send_modify(|state| {
            state.session = Session::default();
            state.hydrated = true;
        });
        tracing::info!("👋 {} session cleared", self.profile.portal);
    }

    /// Whether a token is held and is not expired at this instant.
    pub fn is_authenticated(&self) -> bool {
        let token = self.state.borrow().session.token.clone();
        token.is_some_and(|token| !self.profile.codec.is_expired(&token))
    }

    /// The current session.
    pub fn session(&self) -> Session {
        self.state.borrow().session.clone()
    }

    /// The current token.
    pub fn token(&self) -> Option<String> {
        self.state.borrow().session.token.clone()
    }

    /// The current user.
    pub fn user(&self) -> Option<UserClaims> {
        self.state.borrow().session.user.clone()
    }

    /// The token as persisted, read straight from storage.
    pub fn persisted_token(&self) -> Option<String> {
        self.load().token
    }

    /// Subscribes to every change of the session.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn save(&self, session: &Session) {
        let envelope = PersistedSession { state: session.clone() };
        let result = sonic_rs::to_string(&envelope)
            .map_err(AppError::from)
            .and_then(|raw| self.storage.save(&self.profile.storage_key, &raw));

        if let Err(e) = result {
            tracing::warn!("❌ Failed to persist {} session: {}", self.profile.portal, e);
        }
    }

    fn load(&self) -> Session {
        let raw = match self.storage.load(&self.profile.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Session::default(),
            Err(e) => {
                tracing::warn!("❌ Session storage unreadable, starting signed out: {}", e);
                return Session::default();
            }
        };

        match sonic_rs::from_str::<PersistedSession>(&raw) {
            Ok(envelope) => envelope.state.normalized(),
            Err(e) => {
                tracing::warn!("❌ Corrupt persisted session, starting signed out: {}", e);
                Session::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use base64::{Engine as _, engine::general_purpose};
    use chrono::Utc;

    fn token(claims: &str) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#);
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims);
        format!("{header}.{payload}.sig")
    }

    fn live_token() -> String {
        let exp = Utc::now().timestamp() + 3600;
        token(&format!(r#"{{"sub":"9","email":"token@fleet.io","name":"Token Name","role":"driver","exp":{exp}}}"#))
    }

    fn store_with(storage: Arc<MemoryStorage>) -> SessionStore {
        let store = SessionStore::new(SessionProfile::admin(&Config::default()), storage);
        store.hydrate();
        store
    }

    fn store() -> SessionStore {
        store_with(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn live_token_authenticates() {
        let store = store();
        store.set_session(live_token(), None);

        assert!(store.is_authenticated());
        let user = store.user().unwrap();
        assert_eq!(user.id.as_deref(), Some("9"));
        assert_eq!(user.email.as_deref(), Some("token@fleet.io"));
    }

    #[test]
    fn numeric_role_claim_still_authenticates() {
        let store = store();
        let exp = Utc::now().timestamp() + 3600;
        store.set_session(token(&format!(r#"{{"sub":"1","role":2,"exp":{exp}}}"#)), None);

        assert!(store.is_authenticated());
        assert_eq!(store.user().unwrap().role.as_deref(), Some("2"));
    }

    #[test]
    fn expired_token_does_not_authenticate() {
        let store = store();
        let exp = Utc::now().timestamp() - 5;
        store.set_session(token(&format!(r#"{{"exp":{exp}}}"#)), None);

        assert!(store.token().is_some());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn token_inside_skew_does_not_authenticate() {
        let store = store();
        let exp = Utc::now().timestamp() + 10;
        store.set_session(token(&format!(r#"{{"exp":{exp}}}"#)), None);

        assert!(!store.is_authenticated());
    }

    #[test]
    fn clear_always_signs_out() {
        let store = store();
        store.set_session(live_token(), None);
        store.clear_session();

        assert!(!store.is_authenticated());
        assert_eq!(store.user(), None);
        assert_eq!(store.token(), None);

        store.clear_session();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn override_wins_over_decoded_claims() {
        let store = store();
        let explicit = UserClaims {
            email: Some("explicit@fleet.io".into()),
            ..Default::default()
        };
        store.set_session(live_token(), Some(explicit));

        let user = store.user().unwrap();
        assert_eq!(user.email.as_deref(), Some("explicit@fleet.io"));
        assert_eq!(user.name.as_deref(), Some("Token Name"));
        assert_eq!(user.role.as_deref(), Some("driver"));
    }

    #[test]
    fn override_without_identity_is_ignored() {
        let store = store();
        let explicit = UserClaims {
            role: Some("superuser".into()),
            ..Default::default()
        };
        store.set_session(live_token(), Some(explicit));

        assert_eq!(store.user().unwrap().role.as_deref(), Some("driver"));
    }

    #[test]
    fn opaque_token_keeps_explicit_user() {
        let store = store();
        let explicit = UserClaims {
            email: Some("a@b.com".into()),
            ..Default::default()
        };
        store.set_session("abc", Some(explicit));

        assert_eq!(store.token().as_deref(), Some("abc"));
        assert_eq!(store.user().unwrap().email.as_deref(), Some("a@b.com"));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn empty_token_clears() {
        let store = store();
        store.set_session(live_token(), None);
        store.set_session("   ", None);

        assert_eq!(store.session(), Session::default());
    }

    #[test]
    fn session_survives_rehydration() {
        let storage = Arc::new(MemoryStorage::new());
        let token = live_token();
        store_with(storage.clone()).set_session(token.clone(), None);

        let raw = storage.load("fleetdesk-admin-auth").unwrap().unwrap();
        assert!(raw.starts_with(r#"{"state":"#));

        let reloaded = store_with(storage);
        assert_eq!(reloaded.token(), Some(token));
        assert!(reloaded.is_authenticated());
    }

    #[test]
    fn corrupt_storage_hydrates_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save("fleetdesk-admin-auth", "{not json").unwrap();

        let store = store_with(storage);
        assert!(store.is_hydrated());
        assert_eq!(store.session(), Session::default());
    }

    #[test]
    fn dangling_user_is_dropped_on_load() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save("fleetdesk-admin-auth", r#"{"state":{"token":null,"user":{"email":"x@y.z"}}}"#)
            .unwrap();

        assert_eq!(store_with(storage).user(), None);
    }

    #[test]
    fn unhydrated_store_still_exposes_persisted_token() {
        let storage = Arc::new(MemoryStorage::new());
        store_with(storage.clone()).set_session("persisted", None);

        let fresh = SessionStore::new(SessionProfile::admin(&Config::default()), storage);
        assert!(!fresh.is_hydrated());
        assert_eq!(fresh.token(), None);
        assert_eq!(fresh.persisted_token().as_deref(), Some("persisted"));
    }

    #[test]
    fn profiles_use_distinct_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let config = Config::default();
        let admin = SessionStore::new(SessionProfile::admin(&config), storage.clone());
        let client = SessionStore::new(SessionProfile::client(&config), storage);
        admin.hydrate();
        client.hydrate();

        admin.set_session(live_token(), None);

        assert!(admin.is_authenticated());
        assert!(!client.is_authenticated());
    }

    #[test]
    fn protected_routes_per_portal() {
        let config = Config::default();
        let admin = SessionProfile::admin(&config);
        let client = SessionProfile::client(&config);

        assert!(admin.is_protected("/trips"));
        assert!(admin.is_protected("/"));
        assert!(admin.is_protected("/drivers/12?tab=docs"));
        assert!(!admin.is_protected("/login"));
        assert!(!admin.is_protected("/login/"));
        assert!(!admin.is_protected("/client/invoices"));

        assert!(client.is_protected("/client"));
        assert!(client.is_protected("/client/shipments/"));
        assert!(!client.is_protected("/client/login?next=/client"));
        assert!(!client.is_protected("/trips"));
        assert!(!client.is_protected("/clientele"));
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let store = store();
        let mut changes = store.subscribe();

        store.set_session(live_token(), None);
        changes.changed().await.unwrap();
        assert!(changes.borrow_and_update().session.token.is_some());

        store.clear_session();
        changes.changed().await.unwrap();
        assert!(changes.borrow_and_update().session.token.is_none());
    }
}
