use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::middleware_layer::guard::RouteGuard;
use crate::services::api::ApiClient;
use crate::services::auth::AuthService;
use crate::services::session::{Portal, SessionProfile, SessionStore};
use crate::storage::{FileStorage, SessionStorage};

/// One portal's session wiring: store, API client and auth service.
#[derive(Clone)]
pub struct PortalContext {
    /// The session store.
    pub store: Arc<SessionStore>,
    /// The API client authorized from `store`.
    pub api: ApiClient,
    /// Login and logout.
    pub auth: AuthService,
}

impl PortalContext {
    /// Builds the wiring for `profile` and hydrates the store.
    pub fn new(
        profile: SessionProfile,
        storage: Arc<dyn SessionStorage>,
        http: reqwest::Client,
        api_url: &str,
    ) -> Result<Self> {
        let store = Arc::new(SessionStore::new(profile, storage));
        store.hydrate();

        let api = ApiClient::with_http(http, api_url, store.clone())?;
        let auth = AuthService::new(api.clone());

        Ok(Self { store, api, auth })
    }

    /// Mounts a route guard over this portal's session.
    pub fn guard(&self) -> RouteGuard {
        RouteGuard::mount(self.store.clone())
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The shared HTTP client.
    pub http: reqwest::Client,
    /// The admin dashboard session.
    pub admin: PortalContext,
    /// The client portal session.
    pub client: PortalContext,
}

impl AppState {
    /// Creates a new `AppState` persisting sessions under the configured
    /// session directory.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config) -> Result<Self> {
        let storage: Arc<dyn SessionStorage> = Arc::new(FileStorage::new(&config.session_dir));
        Self::with_storage(config, storage)
    }

    /// Creates a new `AppState` on top of the given storage backend.
    pub fn with_storage(config: &Config, storage: Arc<dyn SessionStorage>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        tracing::info!("✅ HTTP client initialized for {}", config.api_url);

        let admin = PortalContext::new(
            SessionProfile::admin(config),
            storage.clone(),
            http.clone(),
            &config.api_url,
        )?;
        tracing::info!("✅ Admin session ready (signed in: {})", admin.store.is_authenticated());

        let client = PortalContext::new(
            SessionProfile::client(config),
            storage,
            http.clone(),
            &config.api_url,
        )?;
        tracing::info!("✅ Client session ready (signed in: {})", client.store.is_authenticated());

        Ok(AppState {
            config: config.clone(),
            http,
            admin,
            client,
        })
    }

    /// The wiring of the given portal.
    pub fn portal(&self, portal: Portal) -> &PortalContext {
        match portal {
            Portal::Admin => &self.admin,
            Portal::Client => &self.client,
        }
    }
}
