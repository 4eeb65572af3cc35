use std::sync::Arc;

use tokio::sync::watch;

use crate::services::session::{SessionState, SessionStore};

/// Where a render pass is happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEnv {
    /// A non-interactive pass, e.g. prerendering. Session state is unknown.
    Prerender,
    /// An interactive pass with a live session store.
    Interactive,
}

/// The guard's view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// The session has not been confirmed yet.
    Checking,
    /// The session is authenticated.
    Authenticated,
    /// The session is signed out or expired.
    Unauthenticated,
}

/// What a render pass of the guarded view produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    /// A neutral placeholder.
    Placeholder,
    /// The protected content.
    Content,
    /// Navigate to the given login route. Emitted once per sign-out.
    Redirect(String),
}

/// Gates a protected view on the session store.
pub struct RouteGuard {
    store: Arc<SessionStore>,
    changes: watch::Receiver<SessionState>,
    state: GuardState,
    redirected: bool,
}

impl RouteGuard {
    /// Mounts a guard in the `Checking` state.
    pub fn mount(store: Arc<SessionStore>) -> Self {
        let changes = store.subscribe();
        Self {
            store,
            changes,
            state: GuardState::Checking,
            redirected: false,
        }
    }

    /// The current state.
    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Runs one render pass.
    ///
    /// Leaves `Checking` only on an interactive pass over a hydrated store.
    pub fn render(&mut self, env: RenderEnv) -> GuardView {
        if self.state == GuardState::Checking
            && (env == RenderEnv::Prerender || !self.store.is_hydrated())
        {
            return GuardView::Placeholder;
        }

        self.changes.borrow_and_update();
        self.settle();
        self.view()
    }

    /// Waits for the next store change and re-evaluates.
    ///
    /// A guard still in `Checking` stays there until the next interactive
    /// render.
    pub async fn changed(&mut self) -> GuardState {
        if self.changes.changed().await.is_err() {
            tracing::debug!("Session store dropped while guard mounted");
            return self.state;
        }
        self.changes.borrow_and_update();
        if self.state != GuardState::Checking {
            self.settle();
        }
        self.state
    }

    fn settle(&mut self) {
        let next = if self.store.is_authenticated() {
            GuardState::Authenticated
        } else {
            GuardState::Unauthenticated
        };

        if next != self.state {
            tracing::debug!("🛡️ Guard {:?} -> {:?}", self.state, next);
        }
        if next == GuardState::Authenticated {
            self.redirected = false;
        }
        self.state = next;
    }

    fn view(&mut self) -> GuardView {
        match self.state {
            GuardState::Checking => GuardView::Placeholder,
            GuardState::Authenticated => GuardView::Content,
            GuardState::Unauthenticated if !self.redirected => {
                self.redirected = true;
                let login_route = self.store.profile().login_route.clone();
                tracing::info!("🔐 Redirecting to {}", login_route);
                GuardView::Redirect(login_route)
            }
            GuardState::Unauthenticated => GuardView::Placeholder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::session::SessionProfile;
    use crate::storage::{MemoryStorage, SessionStorage};
    use base64::{Engine as _, engine::general_purpose};
    use chrono::Utc;

    fn live_token() -> String {
        let exp = Utc::now().timestamp() + 3600;
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","exp":{exp}}}"#));
        format!("e30.{payload}.sig")
    }

    fn store(storage: Arc<MemoryStorage>) -> Arc<SessionStore> {
        Arc::new(SessionStore::new(SessionProfile::client(&Config::default()), storage))
    }

    #[test]
    fn empty_store_redirects_exactly_once() {
        let store = store(Arc::new(MemoryStorage::new()));
        let mut guard = RouteGuard::mount(store.clone());

        assert_eq!(guard.render(RenderEnv::Interactive), GuardView::Placeholder);
        store.hydrate();

        assert_eq!(
            guard.render(RenderEnv::Interactive),
            GuardView::Redirect("/client/login".to_string())
        );
        for _ in 0..3 {
            assert_eq!(guard.render(RenderEnv::Interactive), GuardView::Placeholder);
        }
        assert_eq!(guard.state(), GuardState::Unauthenticated);
    }

    #[test]
    fn persisted_live_token_renders_content() {
        let storage = Arc::new(MemoryStorage::new());
        let envelope = format!(r#"{{"state":{{"token":"{}","user":null}}}}"#, live_token());
        storage.save("fleetdesk-client-auth", &envelope).unwrap();

        let store = store(storage);
        store.hydrate();
        let mut guard = RouteGuard::mount(store);

        assert_eq!(guard.render(RenderEnv::Interactive), GuardView::Content);
        assert_eq!(guard.render(RenderEnv::Interactive), GuardView::Content);
    }

    #[test]
    fn prerender_never_redirects() {
        let store = store(Arc::new(MemoryStorage::new()));
        store.hydrate();
        let mut guard = RouteGuard::mount(store);

        assert_eq!(guard.render(RenderEnv::Prerender), GuardView::Placeholder);
        assert_eq!(guard.state(), GuardState::Checking);
    }

    #[test]
    fn sign_out_issues_one_new_redirect() {
        let store = store(Arc::new(MemoryStorage::new()));
        store.hydrate();
        store.set_session(live_token(), None);
        let mut guard = RouteGuard::mount(store.clone());
        assert_eq!(guard.render(RenderEnv::Interactive), GuardView::Content);

        store.clear_session();
        assert!(matches!(guard.render(RenderEnv::Interactive), GuardView::Redirect(_)));
        assert_eq!(guard.render(RenderEnv::Interactive), GuardView::Placeholder);
    }

    #[tokio::test]
    async fn login_elsewhere_authenticates_mounted_guard() {
        let store = store(Arc::new(MemoryStorage::new()));
        store.hydrate();
        let mut guard = RouteGuard::mount(store.clone());
        assert!(matches!(guard.render(RenderEnv::Interactive), GuardView::Redirect(_)));

        store.set_session(live_token(), None);

        assert_eq!(guard.changed().await, GuardState::Authenticated);
        assert_eq!(guard.render(RenderEnv::Interactive), GuardView::Content);
    }

    #[tokio::test]
    async fn changes_do_not_leave_checking() {
        let store = store(Arc::new(MemoryStorage::new()));
        let mut guard = RouteGuard::mount(store.clone());

        store.hydrate();
        assert_eq!(guard.changed().await, GuardState::Checking);
    }
}
