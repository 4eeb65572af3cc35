use serde::{Deserialize, Serialize};

use crate::models::user::UserClaims;

/// The client-held pair of bearer token and derived user identity.
///
/// `user` is only ever `Some` while `token` is `Some`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The bearer token issued by the backend.
    #[serde(default)]
    pub token: Option<String>,
    /// The identity derived from the token and the login response.
    #[serde(default)]
    pub user: Option<UserClaims>,
}

impl Session {
    /// Drops a dangling user record left without a token.
    pub fn normalized(self) -> Self {
        match self.token {
            Some(token) if !token.trim().is_empty() => Session {
                token: Some(token),
                user: self.user,
            },
            _ => Session::default(),
        }
    }
}

/// The envelope written to session storage: `{ "state": { token, user } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    /// The persisted session.
    pub state: Session,
}
