//! Session and API client layer for the fleet operations dashboard and the
//! client portal.

pub mod config;
pub mod error;
pub mod maps;
pub mod state;
pub mod storage;

pub mod crypto {
    pub mod token;
}

pub mod models {
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod api;
    pub mod auth;
    pub mod session;
}

pub mod middleware_layer {
    pub mod guard;
}

pub mod validation {
    pub mod auth;
}

pub use config::Config;
pub use error::{AppError, Result};
pub use state::{AppState, PortalContext};
