//! Identity and token management core.
//!
//! Issues HS256 access tokens from stored users or resolved external logins,
//! keeps one refresh token per (user, application), issues single-use purpose
//! tokens for account recovery and manages users, roles and claims.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::manager::IdentityManager;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod external;
pub mod manager;
pub mod password;
pub mod purpose;
pub mod refresh;
pub mod store;
pub mod token;

#[derive(Clone)]
pub struct AppResources {
    pub manager: Arc<IdentityManager>,
    pub config: Arc<AppConfig>,
    /// Cancelled on shutdown; outbound provider calls observe it.
    pub shutdown: CancellationToken,
}

impl AppResources {
    pub fn new(manager: IdentityManager) -> Self {
        let config = Arc::new(manager.config().clone());
        Self {
            manager: Arc::new(manager),
            config,
            shutdown: CancellationToken::new(),
        }
    }
}
