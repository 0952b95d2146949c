//! Backing user-credential store on top of sea-orm.
//!
//! Users, roles, claims, external logins and purpose tokens. Refresh tokens live
//! in [`crate::refresh`].

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::{AppConfig, LockoutConfig, PasswordConfig};

mod purpose_tokens;
mod roles;
pub(crate) mod users;

pub use users::{NewUser, SignInOutcome};

/// Policies the store enforces on writes and password sign-in.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub lockout: LockoutConfig,
    pub password: PasswordConfig,
    pub require_unique_email: bool,
    pub require_confirmed_email: bool,
}

impl StoreOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lockout: config.lockout.clone(),
            password: config.password.clone(),
            require_unique_email: config.user.require_unique_email,
            require_confirmed_email: config.sign_in.require_confirmed_email,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IdentityStore {
    db: Arc<DatabaseConnection>,
    options: StoreOptions,
}

impl IdentityStore {
    pub fn new(db: Arc<DatabaseConnection>, options: StoreOptions) -> Self {
        Self { db, options }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}

/// Lookup key for names, emails and role names.
pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}
