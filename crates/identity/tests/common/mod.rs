//! Shared setup for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use config::{Config, File, FileFormat};
use identity_core::config::AppConfig;
use identity_core::external::ExternalProviders;
use identity_core::manager::{IdentityManager, LogIn, SignUp};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

pub const PASSWORD: &str = "Passw0rd!";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "Adm1n#Secret";

const BASE_CONFIG: &str = r#"
jwt:
  secret_key: "integration-test-secret-key-0123456789abcdef"
  issuer: "https://identity.test"
user:
  admin_email: "admin@example.com"
  admin_password: "Adm1n#Secret"
"#;

/// Base test configuration with a YAML fragment layered on top.
pub fn test_config(overrides: &str) -> AppConfig {
    let mut builder =
        Config::builder().add_source(File::from_str(BASE_CONFIG, FileFormat::Yaml));
    if !overrides.trim().is_empty() {
        builder = builder.add_source(File::from_str(overrides, FileFormat::Yaml));
    }
    let config: AppConfig = builder
        .build()
        .expect("build config")
        .try_deserialize()
        .expect("deserialize config");
    config.validate().expect("valid config");
    config
}

/// In-memory SQLite with the identity schema applied.
pub async fn test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    Migrator::up(&db, None).await.expect("Failed to run migrations");
    Arc::new(db)
}

pub async fn test_manager(overrides: &str) -> IdentityManager {
    IdentityManager::new(Arc::new(test_config(overrides)), Some(test_db().await))
}

/// Manager whose external providers use the given configuration (usually
/// pointing at a mock server).
pub async fn test_manager_with_providers(overrides: &str) -> IdentityManager {
    let config = Arc::new(test_config(overrides));
    let providers = ExternalProviders::new(config.external_logins.clone());
    IdentityManager::with_providers(config, Some(test_db().await), providers)
}

pub fn sign_up(username: &str, email: &str) -> SignUp {
    SignUp {
        username: username.to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        phone_number: None,
        roles: Vec::new(),
        claims: BTreeMap::new(),
    }
}

pub fn log_in(username: &str, password: &str) -> LogIn {
    LogIn {
        username: username.to_string(),
        password: password.to_string(),
        app_id: "Default".to_string(),
        is_refreshable: false,
        transient_roles: Vec::new(),
        transient_claims: BTreeMap::new(),
    }
}
