//! Orchestrates sign-up, sign-in, refresh and account maintenance over the
//! store, the token codec, the refresh token store and the external providers.
//!
//! Without a database the manager only serves the transient administrator and
//! transient external sign-ins; every store-backed operation then fails with
//! [`IdentityError::StoreNotConfigured`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::entity::identity_user;
use crate::error::{FieldError, IdentityError, ValidationErrors};
use crate::external::{ExternalLoginTokenData, ExternalProviders, ProviderError};
use crate::purpose::PurposeTokenGenerator;
use crate::refresh::RefreshTokenStore;
use crate::store::{IdentityStore, StoreOptions};
use crate::token::{AccessToken, AccessTokenData, Claim, TokenCodec, claim_types};

mod account;
mod authorization;
pub mod models;
mod sign_in;
mod sign_up;

pub use models::*;

#[derive(Clone, Debug)]
struct Backend {
    store: IdentityStore,
    refresh_tokens: RefreshTokenStore,
    purpose_tokens: PurposeTokenGenerator,
}

#[derive(Clone)]
pub struct IdentityManager {
    config: Arc<AppConfig>,
    codec: TokenCodec,
    providers: ExternalProviders,
    backend: Option<Backend>,
}

impl IdentityManager {
    pub fn new(config: Arc<AppConfig>, db: Option<Arc<DatabaseConnection>>) -> Self {
        let providers = ExternalProviders::new(config.external_logins.clone());
        Self::with_providers(config, db, providers)
    }

    pub fn with_providers(
        config: Arc<AppConfig>,
        db: Option<Arc<DatabaseConnection>>,
        providers: ExternalProviders,
    ) -> Self {
        let backend = db.map(|db| {
            let store = IdentityStore::new(db.clone(), StoreOptions::from_config(&config));
            Backend {
                refresh_tokens: RefreshTokenStore::new(db, config.jwt.refresh_expiration_hours),
                purpose_tokens: PurposeTokenGenerator::new(
                    store.clone(),
                    config.tokens.purpose_token_lifetime_hours,
                ),
                store,
            }
        });
        Self {
            codec: TokenCodec::new(&config.jwt),
            config,
            providers,
            backend,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn providers(&self) -> &ExternalProviders {
        &self.providers
    }

    pub fn has_store(&self) -> bool {
        self.backend.is_some()
    }

    /// Round-trip to the database. Succeeds trivially without a store.
    pub async fn ping_store(&self) -> Result<(), sea_orm::DbErr> {
        match &self.backend {
            Some(backend) => backend.store.db().ping().await,
            None => Ok(()),
        }
    }

    fn backend(&self) -> Result<&Backend, IdentityError> {
        self.backend.as_ref().ok_or(IdentityError::StoreNotConfigured)
    }

    fn store(&self) -> Result<&IdentityStore, IdentityError> {
        Ok(&self.backend()?.store)
    }

    /// Purpose token generation for account recovery flows.
    pub fn purpose_tokens(&self) -> Result<&PurposeTokenGenerator, IdentityError> {
        Ok(&self.backend()?.purpose_tokens)
    }

    async fn user_by_id(&self, user_id: &str) -> Result<identity_user::Model, IdentityError> {
        self.store()?
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| IdentityError::not_found(format!("user {user_id}")))
    }

    /// Sign token data without touching the store.
    fn sign(&self, data: &AccessTokenData) -> Result<AccessToken, IdentityError> {
        let (token, expire_at) = self.codec.encode(data).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign access token");
            IdentityError::Internal(e.to_string())
        })?;
        Ok(AccessToken {
            app_id: data.app_id.clone(),
            user_id: data.user_id.clone(),
            token,
            expire_at,
            refresh_token: None,
        })
    }

    /// Mint an access token for a stored user.
    ///
    /// Roles and claims are read from the store at this point; transient ones are
    /// layered on top for this token only.
    async fn mint(
        &self,
        user: &identity_user::Model,
        app_id: &str,
        is_refreshable: bool,
        external: Option<&ExternalLoginTokenData>,
        transient_roles: &[String],
        transient_claims: &BTreeMap<String, String>,
    ) -> Result<AccessToken, IdentityError> {
        let backend = self.backend()?;

        let mut claims: BTreeSet<Claim> = backend
            .store
            .get_user_claims(&user.id)
            .await?
            .into_iter()
            .collect();
        claims.extend(
            backend
                .store
                .get_user_roles(&user.id)
                .await?
                .into_iter()
                .map(Claim::role),
        );
        claims.extend(transient_grants(transient_roles, transient_claims)?);

        let data = AccessTokenData {
            app_id: app_id.to_string(),
            user_id: user.id.clone(),
            user_name: user.user_name.clone(),
            email: user.email.clone().unwrap_or_default(),
            external_provider_name: external.map(|e| e.name.clone()),
            external_provider_token: external.map(|e| e.token.clone()),
            external_provider_refresh_token: external.and_then(|e| e.refresh_token.clone()),
            claims,
        };

        let mut token = self.sign(&data)?;
        if is_refreshable {
            let refresh = backend
                .refresh_tokens
                .issue(&user.id, app_id)
                .await
                .map_err(|e| match e {
                    crate::refresh::RefreshTokenError::Database(db) => IdentityError::Database(db),
                    other => IdentityError::Internal(other.to_string()),
                })?;
            token.refresh_token = Some(refresh);
        }
        Ok(token)
    }
}

/// Reject free-form claim types that collide with roles or codec claims.
fn check_claim_types<'a>(types: impl IntoIterator<Item = &'a str>) -> Result<(), IdentityError> {
    let mut errors = ValidationErrors::new();
    for claim_type in types {
        if !claim_types::is_free_form(claim_type) {
            errors.push(FieldError::invalid_claim_type(claim_type));
        }
    }
    errors.into_result()
}

fn transient_grants(
    roles: &[String],
    claims: &BTreeMap<String, String>,
) -> Result<Vec<Claim>, IdentityError> {
    check_claim_types(claims.keys().map(String::as_str))?;
    Ok(roles
        .iter()
        .map(|role| Claim::role(role.clone()))
        .chain(claims.iter().map(|(t, v)| Claim::new(t.clone(), v.clone())))
        .collect())
}

/// Collapse a provider failure for the caller. Detail stays in the log.
fn provider_failure(error: ProviderError) -> IdentityError {
    match error {
        ProviderError::NotSupported(what) => IdentityError::NotSupported(what),
        ProviderError::Cancelled => IdentityError::Cancelled,
        other => {
            tracing::error!(error = %other, "External provider login failed");
            IdentityError::Unauthorized
        }
    }
}
