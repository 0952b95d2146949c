//! Refresh tokens: one live row per (user, application).
//!
//! Rows live in `identity_user_token` under the `Bearer` login provider with the
//! application id as the token name. Only the digest of the token is stored.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, TransactionTrait,
};
use thiserror::Error;
use time::OffsetDateTime;

use crate::entity::identity_user_token;
use crate::password::{generate_random_token, hash_token};
use crate::token::{REFRESH_TOKEN_PROVIDER, RefreshToken};

#[derive(Debug, Error)]
pub enum RefreshTokenError {
    #[error("no refresh token stored")]
    NotFound,
    #[error("refresh token does not match")]
    Mismatch,
    #[error("refresh token expired")]
    Expired,
    #[error("failed to generate refresh token: {0}")]
    Generation(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Clone, Debug)]
pub struct RefreshTokenStore {
    db: Arc<DatabaseConnection>,
    lifetime: time::Duration,
}

impl RefreshTokenStore {
    pub fn new(db: Arc<DatabaseConnection>, refresh_expiration_hours: u32) -> Self {
        Self {
            db,
            lifetime: time::Duration::hours(i64::from(refresh_expiration_hours)),
        }
    }

    async fn find(
        &self,
        user_id: &str,
        app_id: &str,
    ) -> Result<Option<identity_user_token::Model>, DbErr> {
        identity_user_token::Entity::find_by_id((
            user_id.to_string(),
            REFRESH_TOKEN_PROVIDER.to_string(),
            app_id.to_string(),
        ))
        .one(self.db.as_ref())
        .await
    }

    /// Issue a new refresh token, removing the previous one for the same key.
    ///
    /// Delete and insert share one transaction; a failed insert leaves no token.
    #[tracing::instrument(skip(self))]
    pub async fn issue(&self, user_id: &str, app_id: &str) -> Result<RefreshToken, RefreshTokenError> {
        let token = generate_random_token().map_err(|e| RefreshTokenError::Generation(e.to_string()))?;
        let expire_at = OffsetDateTime::now_utc()
            .checked_add(self.lifetime)
            .ok_or_else(|| RefreshTokenError::Generation("expiry out of range".into()))?;

        let txn = self.db.begin().await?;
        identity_user_token::Entity::delete_many()
            .filter(identity_user_token::Column::UserId.eq(user_id))
            .filter(identity_user_token::Column::LoginProvider.eq(REFRESH_TOKEN_PROVIDER))
            .filter(identity_user_token::Column::Name.eq(app_id))
            .exec(&txn)
            .await?;
        identity_user_token::ActiveModel {
            user_id: Set(user_id.to_string()),
            login_provider: Set(REFRESH_TOKEN_PROVIDER.to_string()),
            name: Set(app_id.to_string()),
            value: Set(hash_token(&token)),
            expire_at: Set(expire_at),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        tracing::debug!(user_id, app_id, "Issued refresh token");
        Ok(RefreshToken {
            app_id: app_id.to_string(),
            user_id: user_id.to_string(),
            token,
            expire_at,
        })
    }

    /// Check a presented token. Never modifies the stored row.
    #[tracing::instrument(skip(self, presented))]
    pub async fn validate(
        &self,
        user_id: &str,
        app_id: &str,
        presented: &str,
    ) -> Result<(), RefreshTokenError> {
        let stored = self
            .find(user_id, app_id)
            .await?
            .ok_or(RefreshTokenError::NotFound)?;
        if stored.value != hash_token(presented) {
            return Err(RefreshTokenError::Mismatch);
        }
        if stored.is_expired() {
            return Err(RefreshTokenError::Expired);
        }
        Ok(())
    }

    /// Remove the token for this key. Returns whether one existed.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, user_id: &str, app_id: &str) -> Result<bool, DbErr> {
        let result = identity_user_token::Entity::delete_many()
            .filter(identity_user_token::Column::UserId.eq(user_id))
            .filter(identity_user_token::Column::LoginProvider.eq(REFRESH_TOKEN_PROVIDER))
            .filter(identity_user_token::Column::Name.eq(app_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Remove the refresh tokens of a user for every application.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: &str) -> Result<u64, DbErr> {
        let result = identity_user_token::Entity::delete_many()
            .filter(identity_user_token::Column::UserId.eq(user_id))
            .filter(identity_user_token::Column::LoginProvider.eq(REFRESH_TOKEN_PROVIDER))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
