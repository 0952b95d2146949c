use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter,
    TransactionTrait,
};
use time::OffsetDateTime;

use super::IdentityStore;
use crate::entity::identity_purpose_token;
use crate::error::IdentityError;
use crate::password::{generate_random_token, hash_token};

impl IdentityStore {
    /// Issue a token for `(user, purpose)`, replacing any earlier one.
    ///
    /// Returns the plain token; only its digest is stored.
    #[tracing::instrument(skip(self, payload))]
    pub async fn issue_purpose_token(
        &self,
        user_id: &str,
        purpose: &str,
        payload: Option<&str>,
        lifetime: time::Duration,
    ) -> Result<(String, OffsetDateTime), IdentityError> {
        let token = generate_random_token()?;
        let now = OffsetDateTime::now_utc();
        let expires_at = now
            .checked_add(lifetime)
            .ok_or_else(|| IdentityError::Internal("purpose token expiry out of range".into()))?;

        let txn = self.db().begin().await?;
        identity_purpose_token::Entity::delete_many()
            .filter(identity_purpose_token::Column::UserId.eq(user_id))
            .filter(identity_purpose_token::Column::Purpose.eq(purpose))
            .exec(&txn)
            .await?;
        identity_purpose_token::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            purpose: Set(purpose.to_string()),
            token_hash: Set(hash_token(&token)),
            payload: Set(payload.map(str::to_string)),
            expires_at: Set(expires_at),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        Ok((token, expires_at))
    }

    /// Check and consume a token. Returns `false` for unknown, expired or
    /// differently bound tokens; a successful check deletes the row.
    #[tracing::instrument(skip(self, token, payload))]
    pub async fn consume_purpose_token(
        &self,
        user_id: &str,
        purpose: &str,
        token: &str,
        payload: Option<&str>,
    ) -> Result<bool, DbErr> {
        let Some(row) = identity_purpose_token::Entity::find()
            .filter(identity_purpose_token::Column::UserId.eq(user_id))
            .filter(identity_purpose_token::Column::Purpose.eq(purpose))
            .filter(identity_purpose_token::Column::TokenHash.eq(hash_token(token)))
            .one(self.db())
            .await?
        else {
            return Ok(false);
        };

        if row.is_expired() {
            identity_purpose_token::Entity::delete_by_id(row.id)
                .exec(self.db())
                .await?;
            return Ok(false);
        }
        if row.payload.as_deref() != payload {
            return Ok(false);
        }

        let deleted = identity_purpose_token::Entity::delete_by_id(row.id)
            .exec(self.db())
            .await?;
        Ok(deleted.rows_affected == 1)
    }
}
