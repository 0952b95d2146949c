//! Single-use tokens scoped to one account action.
//!
//! Lookups that start from public forms (email, phone) report a field error
//! rather than a not-found, so the caller sees a validation failure.

use sea_orm::DbErr;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::entity::identity_user;
use crate::error::{FieldError, IdentityError};
use crate::store::IdentityStore;
use crate::store::normalize;
use crate::store::users::{is_valid_email, is_valid_phone_number};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenPurpose {
    ResetPassword,
    ConfirmEmail,
    ConfirmPhone,
    ChangeEmail,
    ChangePhone,
    Custom(String),
}

impl TokenPurpose {
    pub fn name(&self) -> String {
        match self {
            TokenPurpose::ResetPassword => "ResetPassword".into(),
            TokenPurpose::ConfirmEmail => "ConfirmEmail".into(),
            TokenPurpose::ConfirmPhone => "ConfirmPhoneNumber".into(),
            TokenPurpose::ChangeEmail => "ChangeEmail".into(),
            TokenPurpose::ChangePhone => "ChangePhoneNumber".into(),
            TokenPurpose::Custom(purpose) => format!("Custom:{purpose}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct PurposeToken {
    pub purpose: String,
    pub token: String,
    /// Email, phone number or user id the token was requested for.
    pub subject: String,
    pub new_value: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
}

/// Value a token is bound to, in the form it is stored and compared.
pub(crate) fn binding_for(purpose: &TokenPurpose, value: &str) -> String {
    match purpose {
        TokenPurpose::ChangeEmail => normalize(value),
        TokenPurpose::ChangePhone => value.trim().to_string(),
        _ => value.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct PurposeTokenGenerator {
    store: IdentityStore,
    lifetime: time::Duration,
}

impl PurposeTokenGenerator {
    pub fn new(store: IdentityStore, purpose_token_lifetime_hours: u32) -> Self {
        Self {
            store,
            lifetime: time::Duration::hours(i64::from(purpose_token_lifetime_hours)),
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<identity_user::Model, IdentityError> {
        self.store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| FieldError::invalid_email(email).into())
    }

    async fn user_by_phone(&self, phone: &str) -> Result<identity_user::Model, IdentityError> {
        self.store
            .find_user_by_phone(phone)
            .await?
            .ok_or_else(|| FieldError::invalid_phone_number(phone).into())
    }

    async fn issue(
        &self,
        user: &identity_user::Model,
        purpose: TokenPurpose,
        subject: &str,
        new_value: Option<&str>,
    ) -> Result<PurposeToken, IdentityError> {
        let name = purpose.name();
        let binding = new_value.map(|v| binding_for(&purpose, v));
        let (token, expire_at) = self
            .store
            .issue_purpose_token(&user.id, &name, binding.as_deref(), self.lifetime)
            .await?;
        tracing::info!(user_id = %user.id, purpose = %name, "Issued purpose token");
        Ok(PurposeToken {
            purpose: name,
            token,
            subject: subject.to_string(),
            new_value: new_value.map(str::to_string),
            expire_at,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn generate_reset_password_token(
        &self,
        email: &str,
    ) -> Result<PurposeToken, IdentityError> {
        let user = self.user_by_email(email).await?;
        self.issue(&user, TokenPurpose::ResetPassword, email, None)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn generate_confirm_email_token(
        &self,
        email: &str,
    ) -> Result<PurposeToken, IdentityError> {
        let user = self.user_by_email(email).await?;
        self.issue(&user, TokenPurpose::ConfirmEmail, email, None)
            .await
    }

    /// Token for moving an account from `email` to `new_email`.
    #[tracing::instrument(skip(self))]
    pub async fn generate_change_email_token(
        &self,
        email: &str,
        new_email: &str,
    ) -> Result<PurposeToken, IdentityError> {
        let user = self.user_by_email(email).await?;
        if !is_valid_email(new_email) {
            return Err(FieldError::invalid_email(new_email).into());
        }
        if let Some(owner) = self.store.find_user_by_email(new_email).await?
            && owner.id != user.id
        {
            return Err(FieldError::duplicate_email(new_email).into());
        }
        self.issue(&user, TokenPurpose::ChangeEmail, email, Some(new_email))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn generate_confirm_phone_token(
        &self,
        phone_number: &str,
    ) -> Result<PurposeToken, IdentityError> {
        let user = self.user_by_phone(phone_number).await?;
        self.issue(&user, TokenPurpose::ConfirmPhone, phone_number, None)
            .await
    }

    /// Token for moving an account from `phone_number` to `new_phone_number`.
    /// The new number must not belong to another account.
    #[tracing::instrument(skip(self))]
    pub async fn generate_change_phone_token(
        &self,
        phone_number: &str,
        new_phone_number: &str,
    ) -> Result<PurposeToken, IdentityError> {
        let user = self.user_by_phone(phone_number).await?;
        if !is_valid_phone_number(new_phone_number) {
            return Err(FieldError::invalid_phone_number(new_phone_number).into());
        }
        if let Some(owner) = self.store.find_user_by_phone(new_phone_number).await?
            && owner.id != user.id
        {
            return Err(FieldError::duplicate_phone_number(new_phone_number).into());
        }
        self.issue(
            &user,
            TokenPurpose::ChangePhone,
            phone_number,
            Some(new_phone_number),
        )
        .await
    }

    /// Token for an application-defined purpose, optionally bound to a payload.
    #[tracing::instrument(skip(self, payload))]
    pub async fn generate_custom_token(
        &self,
        user_id: &str,
        purpose: &str,
        payload: Option<&str>,
    ) -> Result<PurposeToken, IdentityError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| IdentityError::not_found(format!("user {user_id}")))?;
        self.issue(
            &user,
            TokenPurpose::Custom(purpose.to_string()),
            user_id,
            payload,
        )
        .await
    }

    /// Check and consume a token issued for `purpose`.
    #[tracing::instrument(skip(self, token, new_value))]
    pub async fn verify(
        &self,
        user_id: &str,
        purpose: &TokenPurpose,
        token: &str,
        new_value: Option<&str>,
    ) -> Result<bool, DbErr> {
        let binding = new_value.map(|v| binding_for(purpose, v));
        self.store
            .consume_purpose_token(user_id, &purpose.name(), token, binding.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purposes_have_distinct_names() {
        let names = [
            TokenPurpose::ResetPassword,
            TokenPurpose::ConfirmEmail,
            TokenPurpose::ConfirmPhone,
            TokenPurpose::ChangeEmail,
            TokenPurpose::ChangePhone,
            TokenPurpose::Custom("ResetPassword".into()),
        ]
        .map(|p| p.name());
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn email_bindings_ignore_case() {
        assert_eq!(
            binding_for(&TokenPurpose::ChangeEmail, "New@Example.org"),
            binding_for(&TokenPurpose::ChangeEmail, "new@example.org")
        );
    }
}
