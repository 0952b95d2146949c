use super::{
    ChangeEmail, ChangePassword, ChangePhoneNumber, ConfirmEmail, ConfirmPhoneNumber,
    IdentityManager, RemoveExternalLogin, ResetPassword, SetPassword, SetUsername,
};
use crate::entity::identity_user;
use crate::error::{FieldError, IdentityError};
use crate::purpose::{PurposeToken, TokenPurpose};

impl IdentityManager {
    #[tracing::instrument(skip(self))]
    pub async fn get_user(&self, user_id: &str) -> Result<identity_user::Model, IdentityError> {
        self.user_by_id(user_id).await
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn remove_external_login(
        &self,
        request: &RemoveExternalLogin,
    ) -> Result<(), IdentityError> {
        let user = self.user_by_id(&request.user_id).await?;
        self.store()?
            .remove_login(&user.id, &request.provider, &request.provider_key)
            .await
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn set_username(&self, request: &SetUsername) -> Result<(), IdentityError> {
        let user = self.user_by_id(&request.user_id).await?;
        self.store()?
            .set_user_name(&user, &request.new_username)
            .await?;
        Ok(())
    }

    /// Give a password to an account created without one.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn set_password(&self, request: &SetPassword) -> Result<(), IdentityError> {
        let user = self.user_by_id(&request.user_id).await?;
        self.store()?
            .add_password(&user, &request.new_password)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn reset_password(&self, request: &ResetPassword) -> Result<(), IdentityError> {
        let store = self.store()?;
        let user = store
            .find_user_by_email(&request.email)
            .await?
            .ok_or_else(|| IdentityError::from(FieldError::invalid_email(&request.email)))?;

        let password_errors =
            crate::password::validate_password(&store.options().password, &request.password);
        password_errors.into_result()?;

        let valid = self
            .purpose_tokens()?
            .verify(&user.id, &TokenPurpose::ResetPassword, &request.token, None)
            .await?;
        if !valid {
            return Err(FieldError::invalid_token().into());
        }
        store.reset_password(&user, &request.password).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn change_password(&self, request: &ChangePassword) -> Result<(), IdentityError> {
        let user = self.user_by_id(&request.user_id).await?;
        self.store()?
            .change_password(&user, &request.old_password, &request.new_password)
            .await?;
        Ok(())
    }

    /// Move the account to a new email with a change-email token. The new
    /// address is confirmed by the token.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn change_email(&self, request: &ChangeEmail) -> Result<(), IdentityError> {
        let store = self.store()?;
        let user = self.user_by_id(&request.user_id).await?;

        if let Some(owner) = store.find_user_by_email(&request.new_email).await?
            && owner.id != user.id
        {
            return Err(FieldError::duplicate_email(&request.new_email).into());
        }

        let valid = self
            .purpose_tokens()?
            .verify(
                &user.id,
                &TokenPurpose::ChangeEmail,
                &request.token,
                Some(&request.new_email),
            )
            .await?;
        if !valid {
            return Err(FieldError::invalid_token().into());
        }
        store.set_email(&user, &request.new_email, true).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn confirm_email(&self, request: &ConfirmEmail) -> Result<(), IdentityError> {
        let store = self.store()?;
        let user = store
            .find_user_by_email(&request.email)
            .await?
            .ok_or_else(|| IdentityError::from(FieldError::invalid_email(&request.email)))?;

        let valid = self
            .purpose_tokens()?
            .verify(&user.id, &TokenPurpose::ConfirmEmail, &request.token, None)
            .await?;
        if !valid {
            return Err(FieldError::invalid_token().into());
        }
        store.set_email_confirmed(&user).await?;
        Ok(())
    }

    /// Move the account to a new phone number. The new number starts out
    /// unconfirmed.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn change_phone_number(
        &self,
        request: &ChangePhoneNumber,
    ) -> Result<(), IdentityError> {
        let store = self.store()?;
        let user = self.user_by_id(&request.user_id).await?;

        if let Some(owner) = store.find_user_by_phone(&request.new_phone_number).await?
            && owner.id != user.id
        {
            return Err(FieldError::duplicate_phone_number(&request.new_phone_number).into());
        }

        let valid = self
            .purpose_tokens()?
            .verify(
                &user.id,
                &TokenPurpose::ChangePhone,
                &request.token,
                Some(&request.new_phone_number),
            )
            .await?;
        if !valid {
            return Err(FieldError::invalid_token().into());
        }
        store
            .set_phone_number(&user, &request.new_phone_number, false)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(phone_number = %request.phone_number))]
    pub async fn confirm_phone_number(
        &self,
        request: &ConfirmPhoneNumber,
    ) -> Result<(), IdentityError> {
        let store = self.store()?;
        let user = store
            .find_user_by_phone(&request.phone_number)
            .await?
            .ok_or_else(|| {
                IdentityError::from(FieldError::invalid_phone_number(&request.phone_number))
            })?;

        let valid = self
            .purpose_tokens()?
            .verify(&user.id, &TokenPurpose::ConfirmPhone, &request.token, None)
            .await?;
        if !valid {
            return Err(FieldError::invalid_token().into());
        }
        store.set_phone_number_confirmed(&user).await?;
        Ok(())
    }

    /// Soft deactivation. Sign-in then reports `LockedOut`.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_user(&self, user_id: &str) -> Result<(), IdentityError> {
        let user = self.user_by_id(user_id).await?;
        self.store()?.set_active(&user, false).await?;
        self.backend()?
            .refresh_tokens
            .revoke_all(&user.id)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError> {
        self.store()?.delete_user(user_id).await
    }

    pub async fn generate_reset_password_token(
        &self,
        email: &str,
    ) -> Result<PurposeToken, IdentityError> {
        self.purpose_tokens()?
            .generate_reset_password_token(email)
            .await
    }

    pub async fn generate_confirm_email_token(
        &self,
        email: &str,
    ) -> Result<PurposeToken, IdentityError> {
        self.purpose_tokens()?
            .generate_confirm_email_token(email)
            .await
    }

    pub async fn generate_change_email_token(
        &self,
        email: &str,
        new_email: &str,
    ) -> Result<PurposeToken, IdentityError> {
        self.purpose_tokens()?
            .generate_change_email_token(email, new_email)
            .await
    }

    pub async fn generate_confirm_phone_number_token(
        &self,
        phone_number: &str,
    ) -> Result<PurposeToken, IdentityError> {
        self.purpose_tokens()?
            .generate_confirm_phone_token(phone_number)
            .await
    }

    pub async fn generate_change_phone_number_token(
        &self,
        phone_number: &str,
        new_phone_number: &str,
    ) -> Result<PurposeToken, IdentityError> {
        self.purpose_tokens()?
            .generate_change_phone_token(phone_number, new_phone_number)
            .await
    }

    pub async fn generate_custom_purpose_token(
        &self,
        user_id: &str,
        purpose: &str,
        payload: Option<&str>,
    ) -> Result<PurposeToken, IdentityError> {
        self.purpose_tokens()?
            .generate_custom_token(user_id, purpose, payload)
            .await
    }

    /// Check and consume a custom purpose token.
    #[tracing::instrument(skip(self, token, payload))]
    pub async fn verify_custom_purpose_token(
        &self,
        user_id: &str,
        purpose: &str,
        token: &str,
        payload: Option<&str>,
    ) -> Result<bool, IdentityError> {
        Ok(self
            .purpose_tokens()?
            .verify(
                user_id,
                &TokenPurpose::Custom(purpose.to_string()),
                token,
                payload,
            )
            .await?)
    }
}
