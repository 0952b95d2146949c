use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use time::OffsetDateTime;

use super::{IdentityStore, normalize};
use crate::entity::{
    identity_purpose_token, identity_user, identity_user_claim, identity_user_login,
    identity_user_role, identity_user_token,
};
use crate::error::{FieldError, IdentityError, ValidationErrors};
use crate::password::{hash_password, validate_password, verify_password};
use crate::token::Claim;

const ALLOWED_USER_NAME_SYMBOLS: &str = "-._@+";

/// Result of a password sign-in attempt as seen by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignInOutcome {
    Succeeded,
    LockedOut,
    /// Deactivated account, or unconfirmed email when confirmation is required.
    NotAllowed,
    RequiresTwoFactor,
    Failed,
    /// The store cannot judge the attempt, e.g. the account has no local password.
    Unrecognized,
}

#[derive(Clone, Debug, Default)]
pub struct NewUser {
    pub user_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub email_confirmed: bool,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub(crate) fn is_valid_phone_number(phone: &str) -> bool {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let rest = phone.strip_prefix('+').unwrap_or(phone);
    digits >= 4
        && rest
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'))
}

impl IdentityStore {
    #[tracing::instrument(skip(self))]
    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<identity_user::Model>, DbErr> {
        identity_user::Entity::find_by_id(id.to_string())
            .one(self.db())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_user_by_name(
        &self,
        user_name: &str,
    ) -> Result<Option<identity_user::Model>, DbErr> {
        identity_user::Entity::find()
            .filter(identity_user::Column::NormalizedUserName.eq(normalize(user_name)))
            .one(self.db())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<identity_user::Model>, DbErr> {
        identity_user::Entity::find()
            .filter(identity_user::Column::NormalizedEmail.eq(normalize(email)))
            .order_by_asc(identity_user::Column::CreatedAt)
            .one(self.db())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_user_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<identity_user::Model>, DbErr> {
        identity_user::Entity::find()
            .filter(identity_user::Column::PhoneNumber.eq(phone_number.trim()))
            .order_by_asc(identity_user::Column::CreatedAt)
            .one(self.db())
            .await
    }

    #[tracing::instrument(skip(self, provider_key))]
    pub async fn find_user_by_login(
        &self,
        login_provider: &str,
        provider_key: &str,
    ) -> Result<Option<identity_user::Model>, DbErr> {
        let Some(login) = identity_user_login::Entity::find_by_id((
            login_provider.to_string(),
            provider_key.to_string(),
        ))
        .one(self.db())
        .await?
        else {
            return Ok(None);
        };
        self.find_user_by_id(&login.user_id).await
    }

    async fn check_user_name(
        &self,
        user_name: &str,
        owner: Option<&str>,
        errors: &mut ValidationErrors,
    ) -> Result<(), DbErr> {
        let well_formed = !user_name.trim().is_empty()
            && user_name
                .chars()
                .all(|c| c.is_alphanumeric() || ALLOWED_USER_NAME_SYMBOLS.contains(c));
        if !well_formed {
            errors.push(FieldError::invalid_user_name(user_name));
            return Ok(());
        }
        if let Some(existing) = self.find_user_by_name(user_name).await?
            && Some(existing.id.as_str()) != owner
        {
            errors.push(FieldError::duplicate_user_name(user_name));
        }
        Ok(())
    }

    async fn check_email(
        &self,
        email: Option<&str>,
        owner: Option<&str>,
        errors: &mut ValidationErrors,
    ) -> Result<(), DbErr> {
        let Some(email) = email else {
            if self.options().require_unique_email {
                errors.push(FieldError::invalid_email(""));
            }
            return Ok(());
        };
        if !is_valid_email(email) {
            errors.push(FieldError::invalid_email(email));
            return Ok(());
        }
        if self.options().require_unique_email
            && let Some(existing) = self.find_user_by_email(email).await?
            && Some(existing.id.as_str()) != owner
        {
            errors.push(FieldError::duplicate_email(email));
        }
        Ok(())
    }

    /// Create a local account. Every validation failure is reported together.
    #[tracing::instrument(skip(self, new_user), fields(user_name = %new_user.user_name))]
    pub async fn create_user(&self, new_user: NewUser) -> Result<identity_user::Model, IdentityError> {
        let mut errors = ValidationErrors::new();
        self.check_user_name(&new_user.user_name, None, &mut errors)
            .await?;
        self.check_email(new_user.email.as_deref(), None, &mut errors)
            .await?;
        if let Some(phone) = new_user.phone_number.as_deref()
            && !is_valid_phone_number(phone)
        {
            errors.push(FieldError::invalid_phone_number(phone));
        }
        if let Some(password) = new_user.password.as_deref() {
            errors.0
                .extend(validate_password(&self.options().password, password).0);
        }
        errors.into_result()?;

        let password_hash = new_user
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?;

        let user = identity_user::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            user_name: Set(new_user.user_name.clone()),
            normalized_user_name: Set(normalize(&new_user.user_name)),
            normalized_email: Set(new_user.email.as_deref().map(normalize)),
            email: Set(new_user.email),
            email_confirmed: Set(new_user.email_confirmed),
            password_hash: Set(password_hash),
            phone_number: Set(new_user.phone_number),
            phone_number_confirmed: Set(false),
            two_factor_enabled: Set(false),
            lockout_enabled: Set(self.options().lockout.allowed_for_new_users),
            lockout_end: Set(None),
            access_failed_count: Set(0),
            is_active: Set(true),
            created_at: Set(OffsetDateTime::now_utc()),
        };

        let user = user.insert(self.db()).await?;
        tracing::info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    /// Verify a password with lockout accounting.
    #[tracing::instrument(skip(self, user, password), fields(user_id = %user.id))]
    pub async fn password_sign_in(
        &self,
        user: &identity_user::Model,
        password: &str,
        lockout_on_failure: bool,
    ) -> Result<SignInOutcome, DbErr> {
        if !user.is_active || (self.options().require_confirmed_email && !user.email_confirmed) {
            return Ok(SignInOutcome::NotAllowed);
        }
        if user.is_locked_out() {
            return Ok(SignInOutcome::LockedOut);
        }
        let Some(hash) = user.password_hash.as_deref() else {
            return Ok(SignInOutcome::Unrecognized);
        };

        if verify_password(password, hash) {
            if user.access_failed_count != 0 || user.lockout_end.is_some() {
                let mut active: identity_user::ActiveModel = user.clone().into();
                active.access_failed_count = Set(0);
                active.lockout_end = Set(None);
                active.update(self.db()).await?;
            }
            return Ok(if user.two_factor_enabled {
                SignInOutcome::RequiresTwoFactor
            } else {
                SignInOutcome::Succeeded
            });
        }

        if !(lockout_on_failure && user.lockout_enabled) {
            return Ok(SignInOutcome::Failed);
        }

        let lockout = &self.options().lockout;
        let failed = user.access_failed_count + 1;
        let mut active: identity_user::ActiveModel = user.clone().into();
        if failed >= lockout.max_failed_access_attempts {
            active.access_failed_count = Set(0);
            active.lockout_end = Set(Some(
                OffsetDateTime::now_utc() + time::Duration::minutes(lockout.default_lockout_minutes),
            ));
            active.update(self.db()).await?;
            tracing::warn!(user_id = %user.id, "User locked out after repeated failures");
            Ok(SignInOutcome::LockedOut)
        } else {
            active.access_failed_count = Set(failed);
            active.update(self.db()).await?;
            Ok(SignInOutcome::Failed)
        }
    }

    #[tracing::instrument(skip(self, provider_key))]
    pub async fn add_login(
        &self,
        user_id: &str,
        login_provider: &str,
        provider_key: &str,
        display_name: Option<&str>,
    ) -> Result<(), IdentityError> {
        if self
            .find_user_by_login(login_provider, provider_key)
            .await?
            .is_some()
        {
            return Err(FieldError::login_already_associated().into());
        }
        identity_user_login::ActiveModel {
            login_provider: Set(login_provider.to_string()),
            provider_key: Set(provider_key.to_string()),
            provider_display_name: Set(display_name.map(str::to_string)),
            user_id: Set(user_id.to_string()),
        }
        .insert(self.db())
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, provider_key))]
    pub async fn remove_login(
        &self,
        user_id: &str,
        login_provider: &str,
        provider_key: &str,
    ) -> Result<(), IdentityError> {
        let result = identity_user_login::Entity::delete_many()
            .filter(identity_user_login::Column::UserId.eq(user_id))
            .filter(identity_user_login::Column::LoginProvider.eq(login_provider))
            .filter(identity_user_login::Column::ProviderKey.eq(provider_key))
            .exec(self.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(IdentityError::not_found(format!(
                "login {login_provider} for user {user_id}"
            )));
        }
        Ok(())
    }

    async fn store_password(
        &self,
        user: &identity_user::Model,
        password: &str,
    ) -> Result<identity_user::Model, IdentityError> {
        validate_password(&self.options().password, password).into_result()?;
        let mut active: identity_user::ActiveModel = user.clone().into();
        active.password_hash = Set(Some(hash_password(password)?));
        Ok(active.update(self.db()).await?)
    }

    /// Give a password to an account that has none.
    #[tracing::instrument(skip(self, user, password), fields(user_id = %user.id))]
    pub async fn add_password(
        &self,
        user: &identity_user::Model,
        password: &str,
    ) -> Result<identity_user::Model, IdentityError> {
        if user.has_password() {
            return Err(IdentityError::SetPasswordConflict);
        }
        self.store_password(user, password).await
    }

    #[tracing::instrument(skip(self, user, current, new_password), fields(user_id = %user.id))]
    pub async fn change_password(
        &self,
        user: &identity_user::Model,
        current: &str,
        new_password: &str,
    ) -> Result<identity_user::Model, IdentityError> {
        let matches = user
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(current, hash));
        if !matches {
            return Err(FieldError::password_mismatch().into());
        }
        self.store_password(user, new_password).await
    }

    /// Overwrite the password. The caller has already consumed a reset token.
    #[tracing::instrument(skip(self, user, new_password), fields(user_id = %user.id))]
    pub async fn reset_password(
        &self,
        user: &identity_user::Model,
        new_password: &str,
    ) -> Result<identity_user::Model, IdentityError> {
        let mut user = self.store_password(user, new_password).await?;
        if user.lockout_end.is_some() || user.access_failed_count != 0 {
            let mut active: identity_user::ActiveModel = user.into();
            active.lockout_end = Set(None);
            active.access_failed_count = Set(0);
            user = active.update(self.db()).await?;
        }
        Ok(user)
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn set_user_name(
        &self,
        user: &identity_user::Model,
        user_name: &str,
    ) -> Result<identity_user::Model, IdentityError> {
        let mut errors = ValidationErrors::new();
        self.check_user_name(user_name, Some(&user.id), &mut errors)
            .await?;
        errors.into_result()?;

        let mut active: identity_user::ActiveModel = user.clone().into();
        active.user_name = Set(user_name.to_string());
        active.normalized_user_name = Set(normalize(user_name));
        Ok(active.update(self.db()).await?)
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn set_email(
        &self,
        user: &identity_user::Model,
        email: &str,
        confirmed: bool,
    ) -> Result<identity_user::Model, IdentityError> {
        let mut errors = ValidationErrors::new();
        self.check_email(Some(email), Some(&user.id), &mut errors)
            .await?;
        errors.into_result()?;

        let mut active: identity_user::ActiveModel = user.clone().into();
        active.email = Set(Some(email.to_string()));
        active.normalized_email = Set(Some(normalize(email)));
        active.email_confirmed = Set(confirmed);
        Ok(active.update(self.db()).await?)
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn set_phone_number(
        &self,
        user: &identity_user::Model,
        phone_number: &str,
        confirmed: bool,
    ) -> Result<identity_user::Model, IdentityError> {
        if !is_valid_phone_number(phone_number) {
            return Err(FieldError::invalid_phone_number(phone_number).into());
        }
        if let Some(existing) = self.find_user_by_phone(phone_number).await?
            && existing.id != user.id
        {
            return Err(FieldError::duplicate_phone_number(phone_number).into());
        }

        let mut active: identity_user::ActiveModel = user.clone().into();
        active.phone_number = Set(Some(phone_number.trim().to_string()));
        active.phone_number_confirmed = Set(confirmed);
        Ok(active.update(self.db()).await?)
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn set_email_confirmed(
        &self,
        user: &identity_user::Model,
    ) -> Result<identity_user::Model, DbErr> {
        let mut active: identity_user::ActiveModel = user.clone().into();
        active.email_confirmed = Set(true);
        active.update(self.db()).await
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn set_phone_number_confirmed(
        &self,
        user: &identity_user::Model,
    ) -> Result<identity_user::Model, DbErr> {
        let mut active: identity_user::ActiveModel = user.clone().into();
        active.phone_number_confirmed = Set(true);
        active.update(self.db()).await
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn set_active(
        &self,
        user: &identity_user::Model,
        is_active: bool,
    ) -> Result<identity_user::Model, DbErr> {
        let mut active: identity_user::ActiveModel = user.clone().into();
        active.is_active = Set(is_active);
        active.update(self.db()).await
    }

    /// Physically remove a user together with everything attached to it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError> {
        let txn = self.db().begin().await?;

        identity_user_claim::Entity::delete_many()
            .filter(identity_user_claim::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        identity_user_login::Entity::delete_many()
            .filter(identity_user_login::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        identity_user_role::Entity::delete_many()
            .filter(identity_user_role::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        identity_user_token::Entity::delete_many()
            .filter(identity_user_token::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        identity_purpose_token::Entity::delete_many()
            .filter(identity_purpose_token::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        let result = identity_user::Entity::delete_by_id(user_id.to_string())
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(IdentityError::not_found(format!("user {user_id}")));
        }

        txn.commit().await?;
        tracing::info!(user_id, "Deleted user");
        Ok(())
    }

    /// Claims of a user in insertion order.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_claims(&self, user_id: &str) -> Result<Vec<Claim>, DbErr> {
        let rows = identity_user_claim::Entity::find()
            .filter(identity_user_claim::Column::UserId.eq(user_id))
            .order_by_asc(identity_user_claim::Column::Id)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Claim::new(row.claim_type, row.claim_value))
            .collect())
    }

    /// First claim of the given type. Claims are not unique by type.
    #[tracing::instrument(skip(self))]
    pub async fn find_user_claim(
        &self,
        user_id: &str,
        claim_type: &str,
    ) -> Result<Option<identity_user_claim::Model>, DbErr> {
        identity_user_claim::Entity::find()
            .filter(identity_user_claim::Column::UserId.eq(user_id))
            .filter(identity_user_claim::Column::ClaimType.eq(claim_type))
            .order_by_asc(identity_user_claim::Column::Id)
            .one(self.db())
            .await
    }

    #[tracing::instrument(skip(self, claim))]
    pub async fn add_user_claim(
        &self,
        user_id: &str,
        claim: &Claim,
    ) -> Result<identity_user_claim::Model, DbErr> {
        identity_user_claim::ActiveModel {
            user_id: Set(user_id.to_string()),
            claim_type: Set(claim.claim_type.clone()),
            claim_value: Set(claim.value.clone()),
            ..Default::default()
        }
        .insert(self.db())
        .await
    }

    /// Remove the first claim of the given type, returning it.
    #[tracing::instrument(skip(self))]
    pub async fn remove_user_claim(
        &self,
        user_id: &str,
        claim_type: &str,
    ) -> Result<Option<Claim>, DbErr> {
        let Some(row) = self.find_user_claim(user_id, claim_type).await? else {
            return Ok(None);
        };
        identity_user_claim::Entity::delete_by_id(row.id)
            .exec(self.db())
            .await?;
        Ok(Some(Claim::new(row.claim_type, row.claim_value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_format() {
        assert!(is_valid_email("alice@example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("@example.org"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("al ice@example.org"));
        assert!(!is_valid_email("a@b@c"));
    }

    #[test]
    fn phone_format() {
        assert!(is_valid_phone_number("+45 12 34 56 78"));
        assert!(is_valid_phone_number("(555) 123-4567"));
        assert!(!is_valid_phone_number("call me"));
        assert!(!is_valid_phone_number("12"));
    }
}
