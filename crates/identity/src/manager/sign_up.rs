use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use super::{IdentityManager, SignUp, SignUpExternal, check_claim_types};
use crate::entity::identity_user;
use crate::error::{FieldError, IdentityError};
use crate::external::{ExternalLoginData, ExternalLoginRequest};
use crate::store::NewUser;
use crate::token::Claim;

impl IdentityManager {
    /// Create a local account with a password.
    #[tracing::instrument(skip(self, sign_up), fields(username = %sign_up.username))]
    pub async fn sign_up(&self, sign_up: &SignUp) -> Result<identity_user::Model, IdentityError> {
        let store = self.store()?;
        check_claim_types(sign_up.claims.keys().map(String::as_str))?;
        let user = store
            .create_user(NewUser {
                user_name: sign_up.username.clone(),
                email: Some(sign_up.email.clone()),
                phone_number: sign_up.phone_number.clone(),
                password: Some(sign_up.password.clone()),
                email_confirmed: false,
            })
            .await?;

        if let Err(e) = self
            .assign_sign_up_roles_and_claims(&user, &sign_up.roles, &sign_up.claims)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %e, "Sign-up grants failed, removing user");
            store.delete_user(&user.id).await?;
            return Err(e);
        }
        Ok(user)
    }

    /// Resolve the external credential and sign up with the result.
    #[tracing::instrument(skip(self, sign_up, cancel), fields(provider = %sign_up.provider))]
    pub async fn sign_up_external(
        &self,
        sign_up: &SignUpExternal,
        cancel: &CancellationToken,
    ) -> Result<identity_user::Model, IdentityError> {
        let request = ExternalLoginRequest {
            provider: sign_up.provider.clone(),
            grant: sign_up.grant.clone(),
        };
        let data = self.resolve_external(&request, cancel).await?;
        self.sign_up_external_direct(&data, &sign_up.roles, &sign_up.claims)
            .await
    }

    /// Link the external login to the account with the same email, creating
    /// that account first when there is none.
    #[tracing::instrument(skip(self, data, roles, claims), fields(provider = %data.external_token.name))]
    pub async fn sign_up_external_direct(
        &self,
        data: &ExternalLoginData,
        roles: &[String],
        claims: &BTreeMap<String, String>,
    ) -> Result<identity_user::Model, IdentityError> {
        let store = self.store()?;
        check_claim_types(claims.keys().map(String::as_str))?;
        let email = data
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| IdentityError::from(FieldError::invalid_email("")))?;

        let (user, created) = match store.find_user_by_email(email).await? {
            Some(user) => (user, false),
            None => {
                let user = store
                    .create_user(NewUser {
                        user_name: email.to_string(),
                        email: Some(email.to_string()),
                        ..Default::default()
                    })
                    .await?;
                (user, true)
            }
        };

        if let Err(e) = store
            .add_login(
                &user.id,
                &data.external_token.name,
                &data.id,
                Some(&data.external_token.name),
            )
            .await
        {
            if created {
                store.delete_user(&user.id).await?;
            }
            return Err(e);
        }

        if let Err(e) = self
            .assign_sign_up_roles_and_claims(&user, roles, claims)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %e, "External sign-up grants failed, unlinking");
            if created {
                store.delete_user(&user.id).await?;
            } else {
                store
                    .remove_login(&user.id, &data.external_token.name, &data.id)
                    .await?;
            }
            return Err(e);
        }
        tracing::info!(user_id = %user.id, created, "Linked external login");
        Ok(user)
    }

    /// Requested roles plus the configured default roles, then requested claims.
    /// Roles the user already holds are skipped.
    async fn assign_sign_up_roles_and_claims(
        &self,
        user: &identity_user::Model,
        roles: &[String],
        claims: &BTreeMap<String, String>,
    ) -> Result<(), IdentityError> {
        let store = self.store()?;
        let held = store.get_user_roles(&user.id).await?;

        let mut wanted: Vec<String> = Vec::new();
        for role in roles.iter().chain(self.config.user.default_roles.iter()) {
            let already = wanted
                .iter()
                .chain(held.iter())
                .any(|r| r.eq_ignore_ascii_case(role));
            if !already {
                wanted.push(role.clone());
            }
        }
        if !wanted.is_empty() {
            store.add_to_roles(&user.id, &wanted).await?;
        }

        for (claim_type, value) in claims {
            store
                .add_user_claim(&user.id, &Claim::new(claim_type.clone(), value.clone()))
                .await?;
        }
        Ok(())
    }
}
