use tokio_util::sync::CancellationToken;

use super::{
    IdentityManager, LogIn, LogInExternal, LogInExternalDirect, LogInRefresh, SignOut,
    provider_failure, transient_grants,
};
use crate::error::IdentityError;
use crate::external::{ExternalLoginData, ExternalProviderInfo, ProviderError};
use crate::store::SignInOutcome;
use crate::token::{ADMINISTRATOR, AccessToken, AccessTokenData, Claim};

impl IdentityManager {
    /// Password sign-in. Falls back to the transient administrator when no
    /// store is configured.
    #[tracing::instrument(skip(self, log_in), fields(username = %log_in.username, app_id = %log_in.app_id))]
    pub async fn sign_in(&self, log_in: &LogIn) -> Result<AccessToken, IdentityError> {
        let Some(backend) = self.backend.as_ref() else {
            return self.sign_in_admin_transient(log_in);
        };

        let Some(user) = backend.store.find_user_by_name(&log_in.username).await? else {
            tracing::info!("Sign-in for unknown user");
            return Err(IdentityError::Unauthorized);
        };

        let outcome = backend
            .store
            .password_sign_in(
                &user,
                &log_in.password,
                self.config.lockout.allowed_for_new_users,
            )
            .await?;

        match outcome {
            SignInOutcome::Succeeded => {
                self.mint(
                    &user,
                    &log_in.app_id,
                    log_in.is_refreshable,
                    None,
                    &log_in.transient_roles,
                    &log_in.transient_claims,
                )
                .await
            }
            SignInOutcome::LockedOut => {
                tracing::info!(user_id = %user.id, "User is locked out");
                Err(IdentityError::LockedOut)
            }
            SignInOutcome::NotAllowed => {
                tracing::info!(user_id = %user.id, "User is not allowed to sign in");
                Err(IdentityError::LockedOut)
            }
            SignInOutcome::RequiresTwoFactor => {
                tracing::info!(user_id = %user.id, "User requires two-factor authentication");
                Err(IdentityError::TwoFactorRequired)
            }
            SignInOutcome::Failed => Err(IdentityError::Unauthorized),
            SignInOutcome::Unrecognized => {
                tracing::warn!(user_id = %user.id, "Unrecognized sign-in outcome");
                Err(IdentityError::UnknownSignInFailure)
            }
        }
    }

    /// Sign in the configured administrator without any store access.
    ///
    /// The token carries a random subject, the administrator role and no
    /// refresh token.
    #[tracing::instrument(skip(self, log_in), fields(username = %log_in.username))]
    pub fn sign_in_admin_transient(&self, log_in: &LogIn) -> Result<AccessToken, IdentityError> {
        let user = &self.config.user;
        let (Some(admin_email), Some(admin_password)) =
            (user.admin_email.as_deref(), user.admin_password.as_deref())
        else {
            tracing::warn!("Transient administrator sign-in without configured credentials");
            return Err(IdentityError::Unauthorized);
        };
        if admin_email.is_empty() || log_in.username != admin_email || log_in.password != admin_password {
            return Err(IdentityError::Unauthorized);
        }

        let mut claims: std::collections::BTreeSet<Claim> =
            transient_grants(&log_in.transient_roles, &log_in.transient_claims)?
                .into_iter()
                .collect();
        claims.insert(Claim::role(ADMINISTRATOR));

        self.sign(&AccessTokenData {
            app_id: log_in.app_id.clone(),
            user_id: uuid::Uuid::new_v4().to_string(),
            user_name: admin_email.to_string(),
            email: admin_email.to_string(),
            claims,
            ..Default::default()
        })
    }

    /// Resolve an external credential. Failures other than cancellation and
    /// unsupported providers are logged and reported as `Unauthorized`.
    #[tracing::instrument(skip(self, request, cancel), fields(provider = %request.provider))]
    pub async fn resolve_external(
        &self,
        request: &crate::external::ExternalLoginRequest,
        cancel: &CancellationToken,
    ) -> Result<ExternalLoginData, IdentityError> {
        self.providers
            .resolve(request, cancel)
            .await
            .map_err(provider_failure)
    }

    /// External sign-in for an account that already has this login linked.
    #[tracing::instrument(skip(self, log_in, cancel), fields(provider = %log_in.provider))]
    pub async fn sign_in_external(
        &self,
        log_in: &LogInExternal,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, IdentityError> {
        let data = self
            .resolve_external(&log_in.external_request(), cancel)
            .await?;
        self.sign_in_external_direct(&LogInExternalDirect {
            external_login_data: data,
            app_id: log_in.app_id.clone(),
            is_refreshable: log_in.is_refreshable,
            transient_roles: log_in.transient_roles.clone(),
            transient_claims: log_in.transient_claims.clone(),
        })
        .await
    }

    /// External sign-in with already resolved identity data.
    #[tracing::instrument(skip(self, log_in), fields(provider = %log_in.external_login_data.external_token.name))]
    pub async fn sign_in_external_direct(
        &self,
        log_in: &LogInExternalDirect,
    ) -> Result<AccessToken, IdentityError> {
        let data = &log_in.external_login_data;
        let store = self.store()?;
        let Some(user) = store
            .find_user_by_login(&data.external_token.name, &data.id)
            .await?
        else {
            tracing::info!("No local account linked to external login");
            return Err(IdentityError::Unauthorized);
        };
        if !user.is_active {
            return Err(IdentityError::LockedOut);
        }
        if user.is_locked_out() {
            return Err(IdentityError::LockedOut);
        }

        self.mint(
            &user,
            &log_in.app_id,
            log_in.is_refreshable,
            Some(&data.external_token),
            &log_in.transient_roles,
            &log_in.transient_claims,
        )
        .await
    }

    /// Token straight from resolved external data, with transient grants only.
    #[tracing::instrument(skip(self, data, transient_roles, transient_claims))]
    pub fn sign_in_external_transient(
        &self,
        data: &ExternalLoginData,
        transient_roles: &[String],
        transient_claims: &std::collections::BTreeMap<String, String>,
    ) -> Result<AccessToken, IdentityError> {
        self.sign(&AccessTokenData {
            app_id: crate::token::DEFAULT_APP_ID.to_string(),
            user_id: data.id.clone(),
            user_name: data.name.clone().unwrap_or_default(),
            email: data.email.clone().unwrap_or_default(),
            external_provider_name: Some(data.external_token.name.clone()),
            external_provider_token: Some(data.external_token.token.clone()),
            external_provider_refresh_token: data.external_token.refresh_token.clone(),
            claims: transient_grants(transient_roles, transient_claims)?
                .into_iter()
                .collect(),
        })
    }

    pub fn external_providers(&self) -> Vec<ExternalProviderInfo> {
        self.providers.configured_providers()
    }

    /// Exchange an old access token plus its refresh token for a new pair.
    ///
    /// Expired access tokens are accepted. Any token or refresh-token problem is
    /// reported as `Unauthorized` and leaves the stored refresh token untouched.
    #[tracing::instrument(skip(self, log_in, cancel))]
    pub async fn refresh_sign_in(
        &self,
        log_in: &LogInRefresh,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, IdentityError> {
        let backend = self.backend()?;

        let principal = self
            .codec
            .decode_ignoring_lifetime(&log_in.token)
            .map_err(|e| {
                tracing::info!(error = %e, "Refresh with invalid access token");
                IdentityError::Unauthorized
            })?;

        let Some(user) = backend.store.find_user_by_id(&principal.subject).await? else {
            tracing::info!(user_id = %principal.subject, "Refresh for unknown user");
            return Err(IdentityError::Unauthorized);
        };
        if !user.is_active {
            return Err(IdentityError::Unauthorized);
        }

        backend
            .refresh_tokens
            .validate(&user.id, &principal.app_id, &log_in.refresh_token)
            .await
            .map_err(|e| match e {
                crate::refresh::RefreshTokenError::Database(db) => IdentityError::Database(db),
                other => {
                    tracing::info!(user_id = %user.id, error = %other, "Refresh token rejected");
                    IdentityError::Unauthorized
                }
            })?;

        let external = self
            .providers
            .refresh_provider_token(
                principal.external_provider_name.as_deref().unwrap_or_default(),
                principal
                    .external_provider_refresh_token
                    .as_deref()
                    .unwrap_or_default(),
                cancel,
            )
            .await
            .map_err(|e| match e {
                ProviderError::Cancelled => IdentityError::Cancelled,
                other => {
                    tracing::error!(error = %other, "External provider refresh failed");
                    IdentityError::Unauthorized
                }
            })?;

        self.mint(
            &user,
            &principal.app_id,
            true,
            external.as_ref(),
            &log_in.transient_roles,
            &log_in.transient_claims,
        )
        .await
    }

    /// Revoke the refresh token of a (user, application) pair.
    #[tracing::instrument(skip(self))]
    pub async fn sign_out(&self, sign_out: &SignOut) -> Result<(), IdentityError> {
        let backend = self.backend()?;
        let revoked = backend
            .refresh_tokens
            .revoke(&sign_out.user_id, &sign_out.app_id)
            .await?;
        tracing::info!(user_id = %sign_out.user_id, revoked, "Signed out");
        Ok(())
    }
}
