//! Sign-in, sign-up and sign-out endpoints (/api/identity/*).

use axum::{Extension, Json, http::StatusCode};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::AppResources;
use crate::api::{auth::BearerAuth, error::ApiError};
use crate::external::{ExternalProviderInfo, LoginGrant};
use crate::manager::{LogIn, LogInExternal, LogInRefresh, SignOut, SignUp, SignUpExternal, UserInfo};
use crate::token::{AccessToken, DEFAULT_APP_ID};

/// Tag for OpenAPI documentation.
pub const IDENTITY_TAG: &str = "Identity";

// Request bodies of the public endpoints. They carry no roles or claims: grants
// come from the store, and transient grants are only set by server-side callers
// of the manager.

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogInRequest {
    pub username: String,
    pub password: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub is_refreshable: bool,
}

impl From<LogInRequest> for LogIn {
    fn from(request: LogInRequest) -> Self {
        Self {
            username: request.username,
            password: request.password,
            app_id: request.app_id,
            is_refreshable: request.is_refreshable,
            transient_roles: Vec::new(),
            transient_claims: Default::default(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogInExternalRequest {
    pub provider: String,
    pub grant: LoginGrant,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub is_refreshable: bool,
}

impl From<LogInExternalRequest> for LogInExternal {
    fn from(request: LogInExternalRequest) -> Self {
        Self {
            provider: request.provider,
            grant: request.grant,
            app_id: request.app_id,
            is_refreshable: request.is_refreshable,
            transient_roles: Vec::new(),
            transient_claims: Default::default(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogInRefreshRequest {
    /// The previous access token. It may be expired.
    pub token: String,
    pub refresh_token: String,
}

impl From<LogInRefreshRequest> for LogInRefresh {
    fn from(request: LogInRefreshRequest) -> Self {
        Self {
            token: request.token,
            refresh_token: request.refresh_token,
            transient_roles: Vec::new(),
            transient_claims: Default::default(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl From<SignUpRequest> for SignUp {
    fn from(request: SignUpRequest) -> Self {
        Self {
            username: request.username,
            email: request.email,
            password: request.password,
            phone_number: request.phone_number,
            roles: Vec::new(),
            claims: Default::default(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignUpExternalRequest {
    pub provider: String,
    pub grant: LoginGrant,
}

impl From<SignUpExternalRequest> for SignUpExternal {
    fn from(request: SignUpExternalRequest) -> Self {
        Self {
            provider: request.provider,
            grant: request.grant,
            roles: Vec::new(),
            claims: Default::default(),
        }
    }
}

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(login))
        .routes(routes!(login_external))
        .routes(routes!(login_refresh))
        .routes(routes!(external_providers))
        .routes(routes!(logout))
        .routes(routes!(signup))
        .routes(routes!(signup_external))
}

#[tracing::instrument(skip(resources, payload), fields(username = %payload.username, app_id = %payload.app_id))]
#[utoipa::path(
    post,
    path = "/login",
    tag = IDENTITY_TAG,
    operation_id = "Log In",
    summary = "Sign in with username and password",
    description = "Returns an access token carrying the user's persisted roles and claims. \
                   A refresh token is included when `is_refreshable` is set.\n\n\
                   Without a configured database only the configured administrator can sign in.",
    request_body = LogInRequest,
    responses(
        (status = 200, description = "Signed in", body = AccessToken),
        (status = 401, description = "Wrong credentials or two-factor required", body = ApiError),
        (status = 403, description = "Account locked out or not allowed", body = ApiError)
    )
)]
pub async fn login(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<LogInRequest>,
) -> Result<Json<AccessToken>, ApiError> {
    Ok(Json(resources.manager.sign_in(&payload.into()).await?))
}

#[tracing::instrument(skip(resources, payload), fields(provider = %payload.provider))]
#[utoipa::path(
    post,
    path = "/login/external",
    tag = IDENTITY_TAG,
    operation_id = "Log In External",
    summary = "Sign in with an external provider credential",
    description = "Resolves the credential with the named provider and signs in the local account \
                   linked to that external login.",
    request_body = LogInExternalRequest,
    responses(
        (status = 200, description = "Signed in", body = AccessToken),
        (status = 400, description = "Provider or grant not supported", body = ApiError),
        (status = 401, description = "Credential rejected or no linked account", body = ApiError)
    )
)]
pub async fn login_external(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<LogInExternalRequest>,
) -> Result<Json<AccessToken>, ApiError> {
    let cancel = resources.shutdown.child_token();
    Ok(Json(
        resources
            .manager
            .sign_in_external(&payload.into(), &cancel)
            .await?,
    ))
}

#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/login/refresh",
    tag = IDENTITY_TAG,
    operation_id = "Refresh Token",
    summary = "Exchange an access token and its refresh token for a new pair",
    description = "The access token may be expired but must carry a valid signature. The stored \
                   refresh token is replaced on success and left untouched on failure.",
    request_body = LogInRefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = AccessToken),
        (status = 401, description = "Token or refresh token rejected", body = ApiError)
    )
)]
pub async fn login_refresh(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<LogInRefreshRequest>,
) -> Result<Json<AccessToken>, ApiError> {
    let cancel = resources.shutdown.child_token();
    Ok(Json(
        resources
            .manager
            .refresh_sign_in(&payload.into(), &cancel)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/login/providers",
    tag = IDENTITY_TAG,
    operation_id = "External Providers",
    summary = "List configured external login providers",
    responses(
        (status = 200, description = "Configured providers", body = Vec<ExternalProviderInfo>)
    )
)]
pub async fn external_providers(
    Extension(resources): Extension<AppResources>,
) -> Json<Vec<ExternalProviderInfo>> {
    Json(resources.manager.external_providers())
}

#[tracing::instrument(skip(resources, auth), fields(user_id = %auth.0.subject))]
#[utoipa::path(
    post,
    path = "/logout",
    tag = IDENTITY_TAG,
    operation_id = "Log Out",
    summary = "Revoke the refresh token of the calling application",
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    )
)]
pub async fn logout(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
) -> Result<StatusCode, ApiError> {
    resources
        .manager
        .sign_out(&SignOut {
            user_id: auth.0.subject.clone(),
            app_id: auth.0.app_id.clone(),
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, payload), fields(username = %payload.username))]
#[utoipa::path(
    post,
    path = "/signup",
    tag = IDENTITY_TAG,
    operation_id = "Sign Up",
    summary = "Create a local account",
    description = "All field problems are reported together. The account receives the configured \
                   default roles.",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = UserInfo),
        (status = 400, description = "Validation failed", body = ApiError)
    )
)]
pub async fn signup(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<UserInfo>), ApiError> {
    let user = resources.manager.sign_up(&payload.into()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[tracing::instrument(skip(resources, payload), fields(provider = %payload.provider))]
#[utoipa::path(
    post,
    path = "/signup/external",
    tag = IDENTITY_TAG,
    operation_id = "Sign Up External",
    summary = "Link an external login, creating the account if needed",
    description = "The account is matched by the email the provider reports. A new account uses \
                   the email as its username and has no password.",
    request_body = SignUpExternalRequest,
    responses(
        (status = 201, description = "External login linked", body = UserInfo),
        (status = 400, description = "Validation failed or provider not supported", body = ApiError),
        (status = 401, description = "Credential rejected by the provider", body = ApiError)
    )
)]
pub async fn signup_external(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<SignUpExternalRequest>,
) -> Result<(StatusCode, Json<UserInfo>), ApiError> {
    let cancel = resources.shutdown.child_token();
    let user = resources
        .manager
        .sign_up_external(&payload.into(), &cancel)
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}
