//! Account maintenance endpoints: username, password, email and phone number.
//!
//! Purpose token generation is restricted to administrators; the token is meant
//! to be delivered out of band by the caller. Consuming a token is public.

use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::AppResources;
use crate::api::{auth::BearerAuth, error::ApiError};
use crate::manager::{
    ChangeEmail, ChangePassword, ChangePhoneNumber, ConfirmEmail, ConfirmPhoneNumber,
    RemoveExternalLogin, ResetPassword, SetPassword, SetUsername, UserInfo,
};
use crate::purpose::PurposeToken;

/// Tag for OpenAPI documentation.
pub const ACCOUNT_TAG: &str = "Account";

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailTokenRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeEmailTokenRequest {
    pub email: String,
    pub new_email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PhoneTokenRequest {
    pub phone_number: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePhoneTokenRequest {
    pub phone_number: String,
    pub new_phone_number: String,
}

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(get_user, delete_user))
        .routes(routes!(deactivate_user))
        .routes(routes!(set_username))
        .routes(routes!(remove_external_login))
        .routes(routes!(set_password))
        .routes(routes!(change_password))
        .routes(routes!(reset_password_token))
        .routes(routes!(reset_password))
        .routes(routes!(confirm_email_token))
        .routes(routes!(confirm_email))
        .routes(routes!(change_email_token))
        .routes(routes!(change_email))
        .routes(routes!(confirm_phone_token))
        .routes(routes!(confirm_phone))
        .routes(routes!(change_phone_token))
        .routes(routes!(change_phone))
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = ACCOUNT_TAG,
    operation_id = "Get User",
    params(("id" = String, Path, description = "User id")),
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "The user", body = UserInfo),
        (status = 403, description = "Not the caller's account", body = ApiError)
    )
)]
pub async fn get_user(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
) -> Result<Json<UserInfo>, ApiError> {
    auth.require_self_or_admin(&id)?;
    Ok(Json(resources.manager.get_user(&id).await?.into()))
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = ACCOUNT_TAG,
    operation_id = "Delete User",
    summary = "Delete a user with its logins, tokens, claims and role links",
    params(("id" = String, Path, description = "User id")),
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Administrator role required", body = ApiError)
    )
)]
pub async fn delete_user(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require_admin()?;
    resources.manager.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    post,
    path = "/users/{id}/deactivate",
    tag = ACCOUNT_TAG,
    operation_id = "Deactivate User",
    summary = "Deactivate a user and revoke its refresh tokens",
    params(("id" = String, Path, description = "User id")),
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 403, description = "Administrator role required", body = ApiError)
    )
)]
pub async fn deactivate_user(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require_admin()?;
    resources.manager.deactivate_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload), fields(user_id = %payload.user_id))]
#[utoipa::path(
    post,
    path = "/username",
    tag = ACCOUNT_TAG,
    operation_id = "Set Username",
    request_body = SetUsername,
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Username changed"),
        (status = 400, description = "Invalid or duplicate username", body = ApiError)
    )
)]
pub async fn set_username(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<SetUsername>,
) -> Result<StatusCode, ApiError> {
    auth.require_self_or_admin(&payload.user_id)?;
    resources.manager.set_username(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload), fields(user_id = %payload.user_id))]
#[utoipa::path(
    post,
    path = "/logins/remove",
    tag = ACCOUNT_TAG,
    operation_id = "Remove External Login",
    request_body = RemoveExternalLogin,
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "External login removed"),
        (status = 403, description = "Not the caller's account", body = ApiError)
    )
)]
pub async fn remove_external_login(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<RemoveExternalLogin>,
) -> Result<StatusCode, ApiError> {
    auth.require_self_or_admin(&payload.user_id)?;
    resources.manager.remove_external_login(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload), fields(user_id = %payload.user_id))]
#[utoipa::path(
    post,
    path = "/password/set",
    tag = ACCOUNT_TAG,
    operation_id = "Set Password",
    summary = "Add a password to an account that has none",
    request_body = SetPassword,
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Password set"),
        (status = 400, description = "Password policy violated", body = ApiError),
        (status = 409, description = "The account already has a password", body = ApiError)
    )
)]
pub async fn set_password(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<SetPassword>,
) -> Result<StatusCode, ApiError> {
    auth.require_self_or_admin(&payload.user_id)?;
    resources.manager.set_password(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload), fields(user_id = %payload.user_id))]
#[utoipa::path(
    post,
    path = "/password/change",
    tag = ACCOUNT_TAG,
    operation_id = "Change Password",
    request_body = ChangePassword,
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Old password wrong or policy violated", body = ApiError)
    )
)]
pub async fn change_password(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<ChangePassword>,
) -> Result<StatusCode, ApiError> {
    auth.require_self_or_admin(&payload.user_id)?;
    resources.manager.change_password(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    post,
    path = "/password/reset-token",
    tag = ACCOUNT_TAG,
    operation_id = "Reset Password Token",
    request_body = EmailTokenRequest,
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "Token issued", body = PurposeToken),
        (status = 400, description = "No account with that email", body = ApiError)
    )
)]
pub async fn reset_password_token(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<EmailTokenRequest>,
) -> Result<Json<PurposeToken>, ApiError> {
    auth.require_admin()?;
    Ok(Json(
        resources
            .manager
            .generate_reset_password_token(&payload.email)
            .await?,
    ))
}

#[tracing::instrument(skip(resources, payload), fields(email = %payload.email))]
#[utoipa::path(
    post,
    path = "/password/reset",
    tag = ACCOUNT_TAG,
    operation_id = "Reset Password",
    summary = "Set a new password with a reset-password token",
    request_body = ResetPassword,
    responses(
        (status = 204, description = "Password reset"),
        (status = 400, description = "Invalid token or password policy violated", body = ApiError)
    )
)]
pub async fn reset_password(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<ResetPassword>,
) -> Result<StatusCode, ApiError> {
    resources.manager.reset_password(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    post,
    path = "/email/confirm-token",
    tag = ACCOUNT_TAG,
    operation_id = "Confirm Email Token",
    request_body = EmailTokenRequest,
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "Token issued", body = PurposeToken),
        (status = 400, description = "No account with that email", body = ApiError)
    )
)]
pub async fn confirm_email_token(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<EmailTokenRequest>,
) -> Result<Json<PurposeToken>, ApiError> {
    auth.require_admin()?;
    Ok(Json(
        resources
            .manager
            .generate_confirm_email_token(&payload.email)
            .await?,
    ))
}

#[tracing::instrument(skip(resources, payload), fields(email = %payload.email))]
#[utoipa::path(
    post,
    path = "/email/confirm",
    tag = ACCOUNT_TAG,
    operation_id = "Confirm Email",
    request_body = ConfirmEmail,
    responses(
        (status = 204, description = "Email confirmed"),
        (status = 400, description = "Invalid token", body = ApiError)
    )
)]
pub async fn confirm_email(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<ConfirmEmail>,
) -> Result<StatusCode, ApiError> {
    resources.manager.confirm_email(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    post,
    path = "/email/change-token",
    tag = ACCOUNT_TAG,
    operation_id = "Change Email Token",
    request_body = ChangeEmailTokenRequest,
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "Token issued, bound to the new email", body = PurposeToken),
        (status = 400, description = "Unknown account or new email invalid or taken", body = ApiError)
    )
)]
pub async fn change_email_token(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<ChangeEmailTokenRequest>,
) -> Result<Json<PurposeToken>, ApiError> {
    auth.require_admin()?;
    Ok(Json(
        resources
            .manager
            .generate_change_email_token(&payload.email, &payload.new_email)
            .await?,
    ))
}

#[tracing::instrument(skip(resources, auth, payload), fields(user_id = %payload.user_id))]
#[utoipa::path(
    post,
    path = "/email/change",
    tag = ACCOUNT_TAG,
    operation_id = "Change Email",
    request_body = ChangeEmail,
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Email changed"),
        (status = 400, description = "Invalid token or email already taken", body = ApiError)
    )
)]
pub async fn change_email(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<ChangeEmail>,
) -> Result<StatusCode, ApiError> {
    auth.require_self_or_admin(&payload.user_id)?;
    resources.manager.change_email(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    post,
    path = "/phone/confirm-token",
    tag = ACCOUNT_TAG,
    operation_id = "Confirm Phone Number Token",
    request_body = PhoneTokenRequest,
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "Token issued", body = PurposeToken),
        (status = 400, description = "No account with that phone number", body = ApiError)
    )
)]
pub async fn confirm_phone_token(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<PhoneTokenRequest>,
) -> Result<Json<PurposeToken>, ApiError> {
    auth.require_admin()?;
    Ok(Json(
        resources
            .manager
            .generate_confirm_phone_number_token(&payload.phone_number)
            .await?,
    ))
}

#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/phone/confirm",
    tag = ACCOUNT_TAG,
    operation_id = "Confirm Phone Number",
    request_body = ConfirmPhoneNumber,
    responses(
        (status = 204, description = "Phone number confirmed"),
        (status = 400, description = "Invalid token", body = ApiError)
    )
)]
pub async fn confirm_phone(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<ConfirmPhoneNumber>,
) -> Result<StatusCode, ApiError> {
    resources.manager.confirm_phone_number(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    post,
    path = "/phone/change-token",
    tag = ACCOUNT_TAG,
    operation_id = "Change Phone Number Token",
    request_body = ChangePhoneTokenRequest,
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "Token issued, bound to the new number", body = PurposeToken),
        (status = 400, description = "Unknown account or new number invalid or taken", body = ApiError)
    )
)]
pub async fn change_phone_token(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<ChangePhoneTokenRequest>,
) -> Result<Json<PurposeToken>, ApiError> {
    auth.require_admin()?;
    Ok(Json(
        resources
            .manager
            .generate_change_phone_number_token(&payload.phone_number, &payload.new_phone_number)
            .await?,
    ))
}

#[tracing::instrument(skip(resources, auth, payload), fields(user_id = %payload.user_id))]
#[utoipa::path(
    post,
    path = "/phone/change",
    tag = ACCOUNT_TAG,
    operation_id = "Change Phone Number",
    request_body = ChangePhoneNumber,
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Phone number changed"),
        (status = 400, description = "Invalid token or number", body = ApiError)
    )
)]
pub async fn change_phone(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<ChangePhoneNumber>,
) -> Result<StatusCode, ApiError> {
    auth.require_self_or_admin(&payload.user_id)?;
    resources.manager.change_phone_number(&payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
