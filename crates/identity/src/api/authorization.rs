//! Role and claim endpoints. Reading a user's own roles and claims is allowed
//! to that user; everything else requires the administrator role.

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
use crate::manager::{AssignClaim, AssignRole, GetClaim, RemoveClaim, RemoveRole, RoleInfo};
use crate::token::Claim;

/// Tag for OpenAPI documentation.
pub const AUTHORIZATION_TAG: &str = "Authorization";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRole {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleAssignment {
    pub role_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClaimAssignment {
    pub claim_type: String,
    pub claim_value: String,
}

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_roles, create_role))
        .routes(routes!(delete_role))
        .routes(routes!(user_roles, assign_user_role))
        .routes(routes!(remove_user_role))
        .routes(routes!(user_claims, assign_user_claim))
        .routes(routes!(user_claim, remove_user_claim))
        .routes(routes!(role_claims, assign_role_claim))
        .routes(routes!(role_claim, remove_role_claim))
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = AUTHORIZATION_TAG,
    operation_id = "List Roles",
    security(("Authorization" = [])),
    responses((status = 200, description = "All roles ordered by name", body = Vec<RoleInfo>))
)]
pub async fn list_roles(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
) -> Result<Json<Vec<RoleInfo>>, ApiError> {
    auth.require_admin()?;
    Ok(Json(resources.manager.get_roles().await?))
}

#[tracing::instrument(skip(resources, auth, payload), fields(role = %payload.name))]
#[utoipa::path(
    post,
    path = "/roles",
    tag = AUTHORIZATION_TAG,
    operation_id = "Create Role",
    request_body = CreateRole,
    security(("Authorization" = [])),
    responses(
        (status = 201, description = "Role created", body = RoleInfo),
        (status = 400, description = "Invalid or duplicate role name", body = ApiError)
    )
)]
pub async fn create_role(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Json(payload): Json<CreateRole>,
) -> Result<(StatusCode, Json<RoleInfo>), ApiError> {
    auth.require_admin()?;
    let role = resources.manager.create_role(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/roles/{name}",
    tag = AUTHORIZATION_TAG,
    operation_id = "Delete Role",
    params(("name" = String, Path, description = "Role name")),
    security(("Authorization" = [])),
    responses((status = 204, description = "Role deleted"))
)]
pub async fn delete_role(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require_admin()?;
    resources.manager.delete_role(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/users/{id}/roles",
    tag = AUTHORIZATION_TAG,
    operation_id = "User Roles",
    params(("id" = String, Path, description = "User id")),
    security(("Authorization" = [])),
    responses((status = 200, description = "Role names ordered by name", body = Vec<String>))
)]
pub async fn user_roles(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    auth.require_self_or_admin(&id)?;
    Ok(Json(resources.manager.get_user_roles(&id).await?))
}

#[tracing::instrument(skip(resources, auth, payload), fields(role = %payload.role_name))]
#[utoipa::path(
    post,
    path = "/users/{id}/roles",
    tag = AUTHORIZATION_TAG,
    operation_id = "Assign User Role",
    params(("id" = String, Path, description = "User id")),
    request_body = RoleAssignment,
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Role assigned"),
        (status = 400, description = "User already in role", body = ApiError)
    )
)]
pub async fn assign_user_role(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
    Json(payload): Json<RoleAssignment>,
) -> Result<StatusCode, ApiError> {
    auth.require_admin()?;
    resources
        .manager
        .assign_user_role(&AssignRole {
            user_id: id,
            role_name: payload.role_name,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/users/{id}/roles/{role_name}",
    tag = AUTHORIZATION_TAG,
    operation_id = "Remove User Role",
    params(
        ("id" = String, Path, description = "User id"),
        ("role_name" = String, Path, description = "Role name")
    ),
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Role removed"),
        (status = 400, description = "User not in role", body = ApiError)
    )
)]
pub async fn remove_user_role(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path((id, role_name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    auth.require_admin()?;
    resources
        .manager
        .remove_user_role(&RemoveRole {
            user_id: id,
            role_name,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/users/{id}/claims",
    tag = AUTHORIZATION_TAG,
    operation_id = "User Claims",
    params(("id" = String, Path, description = "User id")),
    security(("Authorization" = [])),
    responses((status = 200, description = "Claims of the user", body = Vec<Claim>))
)]
pub async fn user_claims(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    auth.require_self_or_admin(&id)?;
    Ok(Json(resources.manager.get_user_claims(&id).await?))
}

#[tracing::instrument(skip(resources, auth, payload), fields(claim_type = %payload.claim_type))]
#[utoipa::path(
    post,
    path = "/users/{id}/claims",
    tag = AUTHORIZATION_TAG,
    operation_id = "Assign User Claim",
    params(("id" = String, Path, description = "User id")),
    request_body = ClaimAssignment,
    security(("Authorization" = [])),
    responses((status = 201, description = "Claim added", body = Claim))
)]
pub async fn assign_user_claim(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
    Json(payload): Json<ClaimAssignment>,
) -> Result<(StatusCode, Json<Claim>), ApiError> {
    auth.require_admin()?;
    let claim = resources
        .manager
        .assign_user_claim(&AssignClaim {
            id,
            claim_type: payload.claim_type,
            claim_value: payload.claim_value,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/users/{id}/claims/{claim_type}",
    tag = AUTHORIZATION_TAG,
    operation_id = "User Claim",
    params(
        ("id" = String, Path, description = "User id"),
        ("claim_type" = String, Path, description = "Claim type")
    ),
    security(("Authorization" = [])),
    responses((status = 200, description = "First claim of that type, or null", body = Option<Claim>))
)]
pub async fn user_claim(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path((id, claim_type)): Path<(String, String)>,
) -> Result<Json<Option<Claim>>, ApiError> {
    auth.require_self_or_admin(&id)?;
    Ok(Json(
        resources
            .manager
            .get_user_claim(&GetClaim { id, claim_type })
            .await?,
    ))
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/users/{id}/claims/{claim_type}",
    tag = AUTHORIZATION_TAG,
    operation_id = "Remove User Claim",
    params(
        ("id" = String, Path, description = "User id"),
        ("claim_type" = String, Path, description = "Claim type")
    ),
    security(("Authorization" = [])),
    responses((status = 200, description = "The removed claim", body = Claim))
)]
pub async fn remove_user_claim(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path((id, claim_type)): Path<(String, String)>,
) -> Result<Json<Claim>, ApiError> {
    auth.require_admin()?;
    Ok(Json(
        resources
            .manager
            .remove_user_claim(&RemoveClaim { id, claim_type })
            .await?,
    ))
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/role-claims/{id}",
    tag = AUTHORIZATION_TAG,
    operation_id = "Role Claims",
    params(("id" = String, Path, description = "Role id")),
    security(("Authorization" = [])),
    responses((status = 200, description = "Claims of the role", body = Vec<Claim>))
)]
pub async fn role_claims(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    auth.require_admin()?;
    Ok(Json(resources.manager.get_role_claims(&id).await?))
}

#[tracing::instrument(skip(resources, auth, payload), fields(claim_type = %payload.claim_type))]
#[utoipa::path(
    post,
    path = "/role-claims/{id}",
    tag = AUTHORIZATION_TAG,
    operation_id = "Assign Role Claim",
    params(("id" = String, Path, description = "Role id")),
    request_body = ClaimAssignment,
    security(("Authorization" = [])),
    responses((status = 201, description = "Claim added", body = Claim))
)]
pub async fn assign_role_claim(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path(id): Path<String>,
    Json(payload): Json<ClaimAssignment>,
) -> Result<(StatusCode, Json<Claim>), ApiError> {
    auth.require_admin()?;
    let claim = resources
        .manager
        .assign_role_claim(&AssignClaim {
            id,
            claim_type: payload.claim_type,
            claim_value: payload.claim_value,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/role-claims/{id}/{claim_type}",
    tag = AUTHORIZATION_TAG,
    operation_id = "Role Claim",
    params(
        ("id" = String, Path, description = "Role id"),
        ("claim_type" = String, Path, description = "Claim type")
    ),
    security(("Authorization" = [])),
    responses((status = 200, description = "First claim of that type, or null", body = Option<Claim>))
)]
pub async fn role_claim(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path((id, claim_type)): Path<(String, String)>,
) -> Result<Json<Option<Claim>>, ApiError> {
    auth.require_admin()?;
    Ok(Json(
        resources
            .manager
            .get_role_claim(&GetClaim { id, claim_type })
            .await?,
    ))
}

#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/role-claims/{id}/{claim_type}",
    tag = AUTHORIZATION_TAG,
    operation_id = "Remove Role Claim",
    params(
        ("id" = String, Path, description = "Role id"),
        ("claim_type" = String, Path, description = "Claim type")
    ),
    security(("Authorization" = [])),
    responses((status = 200, description = "The removed claim", body = Claim))
)]
pub async fn remove_role_claim(
    Extension(resources): Extension<AppResources>,
    auth: BearerAuth,
    Path((id, claim_type)): Path<(String, String)>,
) -> Result<Json<Claim>, ApiError> {
    auth.require_admin()?;
    Ok(Json(
        resources
            .manager
            .remove_role_claim(&RemoveClaim { id, claim_type })
            .await?,
    ))
}
