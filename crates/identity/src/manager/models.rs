//! Request objects accepted by [`super::IdentityManager`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::external::{ExternalLoginData, ExternalLoginRequest, LoginGrant};
use crate::token::DEFAULT_APP_ID;

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct LogIn {
    pub username: String,
    pub password: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub is_refreshable: bool,
    /// Roles added to this token only.
    #[serde(default)]
    pub transient_roles: Vec<String>,
    /// Claims added to this token only.
    #[serde(default)]
    pub transient_claims: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct LogInExternal {
    pub provider: String,
    pub grant: LoginGrant,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub is_refreshable: bool,
    #[serde(default)]
    pub transient_roles: Vec<String>,
    #[serde(default)]
    pub transient_claims: BTreeMap<String, String>,
}

impl LogInExternal {
    pub fn external_request(&self) -> ExternalLoginRequest {
        ExternalLoginRequest {
            provider: self.provider.clone(),
            grant: self.grant.clone(),
        }
    }
}

/// External sign-in with identity data that was already resolved.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct LogInExternalDirect {
    pub external_login_data: ExternalLoginData,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub is_refreshable: bool,
    #[serde(default)]
    pub transient_roles: Vec<String>,
    #[serde(default)]
    pub transient_claims: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct LogInRefresh {
    /// The previous access token. It may be expired.
    pub token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub transient_roles: Vec<String>,
    #[serde(default)]
    pub transient_claims: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SignUp {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SignUpExternal {
    pub provider: String,
    pub grant: LoginGrant,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SignOut {
    pub user_id: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct RemoveExternalLogin {
    pub user_id: String,
    pub provider: String,
    pub provider_key: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SetUsername {
    pub user_id: String,
    pub new_username: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SetPassword {
    pub user_id: String,
    pub new_password: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ResetPassword {
    pub email: String,
    pub token: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ChangePassword {
    pub user_id: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ChangeEmail {
    pub user_id: String,
    pub new_email: String,
    pub token: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ConfirmEmail {
    pub email: String,
    pub token: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ChangePhoneNumber {
    pub user_id: String,
    pub new_phone_number: String,
    pub token: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ConfirmPhoneNumber {
    pub phone_number: String,
    pub token: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct AssignRole {
    pub user_id: String,
    pub role_name: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct RemoveRole {
    pub user_id: String,
    pub role_name: String,
}

/// Claim lookup on a user or a role, depending on the operation.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct GetClaim {
    pub id: String,
    pub claim_type: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct AssignClaim {
    pub id: String,
    pub claim_type: String,
    pub claim_value: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct RemoveClaim {
    pub id: String,
    pub claim_type: String,
}

/// Public view of a stored user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub phone_number: Option<String>,
    pub phone_number_confirmed: bool,
    pub is_active: bool,
}

impl From<crate::entity::identity_user::Model> for UserInfo {
    fn from(user: crate::entity::identity_user::Model) -> Self {
        Self {
            id: user.id,
            username: user.user_name,
            email: user.email,
            email_confirmed: user.email_confirmed,
            phone_number: user.phone_number,
            phone_number_confirmed: user.phone_number_confirmed,
            is_active: user.is_active,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleInfo {
    pub id: String,
    pub name: String,
}

impl From<crate::entity::identity_role::Model> for RoleInfo {
    fn from(role: crate::entity::identity_role::Model) -> Self {
        Self {
            id: role.id,
            name: role.name,
        }
    }
}
