//! Identity user entity - local accounts with credential and lockout state.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "identity_user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_name: String,
    #[sea_orm(unique)]
    pub normalized_user_name: String,
    pub email: Option<String>,
    pub normalized_email: Option<String>,
    pub email_confirmed: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub phone_number: Option<String>,
    pub phone_number_confirmed: bool,
    pub two_factor_enabled: bool,
    pub lockout_enabled: bool,
    pub lockout_end: Option<OffsetDateTime>,
    pub access_failed_count: i32,
    /// Deactivated accounts are kept but can no longer sign in
    pub is_active: bool,
    pub created_at: OffsetDateTime,
}

impl Model {
    /// Whether the account is currently locked out.
    pub fn is_locked_out(&self) -> bool {
        self.lockout_enabled
            && self
                .lockout_end
                .is_some_and(|end| end > OffsetDateTime::now_utc())
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::identity_user_claim::Entity")]
    Claims,
    #[sea_orm(has_many = "super::identity_user_login::Entity")]
    Logins,
    #[sea_orm(has_many = "super::identity_user_token::Entity")]
    Tokens,
}

impl Related<super::identity_user_claim::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Claims.def()
    }
}

impl Related<super::identity_user_login::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Logins.def()
    }
}

impl Related<super::identity_user_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
