//! Refresh tokens, one row per (user, login provider, application).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "identity_user_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub login_provider: String,
    /// Application id the token was issued for
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub value: String,
    pub expire_at: OffsetDateTime,
}

impl Model {
    pub fn is_expired(&self) -> bool {
        self.expire_at <= OffsetDateTime::now_utc()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::identity_user::Entity",
        from = "Column::UserId",
        to = "super::identity_user::Column::Id"
    )]
    User,
}

impl Related<super::identity_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
