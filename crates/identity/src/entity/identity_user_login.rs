//! External provider logins linked to a user.
//!
//! An external identity is uniquely keyed by `(login_provider, provider_key)`,
//! where the provider key is the subject id reported by the provider.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "identity_user_login")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub login_provider: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub provider_key: String,
    pub provider_display_name: Option<String>,
    pub user_id: String,
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
