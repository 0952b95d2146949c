//! Free-form claims attached to a role.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "identity_role_claim")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub role_id: String,
    pub claim_type: String,
    #[sea_orm(column_type = "Text")]
    pub claim_value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::identity_role::Entity",
        from = "Column::RoleId",
        to = "super::identity_role::Column::Id"
    )]
    Role,
}

impl Related<super::identity_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Role.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
