use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};

use super::{IdentityStore, normalize};
use crate::entity::{identity_role, identity_role_claim, identity_user_role};
use crate::error::{FieldError, IdentityError, ValidationErrors};
use crate::token::Claim;

impl IdentityStore {
    /// All roles ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn get_roles(&self) -> Result<Vec<identity_role::Model>, DbErr> {
        identity_role::Entity::find()
            .order_by_asc(identity_role::Column::Name)
            .all(self.db())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_role_by_name(&self, name: &str) -> Result<Option<identity_role::Model>, DbErr> {
        identity_role::Entity::find()
            .filter(identity_role::Column::NormalizedName.eq(normalize(name)))
            .one(self.db())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_role_by_id(&self, id: &str) -> Result<Option<identity_role::Model>, DbErr> {
        identity_role::Entity::find_by_id(id.to_string())
            .one(self.db())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_role(&self, name: &str) -> Result<identity_role::Model, IdentityError> {
        if name.trim().is_empty() {
            return Err(FieldError::new("InvalidRoleName", "Role name is invalid.").into());
        }
        if self.find_role_by_name(name).await?.is_some() {
            return Err(FieldError::duplicate_role_name(name).into());
        }
        let role = identity_role::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            normalized_name: Set(normalize(name)),
        }
        .insert(self.db())
        .await?;
        tracing::info!(role = %role.name, "Created role");
        Ok(role)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_role(&self, name: &str) -> Result<(), IdentityError> {
        let role = self
            .find_role_by_name(name)
            .await?
            .ok_or_else(|| IdentityError::not_found(format!("role {name}")))?;

        let txn = self.db().begin().await?;
        identity_user_role::Entity::delete_many()
            .filter(identity_user_role::Column::RoleId.eq(role.id.as_str()))
            .exec(&txn)
            .await?;
        identity_role_claim::Entity::delete_many()
            .filter(identity_role_claim::Column::RoleId.eq(role.id.as_str()))
            .exec(&txn)
            .await?;
        identity_role::Entity::delete_by_id(role.id.clone())
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    /// Role names of a user, ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_roles(&self, user_id: &str) -> Result<Vec<String>, DbErr> {
        let role_ids: Vec<String> = identity_user_role::Entity::find()
            .filter(identity_user_role::Column::UserId.eq(user_id))
            .all(self.db())
            .await?
            .into_iter()
            .map(|row| row.role_id)
            .collect();
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let roles = identity_role::Entity::find()
            .filter(identity_role::Column::Id.is_in(role_ids))
            .order_by_asc(identity_role::Column::Name)
            .all(self.db())
            .await?;
        Ok(roles.into_iter().map(|role| role.name).collect())
    }

    /// Add a user to several roles. Fails without changes if any role is unknown
    /// or already assigned.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_roles(&self, user_id: &str, roles: &[String]) -> Result<(), IdentityError> {
        let mut errors = ValidationErrors::new();
        let mut role_ids = Vec::with_capacity(roles.len());
        for name in roles {
            let role = self
                .find_role_by_name(name)
                .await?
                .ok_or_else(|| IdentityError::not_found(format!("role {name}")))?;
            let assigned = identity_user_role::Entity::find_by_id((
                user_id.to_string(),
                role.id.clone(),
            ))
            .one(self.db())
            .await?
            .is_some();
            if assigned {
                errors.push(FieldError::user_already_in_role(name));
            } else if !role_ids.contains(&role.id) {
                role_ids.push(role.id);
            }
        }
        errors.into_result()?;

        let txn = self.db().begin().await?;
        for role_id in role_ids {
            identity_user_role::ActiveModel {
                user_id: Set(user_id.to_string()),
                role_id: Set(role_id),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_from_role(&self, user_id: &str, role: &str) -> Result<(), IdentityError> {
        let role_model = self
            .find_role_by_name(role)
            .await?
            .ok_or_else(|| IdentityError::not_found(format!("role {role}")))?;
        let result = identity_user_role::Entity::delete_by_id((user_id.to_string(), role_model.id))
            .exec(self.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(FieldError::user_not_in_role(role).into());
        }
        Ok(())
    }

    /// Claims attached to the given roles, in insertion order.
    #[tracing::instrument(skip(self))]
    pub async fn get_role_claims(&self, role_ids: &[String]) -> Result<Vec<Claim>, DbErr> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = identity_role_claim::Entity::find()
            .filter(identity_role_claim::Column::RoleId.is_in(role_ids.iter().cloned()))
            .order_by_asc(identity_role_claim::Column::Id)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Claim::new(row.claim_type, row.claim_value))
            .collect())
    }

    /// First claim of the given type on a role.
    #[tracing::instrument(skip(self))]
    pub async fn find_role_claim(
        &self,
        role_id: &str,
        claim_type: &str,
    ) -> Result<Option<identity_role_claim::Model>, DbErr> {
        identity_role_claim::Entity::find()
            .filter(identity_role_claim::Column::RoleId.eq(role_id))
            .filter(identity_role_claim::Column::ClaimType.eq(claim_type))
            .order_by_asc(identity_role_claim::Column::Id)
            .one(self.db())
            .await
    }

    #[tracing::instrument(skip(self, claim))]
    pub async fn add_role_claim(
        &self,
        role_id: &str,
        claim: &Claim,
    ) -> Result<identity_role_claim::Model, DbErr> {
        identity_role_claim::ActiveModel {
            role_id: Set(role_id.to_string()),
            claim_type: Set(claim.claim_type.clone()),
            claim_value: Set(claim.value.clone()),
            ..Default::default()
        }
        .insert(self.db())
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_role_claim(
        &self,
        role_id: &str,
        claim_type: &str,
    ) -> Result<Option<Claim>, DbErr> {
        let Some(row) = self.find_role_claim(role_id, claim_type).await? else {
            return Ok(None);
        };
        identity_role_claim::Entity::delete_by_id(row.id)
            .exec(self.db())
            .await?;
        Ok(Some(Claim::new(row.claim_type, row.claim_value)))
    }
}
