//! Role and claim maintenance for users and roles.

use super::{
    AssignClaim, AssignRole, GetClaim, IdentityManager, RemoveClaim, RemoveRole, RoleInfo,
    check_claim_types,
};
use crate::error::IdentityError;
use crate::token::Claim;

impl IdentityManager {
    /// All roles, ordered by name.
    pub async fn get_roles(&self) -> Result<Vec<RoleInfo>, IdentityError> {
        Ok(self
            .store()?
            .get_roles()
            .await?
            .into_iter()
            .map(RoleInfo::from)
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_role(&self, name: &str) -> Result<RoleInfo, IdentityError> {
        Ok(self.store()?.create_role(name).await?.into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_role(&self, name: &str) -> Result<(), IdentityError> {
        self.store()?.delete_role(name).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_roles(&self, user_id: &str) -> Result<Vec<String>, IdentityError> {
        let user = self.user_by_id(user_id).await?;
        Ok(self.store()?.get_user_roles(&user.id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn assign_user_role(&self, request: &AssignRole) -> Result<(), IdentityError> {
        let user = self.user_by_id(&request.user_id).await?;
        self.store()?
            .add_to_roles(&user.id, std::slice::from_ref(&request.role_name))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_user_role(&self, request: &RemoveRole) -> Result<(), IdentityError> {
        let user = self.user_by_id(&request.user_id).await?;
        self.store()?
            .remove_from_role(&user.id, &request.role_name)
            .await
    }

    /// First claim of the type on the user. Claims are not unique by type.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_claim(&self, request: &GetClaim) -> Result<Option<Claim>, IdentityError> {
        let user = self.user_by_id(&request.id).await?;
        Ok(self
            .store()?
            .find_user_claim(&user.id, &request.claim_type)
            .await?
            .map(|row| Claim::new(row.claim_type, row.claim_value)))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_claims(&self, user_id: &str) -> Result<Vec<Claim>, IdentityError> {
        let user = self.user_by_id(user_id).await?;
        Ok(self.store()?.get_user_claims(&user.id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn assign_user_claim(&self, request: &AssignClaim) -> Result<Claim, IdentityError> {
        check_claim_types([request.claim_type.as_str()])?;
        let user = self.user_by_id(&request.id).await?;
        let row = self
            .store()?
            .add_user_claim(
                &user.id,
                &Claim::new(request.claim_type.clone(), request.claim_value.clone()),
            )
            .await?;
        Ok(Claim::new(row.claim_type, row.claim_value))
    }

    /// Remove the first claim of the type from the user.
    #[tracing::instrument(skip(self))]
    pub async fn remove_user_claim(&self, request: &RemoveClaim) -> Result<Claim, IdentityError> {
        let user = self.user_by_id(&request.id).await?;
        self.store()?
            .remove_user_claim(&user.id, &request.claim_type)
            .await?
            .ok_or_else(|| IdentityError::not_found(format!("claim {}", request.claim_type)))
    }

    async fn role_by_id(
        &self,
        role_id: &str,
    ) -> Result<crate::entity::identity_role::Model, IdentityError> {
        self.store()?
            .find_role_by_id(role_id)
            .await?
            .ok_or_else(|| IdentityError::not_found(format!("role {role_id}")))
    }

    /// First claim of the type on the role.
    #[tracing::instrument(skip(self))]
    pub async fn get_role_claim(&self, request: &GetClaim) -> Result<Option<Claim>, IdentityError> {
        let role = self.role_by_id(&request.id).await?;
        Ok(self
            .store()?
            .find_role_claim(&role.id, &request.claim_type)
            .await?
            .map(|row| Claim::new(row.claim_type, row.claim_value)))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_role_claims(&self, role_id: &str) -> Result<Vec<Claim>, IdentityError> {
        let role = self.role_by_id(role_id).await?;
        Ok(self
            .store()?
            .get_role_claims(std::slice::from_ref(&role.id))
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn assign_role_claim(&self, request: &AssignClaim) -> Result<Claim, IdentityError> {
        check_claim_types([request.claim_type.as_str()])?;
        let role = self.role_by_id(&request.id).await?;
        let row = self
            .store()?
            .add_role_claim(
                &role.id,
                &Claim::new(request.claim_type.clone(), request.claim_value.clone()),
            )
            .await?;
        Ok(Claim::new(row.claim_type, row.claim_value))
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_role_claim(&self, request: &RemoveClaim) -> Result<Claim, IdentityError> {
        let role = self.role_by_id(&request.id).await?;
        self.store()?
            .remove_role_claim(&role.id, &request.claim_type)
            .await?
            .ok_or_else(|| IdentityError::not_found(format!("claim {}", request.claim_type)))
    }
}
