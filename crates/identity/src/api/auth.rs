//! Bearer token extractor for the identity API.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::AppResources;
use crate::api::error::ApiError;
use crate::token::{ADMINISTRATOR, Principal};

/// Axum extractor that validates `Authorization: Bearer <jwt>` against the
/// token codec.
///
/// ```ignore
/// async fn handler(BearerAuth(principal): BearerAuth) -> String {
///     principal.subject
/// }
/// ```
pub struct BearerAuth(pub Principal);

impl BearerAuth {
    /// Reject unless the caller holds the administrator role.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.is_in_role(ADMINISTRATOR) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Administrator role required"))
        }
    }

    /// Reject unless the caller is the user in question or an administrator.
    pub fn require_self_or_admin(&self, user_id: &str) -> Result<(), ApiError> {
        if self.0.subject == user_id || self.0.is_in_role(ADMINISTRATOR) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Not allowed to act on this user"))
        }
    }
}

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = parts
            .extensions
            .get::<AppResources>()
            .cloned()
            .ok_or_else(|| {
                tracing::error!("AppResources not found in extensions");
                ApiError::server_error()
            })?;

        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());

        let token = match header {
            Some(header) if header.starts_with("Bearer ") => &header[7..],
            Some(_) => {
                return Err(ApiError::invalid_token(
                    "Authorization header must use Bearer scheme",
                ));
            }
            None => return Err(ApiError::invalid_token("Missing Authorization header")),
        };

        let principal = resources.manager.codec().validate(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            ApiError::invalid_token(e.to_string())
        })?;

        Ok(BearerAuth(principal))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::token::Claim;
    use axum::http::StatusCode;
    use time::OffsetDateTime;

    fn principal(subject: &str, roles: &[&str]) -> BearerAuth {
        BearerAuth(Principal {
            app_id: "Default".into(),
            subject: subject.into(),
            jwt_id: "jti".into(),
            name: "alice".into(),
            email: "alice@example.com".into(),
            external_provider_name: None,
            external_provider_token: None,
            external_provider_refresh_token: None,
            claims: roles.iter().map(|r| Claim::role(*r)).collect::<BTreeSet<_>>(),
            expires_at: OffsetDateTime::now_utc(),
        })
    }

    #[test]
    fn admin_may_act_on_anyone() {
        let admin = principal("a", &[ADMINISTRATOR]);
        assert!(admin.require_admin().is_ok());
        assert!(admin.require_self_or_admin("b").is_ok());
    }

    #[test]
    fn users_may_only_act_on_themselves() {
        let user = principal("a", &["reader"]);
        assert!(user.require_self_or_admin("a").is_ok());
        let rejected = user.require_self_or_admin("b").unwrap_err();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
        assert!(user.require_admin().is_err());
    }
}
