use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// A single field-level violation reported by the store or a validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub code: String,
    pub description: String,
}

impl FieldError {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn invalid_email(email: &str) -> Self {
        Self::new("InvalidEmail", format!("Email '{email}' is invalid."))
    }

    pub fn duplicate_email(email: &str) -> Self {
        Self::new("DuplicateEmail", format!("Email '{email}' is already taken."))
    }

    pub fn invalid_user_name(user_name: &str) -> Self {
        Self::new(
            "InvalidUserName",
            format!("Username '{user_name}' is invalid."),
        )
    }

    pub fn duplicate_user_name(user_name: &str) -> Self {
        Self::new(
            "DuplicateUserName",
            format!("Username '{user_name}' is already taken."),
        )
    }

    pub fn invalid_phone_number(phone: &str) -> Self {
        Self::new(
            "InvalidPhoneNumber",
            format!("Phone number '{phone}' is invalid."),
        )
    }

    pub fn duplicate_phone_number(phone: &str) -> Self {
        Self::new(
            "DuplicatePhoneNumber",
            format!("Phone number '{phone}' is already taken."),
        )
    }

    pub fn duplicate_role_name(name: &str) -> Self {
        Self::new(
            "DuplicateRoleName",
            format!("Role name '{name}' is already taken."),
        )
    }

    pub fn password_mismatch() -> Self {
        Self::new("PasswordMismatch", "Incorrect password.")
    }

    pub fn invalid_token() -> Self {
        Self::new("InvalidToken", "Invalid token.")
    }

    pub fn login_already_associated() -> Self {
        Self::new(
            "LoginAlreadyAssociated",
            "A user with this login already exists.",
        )
    }

    pub fn invalid_claim_type(claim_type: &str) -> Self {
        Self::new(
            "InvalidClaimType",
            format!("Claim type '{claim_type}' is reserved."),
        )
    }

    pub fn user_already_in_role(role: &str) -> Self {
        Self::new(
            "UserAlreadyInRole",
            format!("User already in role '{role}'."),
        )
    }

    pub fn user_not_in_role(role: &str) -> Self {
        Self::new("UserNotInRole", format!("User is not in role '{role}'."))
    }
}

/// Aggregated field errors. Collected in full, never returned on the first violation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.0.iter().any(|e| e.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected, otherwise the aggregate failure.
    pub fn into_result(self) -> Result<(), IdentityError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(IdentityError::Validation(self))
        }
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(error: FieldError) -> Self {
        Self(vec![error])
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.code, e.description))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Account is locked out")]
    LockedOut,
    #[error("Two-factor authentication required")]
    TwoFactorRequired,
    /// The store reported a sign-in outcome none of the other variants describe.
    #[error("Sign-in failed for an unrecognized reason")]
    UnknownSignInFailure,
    #[error("User already has a password set")]
    SetPasswordConflict,
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Not supported: {0}")]
    NotSupported(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("No backing store is configured")]
    StoreNotConfigured,
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    pub fn not_found(what: impl Into<String>) -> Self {
        IdentityError::NotFound(what.into())
    }
}

impl From<ValidationErrors> for IdentityError {
    fn from(errors: ValidationErrors) -> Self {
        IdentityError::Validation(errors)
    }
}

impl From<FieldError> for IdentityError {
    fn from(error: FieldError) -> Self {
        IdentityError::Validation(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_errors_are_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn all_violations_are_kept() {
        let mut errors = ValidationErrors::new();
        errors.push(FieldError::invalid_email("nope"));
        errors.push(FieldError::duplicate_user_name("bob"));

        let Err(IdentityError::Validation(errors)) = errors.into_result() else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.0.len(), 2);
        assert!(errors.has_code("InvalidEmail"));
        assert!(errors.has_code("DuplicateUserName"));
        assert!(errors.to_string().contains("InvalidEmail"));
    }
}
