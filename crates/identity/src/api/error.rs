//! JSON error body returned by every endpoint.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{FieldError, IdentityError};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code, e.g. `unauthorized` or `validation_failed`
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Field errors of a validation failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldErrorBody>,
    #[serde(skip)]
    status: u16,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FieldErrorBody {
    pub code: String,
    pub description: String,
}

impl From<FieldError> for FieldErrorBody {
    fn from(error: FieldError) -> Self {
        Self {
            code: error.code,
            description: error.description,
        }
    }
}

impl ApiError {
    fn new(status: StatusCode, error: &str, description: Option<String>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description,
            errors: Vec::new(),
            status: status.as_u16(),
        }
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            Some(description.into()),
        )
    }

    pub fn forbidden(description: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", Some(description.into()))
    }

    pub fn server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", None)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<IdentityError> for ApiError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::Unauthorized => {
                Self::new(StatusCode::UNAUTHORIZED, "unauthorized", None)
            }
            IdentityError::LockedOut => Self::new(
                StatusCode::FORBIDDEN,
                "locked_out",
                Some("The account is locked out".into()),
            ),
            IdentityError::TwoFactorRequired => Self::new(
                StatusCode::UNAUTHORIZED,
                "two_factor_required",
                Some("Two-factor authentication is required".into()),
            ),
            IdentityError::UnknownSignInFailure => {
                Self::new(StatusCode::UNAUTHORIZED, "sign_in_failed", None)
            }
            IdentityError::SetPasswordConflict => Self::new(
                StatusCode::CONFLICT,
                "password_already_set",
                Some("The user already has a password".into()),
            ),
            IdentityError::Validation(errors) => {
                let mut body = Self::new(
                    StatusCode::BAD_REQUEST,
                    "validation_failed",
                    Some(errors.to_string()),
                );
                body.errors = errors.0.into_iter().map(FieldErrorBody::from).collect();
                body
            }
            IdentityError::NotSupported(what) => Self::new(
                StatusCode::BAD_REQUEST,
                "not_supported",
                Some(format!("{what} is not supported")),
            ),
            IdentityError::Cancelled => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "cancelled",
                Some("The request was cancelled".into()),
            ),
            IdentityError::StoreNotConfigured => Self::new(
                StatusCode::NOT_IMPLEMENTED,
                "store_not_configured",
                Some("No user store is configured".into()),
            ),
            IdentityError::NotFound(_)
            | IdentityError::Database(_)
            | IdentityError::Internal(_) => {
                tracing::error!(error = %error, "Identity operation failed");
                Self::server_error()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
