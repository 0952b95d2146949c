//! OpenAPI/Utoipa configuration.

use crate::api::{ACCOUNT_TAG, AUTHORIZATION_TAG, IDENTITY_TAG, MISC_TAG};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Registers the bearer scheme referenced by protected endpoints.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some(
                    "Access token obtained from `/api/identity/login` or one of the other sign-in endpoints.",
                ))
                .build();
            components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Identity API",
        version = "0.1.0",
        description = "Sign-in, token refresh, account recovery and authorization management."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = IDENTITY_TAG, description = "Sign-in, sign-up and sign-out"),
        (name = ACCOUNT_TAG, description = "Account maintenance and recovery"),
        (name = AUTHORIZATION_TAG, description = "Roles and claims")
    )
)]
pub struct ApiDoc;
