use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Application id used when a request does not name one.
pub const DEFAULT_APP_ID: &str = "Default";

/// Role granted to the transient administrator.
pub const ADMINISTRATOR: &str = "ADMINISTRATOR";

/// Login provider name under which refresh tokens are stored.
pub const REFRESH_TOKEN_PROVIDER: &str = "Bearer";

/// Claim names written by the codec itself.
pub mod claim_types {
    pub const APP_ID: &str = "appId";
    pub const JWT_ID: &str = "jti";
    pub const SUBJECT: &str = "sub";
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const EXTERNAL_PROVIDER_NAME: &str = "externalProviderName";
    pub const EXTERNAL_PROVIDER_TOKEN: &str = "externalProviderToken";
    pub const EXTERNAL_PROVIDER_REFRESH_TOKEN: &str = "externalProviderRefreshToken";
    pub const ROLE: &str = "role";

    pub const ISSUER: &str = "iss";
    pub const AUDIENCE: &str = "aud";
    pub const EXPIRES: &str = "exp";
    pub const NOT_BEFORE: &str = "nbf";
    pub const ISSUED_AT: &str = "iat";

    /// Names a caller-supplied claim may never take.
    pub const RESERVED: &[&str] = &[
        APP_ID,
        JWT_ID,
        SUBJECT,
        NAME,
        EMAIL,
        EXTERNAL_PROVIDER_NAME,
        EXTERNAL_PROVIDER_TOKEN,
        EXTERNAL_PROVIDER_REFRESH_TOKEN,
        ISSUER,
        AUDIENCE,
        EXPIRES,
        NOT_BEFORE,
        ISSUED_AT,
    ];

    pub fn is_reserved(claim_type: &str) -> bool {
        RESERVED.contains(&claim_type)
    }

    /// Whether a caller may store or attach a claim of this type. Roles only
    /// come from role membership.
    pub fn is_free_form(claim_type: &str) -> bool {
        claim_type != ROLE && !is_reserved(claim_type)
    }
}

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::new(claim_types::ROLE, name)
    }

    pub fn is_role(&self) -> bool {
        self.claim_type == claim_types::ROLE
    }
}

/// Everything that goes into one access token. Built per issuance, never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessTokenData {
    pub app_id: String,
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    pub external_provider_name: Option<String>,
    pub external_provider_token: Option<String>,
    pub external_provider_refresh_token: Option<String>,
    /// Role claims and free-form claims. Duplicates collapse.
    pub claims: BTreeSet<Claim>,
}

impl AccessTokenData {
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.claims
            .iter()
            .filter(|c| c.is_role())
            .map(|c| c.value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RefreshToken {
    pub app_id: String,
    pub user_id: String,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessToken {
    pub app_id: String,
    pub user_id: String,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
    pub refresh_token: Option<RefreshToken>,
}

/// Identity recovered from a validated access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub app_id: String,
    pub subject: String,
    pub jwt_id: String,
    pub name: String,
    pub email: String,
    pub external_provider_name: Option<String>,
    pub external_provider_token: Option<String>,
    pub external_provider_refresh_token: Option<String>,
    pub claims: BTreeSet<Claim>,
    pub expires_at: OffsetDateTime,
}

impl Principal {
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.claims
            .iter()
            .filter(|c| c.is_role())
            .map(|c| c.value.as_str())
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles().any(|r| r == role)
    }
}
