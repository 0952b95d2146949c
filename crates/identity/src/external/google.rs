//! Google sign-in: ID tokens verified against Google's published key set.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use super::{ExternalLoginData, ExternalLoginTokenData, ProviderError, ProviderKind, read_body};
use crate::config::GoogleConfig;

const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Deserialize)]
struct GoogleIdTokenPayload {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

pub(crate) async fn resolve(
    http: &reqwest::Client,
    config: &GoogleConfig,
    id_token: &str,
) -> Result<ExternalLoginData, ProviderError> {
    let header = decode_header(id_token)
        .map_err(|e| ProviderError::Rejected(format!("invalid id token header: {e}")))?;
    let kid = header
        .kid
        .ok_or_else(|| ProviderError::Rejected("id token has no kid".into()))?;

    let body = read_body(http.get(&config.certs_url).send().await?).await?;
    let jwks: JwkSet = serde_json::from_str(&body)
        .map_err(|e| ProviderError::InvalidResponse(format!("invalid key set: {e}")))?;
    let jwk = jwks
        .find(&kid)
        .ok_or_else(|| ProviderError::Rejected(format!("unknown signing key {kid}")))?;
    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| ProviderError::InvalidResponse(format!("unusable signing key: {e}")))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[config.client_id.as_str()]);
    validation.set_issuer(&ISSUERS);

    let payload = decode::<GoogleIdTokenPayload>(id_token, &key, &validation)
        .map_err(|e| ProviderError::Rejected(format!("id token validation failed: {e}")))?
        .claims;

    Ok(ExternalLoginData {
        id: payload.sub,
        name: payload.name,
        email: payload.email,
        external_token: ExternalLoginTokenData {
            name: ProviderKind::Google.name().to_string(),
            token: id_token.to_string(),
            refresh_token: None,
        },
    })
}
