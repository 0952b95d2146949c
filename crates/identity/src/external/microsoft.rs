//! Microsoft identity platform: authorization-code exchange and refresh
//! against the tenant-scoped v2.0 token endpoint.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::multipart::Form;
use serde::Deserialize;

use super::{ExternalLoginData, ExternalLoginTokenData, ProviderError, ProviderKind};
use crate::config::MicrosoftConfig;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Claims read from the access token payload. The signature is not checked here;
/// the token was just received from the token endpoint over TLS.
#[derive(Debug, Deserialize)]
struct AccessTokenPayload {
    oid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    upn: Option<String>,
}

fn token_url(config: &MicrosoftConfig) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        config.login_url.trim_end_matches('/'),
        config.tenant_id
    )
}

fn base_form(config: &MicrosoftConfig, grant_type: &'static str) -> Form {
    Form::new()
        .text("client_id", config.client_id.clone())
        .text("client_secret", config.client_secret.clone())
        .text("grant_type", grant_type)
}

async fn post_token_request(
    http: &reqwest::Client,
    config: &MicrosoftConfig,
    form: Form,
) -> Result<TokenResponse, ProviderError> {
    let response = http.post(token_url(config)).multipart(form).send().await?;
    let status = response.status();
    let body = response.text().await?;

    let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();
    match parsed {
        Some(token) if token.error.is_some() => Err(ProviderError::ProviderReported(body)),
        Some(token) if status.is_success() => Ok(token),
        _ => Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

fn decode_payload(access_token: &str) -> Result<AccessTokenPayload, ProviderError> {
    let segment = access_token
        .split('.')
        .nth(1)
        .ok_or_else(|| ProviderError::InvalidResponse("access token is not a JWT".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| ProviderError::InvalidResponse(format!("access token payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::InvalidResponse(format!("access token claims: {e}")))
}

pub(crate) async fn resolve(
    http: &reqwest::Client,
    config: &MicrosoftConfig,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<ExternalLoginData, ProviderError> {
    let form = base_form(config, "authorization_code")
        .text("code", code.to_string())
        .text("code_verifier", code_verifier.to_string())
        .text("redirect_uri", redirect_uri.to_string())
        .text("scope", config.scopes.join(" "));

    let token = post_token_request(http, config, form).await?;
    let access_token = token
        .access_token
        .ok_or_else(|| ProviderError::InvalidResponse("no access_token in response".into()))?;
    let payload = decode_payload(&access_token)?;

    Ok(ExternalLoginData {
        id: payload.oid,
        name: payload.name,
        email: payload.upn,
        external_token: ExternalLoginTokenData {
            name: ProviderKind::Microsoft.name().to_string(),
            token: access_token,
            refresh_token: token.refresh_token,
        },
    })
}

pub(crate) async fn refresh(
    http: &reqwest::Client,
    config: &MicrosoftConfig,
    refresh_token: &str,
) -> Result<ExternalLoginTokenData, ProviderError> {
    let form = base_form(config, "refresh_token")
        .text("refresh_token", refresh_token.to_string())
        .text("scope", config.scopes.join(" "));

    let token = post_token_request(http, config, form).await?;
    let access_token = token
        .access_token
        .ok_or_else(|| ProviderError::InvalidResponse("no access_token in response".into()))?;

    Ok(ExternalLoginTokenData {
        name: ProviderKind::Microsoft.name().to_string(),
        token: access_token,
        refresh_token: token.refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_read_without_verification() {
        let claims = serde_json::json!({"oid": "abc", "name": "Ada", "upn": "ada@contoso.com"});
        let segment = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("json"));
        let payload = decode_payload(&format!("e30.{segment}.sig")).expect("payload");
        assert_eq!(payload.oid, "abc");
        assert_eq!(payload.upn.as_deref(), Some("ada@contoso.com"));
    }

    #[test]
    fn opaque_tokens_are_rejected() {
        assert!(matches!(
            decode_payload("opaque"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn token_url_is_tenant_scoped() {
        let config = MicrosoftConfig {
            tenant_id: "contoso".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            scopes: vec![],
            login_url: "https://login.example/".into(),
        };
        assert_eq!(
            token_url(&config),
            "https://login.example/contoso/oauth2/v2.0/token"
        );
    }
}
