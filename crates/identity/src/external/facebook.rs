//! Facebook login: the user access token is checked with the debug endpoint
//! before the profile is read.

use serde::Deserialize;

use super::{ExternalLoginData, ExternalLoginTokenData, ProviderError, ProviderKind, read_body};
use crate::config::FacebookConfig;

const PROFILE_FIELDS: &str = "id,name,address,email,birthday";

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DebugTokenData {
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    is_valid: bool,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DebugTokenResponse {
    #[serde(default)]
    data: Option<DebugTokenData>,
    #[serde(default)]
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    error: Option<GraphError>,
}

fn parse<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

pub(crate) async fn resolve(
    http: &reqwest::Client,
    config: &FacebookConfig,
    access_token: &str,
) -> Result<ExternalLoginData, ProviderError> {
    let app_token = format!("{}|{}", config.app_id, config.app_secret);
    let graph = config.graph_url.trim_end_matches('/');

    let body = read_body(
        http.get(format!("{graph}/debug_token"))
            .query(&[("input_token", access_token), ("access_token", app_token.as_str())])
            .send()
            .await?,
    )
    .await?;
    let debug: DebugTokenResponse = parse(&body)?;
    if let Some(error) = debug.error {
        tracing::warn!(message = ?error.message, "Facebook debug_token returned an error");
        return Err(ProviderError::ProviderReported(body));
    }
    let data = debug
        .data
        .ok_or_else(|| ProviderError::InvalidResponse("debug_token has no data".into()))?;
    if !data.is_valid {
        return Err(ProviderError::Rejected("access token is not valid".into()));
    }
    if data.app_id.as_deref() != Some(config.app_id.as_str()) {
        return Err(ProviderError::Rejected(
            "access token was issued for another app".into(),
        ));
    }
    let user_id = data
        .user_id
        .ok_or_else(|| ProviderError::InvalidResponse("debug_token has no user_id".into()))?;

    let body = read_body(
        http.get(format!("{graph}/{user_id}"))
            .query(&[("fields", PROFILE_FIELDS), ("access_token", access_token)])
            .send()
            .await?,
    )
    .await?;
    let profile: Profile = parse(&body)?;
    if profile.error.is_some() {
        return Err(ProviderError::ProviderReported(body));
    }

    Ok(ExternalLoginData {
        id: profile.id.unwrap_or(user_id),
        name: profile.name,
        email: profile.email,
        external_token: ExternalLoginTokenData {
            name: ProviderKind::Facebook.name().to_string(),
            token: access_token.to_string(),
            refresh_token: None,
        },
    })
}
