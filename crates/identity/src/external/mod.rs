//! External login providers normalised into [`ExternalLoginData`].
//!
//! Each provider is one variant of [`ProviderKind`] with its own handler module.
//! Dispatch is closed: an unknown name or a grant the provider does not accept
//! fails with [`ProviderError::NotSupported`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::config::ExternalLoginsConfig;

pub mod facebook;
pub mod google;
pub mod microsoft;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("provider rejected the credential: {0}")]
    Rejected(String),
    #[error("provider returned an error: {0}")]
    ProviderReported(String),
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Google,
    Facebook,
    Microsoft,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Google,
        ProviderKind::Facebook,
        ProviderKind::Microsoft,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google",
            ProviderKind::Facebook => "Facebook",
            ProviderKind::Microsoft => "Microsoft",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google",
            ProviderKind::Facebook => "Facebook",
            ProviderKind::Microsoft => "Microsoft Account",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProviderError::NotSupported(s.to_string()))
    }
}

/// Credential presented by the client for an external login.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoginGrant {
    /// A token obtained client-side (Google ID token, Facebook access token).
    Implicit { access_token: String },
    /// An authorization code to exchange server-side, with its PKCE verifier.
    AuthorizationCode {
        code: String,
        code_verifier: String,
        redirect_uri: String,
    },
}

impl LoginGrant {
    fn name(&self) -> &'static str {
        match self {
            LoginGrant::Implicit { .. } => "implicit",
            LoginGrant::AuthorizationCode { .. } => "authorization_code",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExternalLoginRequest {
    pub provider: String,
    pub grant: LoginGrant,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExternalLoginTokenData {
    /// Provider name, e.g. `Microsoft`.
    pub name: String,
    pub token: String,
    pub refresh_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExternalLoginData {
    /// Subject id at the provider.
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub external_token: ExternalLoginTokenData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExternalProviderInfo {
    pub name: String,
    pub display_name: String,
}

/// Resolves external credentials against the configured providers.
#[derive(Clone, Debug)]
pub struct ExternalProviders {
    http: reqwest::Client,
    config: ExternalLoginsConfig,
}

impl ExternalProviders {
    pub fn new(config: ExternalLoginsConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: ExternalLoginsConfig) -> Self {
        Self { http, config }
    }

    fn is_configured(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Google => self.config.google.is_some(),
            ProviderKind::Facebook => self.config.facebook.is_some(),
            ProviderKind::Microsoft => self.config.microsoft.is_some(),
        }
    }

    pub fn configured_providers(&self) -> Vec<ExternalProviderInfo> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.is_configured(*kind))
            .map(|kind| ExternalProviderInfo {
                name: kind.name().to_string(),
                display_name: kind.display_name().to_string(),
            })
            .collect()
    }

    /// Validate or exchange the presented credential and return the provider identity.
    #[tracing::instrument(skip(self, request, cancel), fields(provider = %request.provider))]
    pub async fn resolve(
        &self,
        request: &ExternalLoginRequest,
        cancel: &CancellationToken,
    ) -> Result<ExternalLoginData, ProviderError> {
        let kind: ProviderKind = request.provider.parse()?;
        let unsupported =
            || ProviderError::NotSupported(format!("{}/{}", kind.name(), request.grant.name()));

        let work = async {
            match (kind, &request.grant) {
                (ProviderKind::Google, LoginGrant::Implicit { access_token }) => {
                    let config = self.config.google.as_ref().ok_or_else(unsupported)?;
                    google::resolve(&self.http, config, access_token).await
                }
                (ProviderKind::Facebook, LoginGrant::Implicit { access_token }) => {
                    let config = self.config.facebook.as_ref().ok_or_else(unsupported)?;
                    facebook::resolve(&self.http, config, access_token).await
                }
                (
                    ProviderKind::Microsoft,
                    LoginGrant::AuthorizationCode {
                        code,
                        code_verifier,
                        redirect_uri,
                    },
                ) => {
                    let config = self.config.microsoft.as_ref().ok_or_else(unsupported)?;
                    microsoft::resolve(&self.http, config, code, code_verifier, redirect_uri).await
                }
                _ => Err(unsupported()),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = work => result,
        }
    }

    /// Exchange a provider refresh token.
    ///
    /// Returns `None` when there is nothing to refresh or the provider does not
    /// issue refresh tokens.
    #[tracing::instrument(skip(self, refresh_token, cancel))]
    pub async fn refresh_provider_token(
        &self,
        provider_name: &str,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ExternalLoginTokenData>, ProviderError> {
        if provider_name.is_empty() || refresh_token.is_empty() {
            return Ok(None);
        }

        let kind: ProviderKind = provider_name.parse()?;
        match kind {
            ProviderKind::Google | ProviderKind::Facebook => {
                tracing::info!(provider = %kind, "External provider does not support refresh token");
                Ok(None)
            }
            ProviderKind::Microsoft => {
                let config = self.config.microsoft.as_ref().ok_or_else(|| {
                    ProviderError::NotSupported(format!("{}/refresh_token", kind.name()))
                })?;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                    result = microsoft::refresh(&self.http, config, refresh_token) => result.map(Some),
                }
            }
        }
    }
}

/// Reads a response body, failing on non-success statuses.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleConfig;

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("google".parse::<ProviderKind>().ok(), Some(ProviderKind::Google));
        assert_eq!(
            "MICROSOFT".parse::<ProviderKind>().ok(),
            Some(ProviderKind::Microsoft)
        );
        assert!(matches!(
            "twitter".parse::<ProviderKind>(),
            Err(ProviderError::NotSupported(name)) if name == "twitter"
        ));
    }

    #[test]
    fn only_configured_providers_are_listed() {
        let providers = ExternalProviders::new(ExternalLoginsConfig {
            google: Some(GoogleConfig {
                client_id: "client".into(),
                certs_url: "http://localhost/certs".into(),
            }),
            ..Default::default()
        });
        let listed = providers.configured_providers();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Google");
    }

    #[tokio::test]
    async fn unsupported_grant_fails_closed() {
        let providers = ExternalProviders::new(ExternalLoginsConfig {
            google: Some(GoogleConfig {
                client_id: "client".into(),
                certs_url: "http://localhost/certs".into(),
            }),
            ..Default::default()
        });
        let request = ExternalLoginRequest {
            provider: "Google".into(),
            grant: LoginGrant::AuthorizationCode {
                code: "c".into(),
                code_verifier: "v".into(),
                redirect_uri: "http://localhost".into(),
            },
        };
        let err = providers
            .resolve(&request, &CancellationToken::new())
            .await
            .expect_err("must fail");
        assert!(matches!(err, ProviderError::NotSupported(s) if s == "Google/authorization_code"));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_not_supported() {
        let providers = ExternalProviders::new(ExternalLoginsConfig::default());
        let request = ExternalLoginRequest {
            provider: "Facebook".into(),
            grant: LoginGrant::Implicit {
                access_token: "t".into(),
            },
        };
        let err = providers
            .resolve(&request, &CancellationToken::new())
            .await
            .expect_err("must fail");
        assert!(matches!(err, ProviderError::NotSupported(_)));
    }

    #[tokio::test]
    async fn refresh_is_a_no_op_without_input_or_support() {
        let providers = ExternalProviders::new(ExternalLoginsConfig::default());
        let cancel = CancellationToken::new();
        assert!(
            providers
                .refresh_provider_token("", "token", &cancel)
                .await
                .expect("ok")
                .is_none()
        );
        assert!(
            providers
                .refresh_provider_token("Google", "token", &cancel)
                .await
                .expect("ok")
                .is_none()
        );
        assert!(
            providers
                .refresh_provider_token("Facebook", "token", &cancel)
                .await
                .expect("ok")
                .is_none()
        );
    }
}
