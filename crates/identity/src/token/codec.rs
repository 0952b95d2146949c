//! HS256 access token encoding and validation.

use std::collections::{BTreeMap, BTreeSet};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

use super::claims::{AccessTokenData, Claim, Principal, claim_types};
use crate::config::JwtConfig;

/// Tolerance applied to time-based checks.
const CLOCK_SKEW_SECONDS: u64 = 5 * 60;

const EXPECTED_ALGORITHM: &str = "HS256";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("wrong issuer")]
    WrongIssuer,
    #[error("wrong audience")]
    WrongAudience,
    #[error("wrong algorithm: {0}")]
    WrongAlgorithm(String),
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("failed to encode token: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
            ErrorKind::InvalidAudience => TokenError::WrongAudience,
            ErrorKind::InvalidAlgorithm => TokenError::WrongAlgorithm(e.to_string()),
            _ => TokenError::Malformed(e.to_string()),
        }
    }
}

/// Signs and validates access tokens with the deployment-wide symmetric secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: time::Duration,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret_key.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            audience: config.audience().to_string(),
            lifetime: time::Duration::hours(i64::from(config.expiration_hours)),
        }
    }

    /// Sign `data`, returning the compact token and its expiry.
    pub fn encode(&self, data: &AccessTokenData) -> Result<(String, OffsetDateTime), TokenError> {
        let now = OffsetDateTime::now_utc();
        let expire_at = now
            .checked_add(self.lifetime)
            .ok_or_else(|| TokenError::Encoding("token expiry out of range".into()))?;

        let mut payload = Map::new();
        payload.insert(claim_types::APP_ID.into(), data.app_id.clone().into());
        payload.insert(
            claim_types::JWT_ID.into(),
            uuid::Uuid::new_v4().to_string().into(),
        );
        payload.insert(claim_types::SUBJECT.into(), data.user_id.clone().into());
        payload.insert(claim_types::NAME.into(), data.user_name.clone().into());
        payload.insert(claim_types::EMAIL.into(), data.email.clone().into());
        payload.insert(
            claim_types::EXTERNAL_PROVIDER_NAME.into(),
            data.external_provider_name.clone().unwrap_or_default().into(),
        );
        payload.insert(
            claim_types::EXTERNAL_PROVIDER_TOKEN.into(),
            data.external_provider_token.clone().unwrap_or_default().into(),
        );
        payload.insert(
            claim_types::EXTERNAL_PROVIDER_REFRESH_TOKEN.into(),
            data.external_provider_refresh_token
                .clone()
                .unwrap_or_default()
                .into(),
        );

        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for claim in &data.claims {
            if claim_types::is_reserved(&claim.claim_type) {
                tracing::warn!(claim_type = %claim.claim_type, "Dropping claim with reserved type");
                continue;
            }
            grouped
                .entry(claim.claim_type.as_str())
                .or_default()
                .push(claim.value.as_str());
        }
        for (claim_type, values) in grouped {
            let value = match values.as_slice() {
                [single] => Value::from(*single),
                many => Value::from(many.to_vec()),
            };
            payload.insert(claim_type.to_string(), value);
        }

        payload.insert(claim_types::ISSUER.into(), self.issuer.clone().into());
        payload.insert(claim_types::AUDIENCE.into(), self.audience.clone().into());
        payload.insert(claim_types::NOT_BEFORE.into(), now.unix_timestamp().into());
        payload.insert(
            claim_types::EXPIRES.into(),
            expire_at.unix_timestamp().into(),
        );

        let token = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &self.encoding_key,
        )
        .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok((token, expire_at))
    }

    /// Full validation, lifetime included.
    pub fn validate(&self, token: &str) -> Result<Principal, TokenError> {
        self.decode_with(token, true)
    }

    /// Validates signature, issuer, audience and algorithm but accepts expired tokens.
    ///
    /// Used by the refresh flow, where the old access token only carries claims.
    pub fn decode_ignoring_lifetime(&self, token: &str) -> Result<Principal, TokenError> {
        self.decode_with(token, false)
    }

    fn decode_with(&self, token: &str, validate_lifetime: bool) -> Result<Principal, TokenError> {
        ensure_expected_algorithm(token)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_SECONDS;
        validation.validate_exp = validate_lifetime;
        validation.validate_nbf = validate_lifetime;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);

        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &validation)?;
        principal_from_payload(data.claims)
    }
}

/// Rejects any token whose header `alg` is not HS256, compared case-insensitively.
///
/// Runs before signature verification so `none` and asymmetric algorithms never
/// reach the key.
fn ensure_expected_algorithm(token: &str) -> Result<(), TokenError> {
    let header_segment = token
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TokenError::Malformed("missing header".into()))?;
    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_segment.trim_end_matches('='))
        .map_err(|e| TokenError::Malformed(format!("header is not base64url: {e}")))?;
    let header: Value = serde_json::from_slice(&header_bytes)
        .map_err(|e| TokenError::Malformed(format!("header is not JSON: {e}")))?;
    let alg = header
        .get("alg")
        .and_then(Value::as_str)
        .ok_or_else(|| TokenError::WrongAlgorithm("missing".into()))?;
    if !alg.eq_ignore_ascii_case(EXPECTED_ALGORITHM) {
        return Err(TokenError::WrongAlgorithm(alg.to_string()));
    }
    Ok(())
}

fn take_string(payload: &mut Map<String, Value>, key: &str) -> Option<String> {
    match payload.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

fn principal_from_payload(mut payload: Map<String, Value>) -> Result<Principal, TokenError> {
    let subject = take_string(&mut payload, claim_types::SUBJECT)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TokenError::Malformed("missing sub claim".into()))?;
    let expires_at = payload
        .get(claim_types::EXPIRES)
        .and_then(Value::as_i64)
        .and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
        .ok_or_else(|| TokenError::Malformed("missing exp claim".into()))?;

    let app_id = take_string(&mut payload, claim_types::APP_ID).unwrap_or_default();
    let jwt_id = take_string(&mut payload, claim_types::JWT_ID).unwrap_or_default();
    let name = take_string(&mut payload, claim_types::NAME).unwrap_or_default();
    let email = take_string(&mut payload, claim_types::EMAIL).unwrap_or_default();
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    let external_provider_name =
        non_empty(take_string(&mut payload, claim_types::EXTERNAL_PROVIDER_NAME));
    let external_provider_token =
        non_empty(take_string(&mut payload, claim_types::EXTERNAL_PROVIDER_TOKEN));
    let external_provider_refresh_token = non_empty(take_string(
        &mut payload,
        claim_types::EXTERNAL_PROVIDER_REFRESH_TOKEN,
    ));

    let mut claims = BTreeSet::new();
    for (claim_type, value) in payload {
        if claim_types::is_reserved(&claim_type) {
            continue;
        }
        match value {
            Value::Array(values) => {
                for v in values {
                    claims.insert(Claim::new(claim_type.clone(), value_to_string(v)));
                }
            }
            Value::Null => {}
            v => {
                claims.insert(Claim::new(claim_type, value_to_string(v)));
            }
        }
    }

    Ok(Principal {
        app_id,
        subject,
        jwt_id,
        name,
        email,
        external_provider_name,
        external_provider_token,
        external_provider_refresh_token,
        claims,
        expires_at,
    })
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
