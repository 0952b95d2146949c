//! External provider flows against mocked Facebook, Microsoft and Google endpoints.

mod common;

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::test_manager_with_providers;
use identity_core::error::IdentityError;
use identity_core::external::LoginGrant;
use identity_core::manager::{LogInExternal, LogInRefresh, SignUpExternal};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn facebook_config(uri: &str) -> String {
    format!(
        "external_logins:\n  facebook:\n    app_id: \"fb-app\"\n    app_secret: \"fb-secret\"\n    graph_url: \"{uri}\"\n"
    )
}

fn microsoft_config(uri: &str) -> String {
    format!(
        "external_logins:\n  microsoft:\n    tenant_id: \"tenant-1\"\n    client_id: \"ms-client\"\n    client_secret: \"ms-secret\"\n    scopes: [\"openid\", \"offline_access\"]\n    login_url: \"{uri}\"\n"
    )
}

fn google_config(uri: &str) -> String {
    format!(
        "external_logins:\n  google:\n    client_id: \"google-client\"\n    certs_url: \"{uri}/oauth2/v3/certs\"\n"
    )
}

fn implicit(provider: &str, access_token: &str) -> LogInExternal {
    LogInExternal {
        provider: provider.to_string(),
        grant: LoginGrant::Implicit {
            access_token: access_token.to_string(),
        },
        app_id: "Default".to_string(),
        is_refreshable: false,
        transient_roles: Vec::new(),
        transient_claims: BTreeMap::new(),
    }
}

fn authorization_code(code: &str) -> LoginGrant {
    LoginGrant::AuthorizationCode {
        code: code.to_string(),
        code_verifier: "verifier".to_string(),
        redirect_uri: "https://app.example.com/callback".to_string(),
    }
}

/// Unsigned JWT-shaped token carrying the Microsoft identity claims.
fn microsoft_access_token(oid: &str, upn: &str) -> String {
    let payload = json!({"oid": oid, "name": "Ada", "upn": upn});
    format!(
        "eyJhbGciOiJub25lIn0.{}.sig",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).expect("json"))
    )
}

async fn mount_facebook_debug(server: &MockServer, data: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/debug_token"))
        .and(query_param("input_token", "user-token"))
        .and(query_param("access_token", "fb-app|fb-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn facebook_invalid_token_is_rejected_before_profile_lookup() {
    let server = MockServer::start().await;
    mount_facebook_debug(
        &server,
        json!({"app_id": "fb-app", "is_valid": false, "user_id": "1001"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1001"})))
        .expect(0)
        .mount(&server)
        .await;

    let manager = test_manager_with_providers(&facebook_config(&server.uri())).await;
    let result = manager
        .sign_in_external(&implicit("Facebook", "user-token"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn facebook_token_for_another_app_is_rejected() {
    let server = MockServer::start().await;
    mount_facebook_debug(
        &server,
        json!({"app_id": "other-app", "is_valid": true, "user_id": "1001"}),
    )
    .await;

    let manager = test_manager_with_providers(&facebook_config(&server.uri())).await;
    let result = manager
        .resolve_external(
            &implicit("Facebook", "user-token").external_request(),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn facebook_reported_error_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/debug_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"message": "Invalid OAuth access token.", "code": 190}
        })))
        .mount(&server)
        .await;

    let manager = test_manager_with_providers(&facebook_config(&server.uri())).await;
    let result = manager
        .sign_in_external(&implicit("Facebook", "user-token"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn facebook_sign_up_then_sign_in() {
    let server = MockServer::start().await;
    mount_facebook_debug(
        &server,
        json!({"app_id": "fb-app", "is_valid": true, "user_id": "1001"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/1001"))
        .and(query_param("fields", "id,name,address,email,birthday"))
        .and(query_param("access_token", "user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1001",
            "name": "Fay",
            "email": "fay@example.com"
        })))
        .mount(&server)
        .await;

    let manager = test_manager_with_providers(&facebook_config(&server.uri())).await;
    let cancel = CancellationToken::new();

    let user = manager
        .sign_up_external(
            &SignUpExternal {
                provider: "facebook".to_string(),
                grant: LoginGrant::Implicit {
                    access_token: "user-token".to_string(),
                },
                roles: Vec::new(),
                claims: BTreeMap::new(),
            },
            &cancel,
        )
        .await
        .expect("external sign up");
    assert_eq!(user.email.as_deref(), Some("fay@example.com"));
    assert!(user.password_hash.is_none());

    let token = manager
        .sign_in_external(&implicit("Facebook", "user-token"), &cancel)
        .await
        .expect("external sign in");
    assert_eq!(token.user_id, user.id);

    let principal = manager.codec().validate(&token.token).expect("valid token");
    assert_eq!(principal.external_provider_name.as_deref(), Some("Facebook"));
    assert_eq!(principal.external_provider_token.as_deref(), Some("user-token"));
}

#[tokio::test]
async fn microsoft_code_exchange_and_provider_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("authorization_code"))
        .and(body_string_contains("the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": microsoft_access_token("oid-1", "ada@contoso.com"),
            "refresh_token": "ms-refresh-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("ms-refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": microsoft_access_token("oid-1", "ada@contoso.com"),
            "refresh_token": "ms-refresh-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = test_manager_with_providers(&microsoft_config(&server.uri())).await;
    let cancel = CancellationToken::new();

    let user = manager
        .sign_up_external(
            &SignUpExternal {
                provider: "Microsoft".to_string(),
                grant: authorization_code("the-code"),
                roles: Vec::new(),
                claims: BTreeMap::new(),
            },
            &cancel,
        )
        .await
        .expect("external sign up");
    assert_eq!(user.email.as_deref(), Some("ada@contoso.com"));

    let token = manager
        .sign_in_external(
            &LogInExternal {
                provider: "Microsoft".to_string(),
                grant: authorization_code("the-code"),
                app_id: "Default".to_string(),
                is_refreshable: true,
                transient_roles: Vec::new(),
                transient_claims: BTreeMap::new(),
            },
            &cancel,
        )
        .await
        .expect("external sign in");
    let principal = manager.codec().validate(&token.token).expect("valid token");
    assert_eq!(
        principal.external_provider_refresh_token.as_deref(),
        Some("ms-refresh-1")
    );

    let refreshed = manager
        .refresh_sign_in(
            &LogInRefresh {
                token: token.token.clone(),
                refresh_token: token.refresh_token.expect("refresh token").token,
                transient_roles: Vec::new(),
                transient_claims: BTreeMap::new(),
            },
            &cancel,
        )
        .await
        .expect("refresh");
    let principal = manager
        .codec()
        .validate(&refreshed.token)
        .expect("valid token");
    assert_eq!(principal.external_provider_name.as_deref(), Some("Microsoft"));
    assert_eq!(
        principal.external_provider_refresh_token.as_deref(),
        Some("ms-refresh-2")
    );
}

#[tokio::test]
async fn microsoft_error_body_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70008: The provided authorization code has expired."
        })))
        .mount(&server)
        .await;

    let manager = test_manager_with_providers(&microsoft_config(&server.uri())).await;
    let result = manager
        .sign_in_external(
            &LogInExternal {
                provider: "Microsoft".to_string(),
                grant: authorization_code("stale"),
                app_id: "Default".to_string(),
                is_refreshable: false,
                transient_roles: Vec::new(),
                transient_claims: BTreeMap::new(),
            },
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn google_key_set_failure_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/certs"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = Some("key-1".to_string());
    let id_token = jsonwebtoken::encode(
        &header,
        &json!({"sub": "g-1", "aud": "google-client", "iss": "accounts.google.com"}),
        &jsonwebtoken::EncodingKey::from_secret(b"not-google"),
    )
    .expect("encode");

    let manager = test_manager_with_providers(&google_config(&server.uri())).await;
    let result = manager
        .sign_in_external(&implicit("Google", &id_token), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn google_unknown_signing_key_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
        .mount(&server)
        .await;

    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = Some("key-1".to_string());
    let id_token = jsonwebtoken::encode(
        &header,
        &json!({"sub": "g-1"}),
        &jsonwebtoken::EncodingKey::from_secret(b"not-google"),
    )
    .expect("encode");

    let manager = test_manager_with_providers(&google_config(&server.uri())).await;
    let result = manager
        .sign_in_external(&implicit("Google", &id_token), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn unsupported_provider_and_grant_are_reported() {
    let server = MockServer::start().await;
    let manager = test_manager_with_providers(&google_config(&server.uri())).await;
    let cancel = CancellationToken::new();

    let twitter = manager
        .sign_in_external(&implicit("Twitter", "token"), &cancel)
        .await;
    assert!(matches!(twitter, Err(IdentityError::NotSupported(p)) if p == "Twitter"));

    let google_code = manager
        .sign_in_external(
            &LogInExternal {
                grant: authorization_code("code"),
                ..implicit("Google", "unused")
            },
            &cancel,
        )
        .await;
    assert!(
        matches!(google_code, Err(IdentityError::NotSupported(p)) if p == "Google/authorization_code")
    );
}

#[tokio::test]
async fn cancelled_resolution_reports_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/debug_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(0)
        .mount(&server)
        .await;

    let manager = test_manager_with_providers(&facebook_config(&server.uri())).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = manager
        .sign_in_external(&implicit("Facebook", "user-token"), &cancel)
        .await;
    assert!(matches!(result, Err(IdentityError::Cancelled)));
}
