//! HTTP surface tests.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::{ADMIN_EMAIL, ADMIN_PASSWORD, PASSWORD, sign_up, test_config, test_manager};
use identity_core::AppResources;
use identity_core::api::router;
use identity_core::manager::{AssignRole, IdentityManager};
use identity_core::token::{ADMINISTRATOR, AccessToken};
use serde_json::{Value, json};

async fn server_with(manager: IdentityManager) -> TestServer {
    TestServer::new(router(AppResources::new(manager))).expect("create test server")
}

async fn login(server: &TestServer, username: &str, password: &str) -> AccessToken {
    let response = server
        .post("/api/identity/login")
        .json(&json!({"username": username, "password": password}))
        .await;
    response.assert_status_ok();
    response.json::<AccessToken>()
}

/// Manager with an administrator account `root` and a regular account `alice`.
async fn seeded_manager() -> (IdentityManager, String) {
    let manager = test_manager("").await;
    manager.create_role(ADMINISTRATOR).await.expect("create role");
    let root = manager
        .sign_up(&sign_up("root", "root@example.com"))
        .await
        .expect("sign up");
    manager
        .assign_user_role(&AssignRole {
            user_id: root.id,
            role_name: ADMINISTRATOR.to_string(),
        })
        .await
        .expect("assign role");
    let alice = manager
        .sign_up(&sign_up("alice", "alice@example.com"))
        .await
        .expect("sign up");
    (manager, alice.id)
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let server = server_with(test_manager("").await).await;
    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn signup_then_login() {
    let server = server_with(test_manager("").await).await;

    let response = server
        .post("/api/identity/signup")
        .json(&json!({
            "username": "bob",
            "email": "bob@example.com",
            "password": PASSWORD
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let user: Value = response.json();
    assert_eq!(user["username"], "bob");
    assert_eq!(user["email_confirmed"], false);

    let response = server
        .post("/api/identity/login")
        .json(&json!({"username": "bob", "password": PASSWORD, "is_refreshable": true}))
        .await;
    response.assert_status_ok();
    let token: Value = response.json();
    assert_eq!(token["user_id"], user["id"]);
    assert_eq!(token["app_id"], "Default");
    assert!(token["refresh_token"]["token"].is_string());
}

#[tokio::test]
async fn wrong_password_is_401() {
    let (manager, _) = seeded_manager().await;
    let server = server_with(manager).await;

    let response = server
        .post("/api/identity/login")
        .json(&json!({"username": "alice", "password": "Wr0ng!pass"}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn signup_validation_lists_every_field() {
    let server = server_with(test_manager("").await).await;

    let response = server
        .post("/api/identity/signup")
        .json(&json!({"username": "x y", "email": "nope", "password": "short"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "validation_failed");
    let codes: Vec<&str> = body["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .filter_map(|e| e["code"].as_str())
        .collect();
    assert!(codes.contains(&"InvalidUserName"));
    assert!(codes.contains(&"InvalidEmail"));
    assert!(codes.contains(&"PasswordTooShort"));
}

#[tokio::test]
async fn protected_endpoints_require_a_bearer_token() {
    let server = server_with(test_manager("").await).await;

    let response = server.post("/api/identity/logout").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_token");

    let response = server
        .post("/api/identity/logout")
        .authorization_bearer("not-a-jwt")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_refresh_token() {
    let (manager, _) = seeded_manager().await;
    let server = server_with(manager).await;

    let response = server
        .post("/api/identity/login")
        .json(&json!({"username": "alice", "password": PASSWORD, "is_refreshable": true}))
        .await;
    let token: AccessToken = response.json();
    let refresh = token.refresh_token.clone().expect("refresh token");

    server
        .post("/api/identity/logout")
        .authorization_bearer(&token.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = server
        .post("/api/identity/login/refresh")
        .json(&json!({"token": token.token, "refresh_token": refresh.token}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn users_can_read_only_their_own_account() {
    let (manager, alice_id) = seeded_manager().await;
    let server = server_with(manager).await;
    let alice = login(&server, "alice", PASSWORD).await;
    let root = login(&server, "root", PASSWORD).await;

    let response = server
        .get(&format!("/api/identity/users/{alice_id}"))
        .authorization_bearer(&alice.token)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["username"], "alice");

    server
        .get(&format!("/api/identity/users/{}", root.user_id))
        .authorization_bearer(&alice.token)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    server
        .get(&format!("/api/identity/users/{alice_id}"))
        .authorization_bearer(&root.token)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn request_bodies_cannot_grant_roles_or_claims() {
    let (manager, _) = seeded_manager().await;
    let server = server_with(manager).await;

    let response = server
        .post("/api/identity/signup")
        .json(&json!({
            "username": "mallory",
            "email": "mallory@example.com",
            "password": PASSWORD,
            "roles": [ADMINISTRATOR],
            "claims": {"role": ADMINISTRATOR}
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let user: Value = response.json();

    let response = server
        .post("/api/identity/login")
        .json(&json!({
            "username": "mallory",
            "password": PASSWORD,
            "transient_roles": [ADMINISTRATOR],
            "transient_claims": {"role": ADMINISTRATOR}
        }))
        .await;
    response.assert_status_ok();
    let token: AccessToken = response.json();

    server
        .get("/api/identity/roles")
        .authorization_bearer(&token.token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .post("/api/identity/roles")
        .authorization_bearer(&token.token)
        .json(&json!({"name": "editor"}))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let claims = server
        .get(&format!("/api/identity/users/{}/claims", user["id"].as_str().expect("id")))
        .authorization_bearer(&token.token)
        .await;
    claims.assert_status_ok();
    assert_eq!(claims.json::<Value>(), json!([]));
}

#[tokio::test]
async fn role_management_requires_administrator() {
    let (manager, alice_id) = seeded_manager().await;
    let server = server_with(manager).await;
    let alice = login(&server, "alice", PASSWORD).await;
    let root = login(&server, "root", PASSWORD).await;

    server
        .post("/api/identity/roles")
        .authorization_bearer(&alice.token)
        .json(&json!({"name": "editor"}))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = server
        .post("/api/identity/roles")
        .authorization_bearer(&root.token)
        .json(&json!({"name": "editor"}))
        .await;
    response.assert_status(StatusCode::CREATED);

    server
        .post(&format!("/api/identity/users/{alice_id}/roles"))
        .authorization_bearer(&root.token)
        .json(&json!({"role_name": "editor"}))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = server
        .post(&format!("/api/identity/users/{alice_id}/roles"))
        .authorization_bearer(&root.token)
        .json(&json!({"role_name": "editor"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get(&format!("/api/identity/users/{alice_id}/roles"))
        .authorization_bearer(&alice.token)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Vec<String>>(), vec!["editor".to_string()]);

    let roles: Value = server
        .get("/api/identity/roles")
        .authorization_bearer(&root.token)
        .await
        .json();
    let names: Vec<&str> = roles
        .as_array()
        .expect("roles")
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec![ADMINISTRATOR, "editor"]);

    let token = login(&server, "alice", PASSWORD).await;
    let response = server
        .get(&format!("/api/identity/users/{alice_id}/roles"))
        .authorization_bearer(&token.token)
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn user_claims_round_trip_through_the_api() {
    let (manager, alice_id) = seeded_manager().await;
    let server = server_with(manager).await;
    let root = login(&server, "root", PASSWORD).await;

    server
        .post(&format!("/api/identity/users/{alice_id}/claims"))
        .authorization_bearer(&root.token)
        .json(&json!({"claim_type": "department", "claim_value": "sales"}))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .get(&format!("/api/identity/users/{alice_id}/claims/department"))
        .authorization_bearer(&root.token)
        .await;
    response.assert_status_ok();
    let claim: Value = response.json();
    assert_eq!(claim["type"], "department");
    assert_eq!(claim["value"], "sales");

    server
        .delete(&format!("/api/identity/users/{alice_id}/claims/department"))
        .authorization_bearer(&root.token)
        .await
        .assert_status_ok();

    let response = server
        .get(&format!("/api/identity/users/{alice_id}/claims/department"))
        .authorization_bearer(&root.token)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), Value::Null);
}

#[tokio::test]
async fn password_reset_through_the_api() {
    let (manager, _) = seeded_manager().await;
    let server = server_with(manager).await;
    let alice = login(&server, "alice", PASSWORD).await;
    let root = login(&server, "root", PASSWORD).await;

    server
        .post("/api/identity/password/reset-token")
        .authorization_bearer(&alice.token)
        .json(&json!({"email": "alice@example.com"}))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = server
        .post("/api/identity/password/reset-token")
        .authorization_bearer(&root.token)
        .json(&json!({"email": "alice@example.com"}))
        .await;
    response.assert_status_ok();
    let token: Value = response.json();
    assert_eq!(token["purpose"], "ResetPassword");

    server
        .post("/api/identity/password/reset")
        .json(&json!({
            "email": "alice@example.com",
            "token": token["token"],
            "password": "N3w!Password"
        }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    login(&server, "alice", "N3w!Password").await;

    let response = server
        .post("/api/identity/password/reset")
        .json(&json!({
            "email": "alice@example.com",
            "token": token["token"],
            "password": "An0ther!Password"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn external_provider_listing() {
    let manager = test_manager(
        "external_logins:\n  google:\n    client_id: \"google-client\"\n",
    )
    .await;
    let server = server_with(manager).await;

    let response = server.get("/api/identity/login/providers").await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!([{"name": "Google", "display_name": "Google"}])
    );
}

#[tokio::test]
async fn without_store_only_the_administrator_signs_in() {
    let manager = IdentityManager::new(Arc::new(test_config("")), None);
    let server = server_with(manager).await;

    let admin = login(&server, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert!(admin.refresh_token.is_none());

    let response = server
        .post("/api/identity/signup")
        .json(&json!({
            "username": "bob",
            "email": "bob@example.com",
            "password": PASSWORD
        }))
        .await;
    response.assert_status(StatusCode::NOT_IMPLEMENTED);
    let body: Value = response.json();
    assert_eq!(body["error"], "store_not_configured");
}
