//! Sign-up, sign-in, refresh and sign-out through the identity manager.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{
    ADMIN_EMAIL, ADMIN_PASSWORD, PASSWORD, log_in, sign_up, test_config, test_db, test_manager,
};
use identity_core::error::IdentityError;
use identity_core::external::{ExternalLoginData, ExternalLoginTokenData};
use identity_core::manager::{
    AssignClaim, IdentityManager, LogInExternalDirect, LogInRefresh, SignOut,
};
use identity_core::token::{ADMINISTRATOR, Claim};
use tokio_util::sync::CancellationToken;

fn refresh_request(token: &str, refresh_token: &str) -> LogInRefresh {
    LogInRefresh {
        token: token.to_string(),
        refresh_token: refresh_token.to_string(),
        transient_roles: Vec::new(),
        transient_claims: BTreeMap::new(),
    }
}

fn facebook_login(id: &str, email: Option<&str>) -> ExternalLoginData {
    ExternalLoginData {
        id: id.to_string(),
        name: Some("Ext User".to_string()),
        email: email.map(str::to_string),
        external_token: ExternalLoginTokenData {
            name: "Facebook".to_string(),
            token: "fb-access-token".to_string(),
            refresh_token: None,
        },
    }
}

#[tokio::test]
async fn sign_in_carries_exactly_the_persisted_roles_and_claims() {
    let manager = test_manager("").await;
    manager.create_role("editor").await.expect("create role");
    manager.create_role("reader").await.expect("create role");

    let mut request = sign_up("alice", "alice@example.com");
    request.roles = vec!["editor".to_string()];
    request
        .claims
        .insert("department".to_string(), "sales".to_string());
    let user = manager.sign_up(&request).await.expect("sign up");

    let token = manager
        .sign_in(&log_in("alice", PASSWORD))
        .await
        .expect("sign in");
    assert_eq!(token.user_id, user.id);
    assert!(token.refresh_token.is_none());

    let principal = manager.codec().validate(&token.token).expect("valid token");
    assert_eq!(principal.subject, user.id);
    assert_eq!(principal.name, "alice");
    assert_eq!(principal.email, "alice@example.com");
    assert_eq!(principal.roles().collect::<Vec<_>>(), vec!["editor"]);
    assert!(
        principal
            .claims
            .contains(&Claim::new("department", "sales"))
    );
}

#[tokio::test]
async fn default_roles_are_assigned_on_sign_up() {
    let manager = test_manager("user:\n  default_roles: [\"member\"]\n").await;
    manager.create_role("member").await.expect("create role");

    let user = manager
        .sign_up(&sign_up("bob", "bob@example.com"))
        .await
        .expect("sign up");
    assert_eq!(
        manager.get_user_roles(&user.id).await.expect("roles"),
        vec!["member".to_string()]
    );
}

#[tokio::test]
async fn transient_grants_are_not_persisted() {
    let manager = test_manager("").await;
    let user = manager
        .sign_up(&sign_up("carol", "carol@example.com"))
        .await
        .expect("sign up");

    let mut request = log_in("carol", PASSWORD);
    request.transient_roles = vec!["auditor".to_string()];
    request
        .transient_claims
        .insert("session".to_string(), "kiosk".to_string());
    let token = manager.sign_in(&request).await.expect("sign in");

    let principal = manager.codec().validate(&token.token).expect("valid token");
    assert!(principal.is_in_role("auditor"));
    assert!(principal.claims.contains(&Claim::new("session", "kiosk")));

    assert!(manager.get_user_roles(&user.id).await.expect("roles").is_empty());
    assert!(manager.get_user_claims(&user.id).await.expect("claims").is_empty());
}

#[tokio::test]
async fn unknown_user_and_wrong_password_are_unauthorized() {
    let manager = test_manager("").await;
    manager
        .sign_up(&sign_up("dave", "dave@example.com"))
        .await
        .expect("sign up");

    let unknown = manager.sign_in(&log_in("nobody", PASSWORD)).await;
    assert!(matches!(unknown, Err(IdentityError::Unauthorized)));

    let wrong = manager.sign_in(&log_in("dave", "Wr0ng!pass")).await;
    assert!(matches!(wrong, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let manager = test_manager("lockout:\n  max_failed_access_attempts: 3\n").await;
    manager
        .sign_up(&sign_up("erin", "erin@example.com"))
        .await
        .expect("sign up");

    for _ in 0..2 {
        let result = manager.sign_in(&log_in("erin", "Wr0ng!pass")).await;
        assert!(matches!(result, Err(IdentityError::Unauthorized)));
    }
    let third = manager.sign_in(&log_in("erin", "Wr0ng!pass")).await;
    assert!(matches!(third, Err(IdentityError::LockedOut)));

    let correct = manager.sign_in(&log_in("erin", PASSWORD)).await;
    assert!(matches!(correct, Err(IdentityError::LockedOut)));
}

#[tokio::test]
async fn successful_sign_in_resets_the_failure_count() {
    let manager = test_manager("lockout:\n  max_failed_access_attempts: 2\n").await;
    manager
        .sign_up(&sign_up("frank", "frank@example.com"))
        .await
        .expect("sign up");

    let wrong = manager.sign_in(&log_in("frank", "Wr0ng!pass")).await;
    assert!(matches!(wrong, Err(IdentityError::Unauthorized)));
    manager
        .sign_in(&log_in("frank", PASSWORD))
        .await
        .expect("sign in");
    let wrong_again = manager.sign_in(&log_in("frank", "Wr0ng!pass")).await;
    assert!(matches!(wrong_again, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn deactivated_account_reports_locked_out() {
    let manager = test_manager("").await;
    let user = manager
        .sign_up(&sign_up("gina", "gina@example.com"))
        .await
        .expect("sign up");
    manager.deactivate_user(&user.id).await.expect("deactivate");

    let result = manager.sign_in(&log_in("gina", PASSWORD)).await;
    assert!(matches!(result, Err(IdentityError::LockedOut)));
}

#[tokio::test]
async fn unconfirmed_email_is_not_allowed_when_confirmation_is_required() {
    let manager = test_manager("sign_in:\n  require_confirmed_email: true\n").await;
    manager
        .sign_up(&sign_up("hank", "hank@example.com"))
        .await
        .expect("sign up");

    let result = manager.sign_in(&log_in("hank", PASSWORD)).await;
    assert!(matches!(result, Err(IdentityError::LockedOut)));
}

#[tokio::test]
async fn account_without_password_reports_unknown_failure() {
    let manager = test_manager("").await;
    manager
        .sign_up_external_direct(
            &facebook_login("fb-1", Some("ivy@example.com")),
            &[],
            &BTreeMap::new(),
        )
        .await
        .expect("external sign up");

    let result = manager
        .sign_in(&log_in("ivy@example.com", PASSWORD))
        .await;
    assert!(matches!(result, Err(IdentityError::UnknownSignInFailure)));
}

#[tokio::test]
async fn sign_up_reports_every_violation_at_once() {
    let manager = test_manager("").await;
    let mut request = sign_up("bad name!", "not-an-email");
    request.password = "short".to_string();

    let Err(IdentityError::Validation(errors)) = manager.sign_up(&request).await else {
        panic!("expected validation failure");
    };
    assert!(errors.has_code("InvalidUserName"));
    assert!(errors.has_code("InvalidEmail"));
    assert!(errors.has_code("PasswordTooShort"));
}

#[tokio::test]
async fn sign_up_rejects_duplicates() {
    let manager = test_manager("").await;
    manager
        .sign_up(&sign_up("jack", "jack@example.com"))
        .await
        .expect("sign up");

    let Err(IdentityError::Validation(errors)) = manager
        .sign_up(&sign_up("JACK", "Jack@Example.com"))
        .await
    else {
        panic!("expected validation failure");
    };
    assert!(errors.has_code("DuplicateUserName"));
    assert!(errors.has_code("DuplicateEmail"));
}

#[tokio::test]
async fn failed_role_assignment_removes_the_new_account() {
    let manager = test_manager("").await;
    let mut request = sign_up("kate", "kate@example.com");
    request.roles = vec!["missing".to_string()];

    assert!(manager.sign_up(&request).await.is_err());

    request.roles.clear();
    manager
        .sign_up(&request)
        .await
        .expect("username and email are free again");
}

#[tokio::test]
async fn transient_admin_sign_in_without_store() {
    let manager = IdentityManager::new(Arc::new(test_config("")), None);
    assert!(!manager.has_store());

    let token = manager
        .sign_in(&log_in(ADMIN_EMAIL, ADMIN_PASSWORD))
        .await
        .expect("admin sign in");
    assert!(token.refresh_token.is_none());

    let principal = manager.codec().validate(&token.token).expect("valid token");
    assert!(principal.is_in_role(ADMINISTRATOR));
    assert_eq!(principal.email, ADMIN_EMAIL);

    let wrong = manager.sign_in(&log_in(ADMIN_EMAIL, "nope")).await;
    assert!(matches!(wrong, Err(IdentityError::Unauthorized)));

    let sign_up_result = manager.sign_up(&sign_up("leo", "leo@example.com")).await;
    assert!(matches!(
        sign_up_result,
        Err(IdentityError::StoreNotConfigured)
    ));
}

#[tokio::test]
async fn refresh_rotates_the_token_pair() {
    let manager = test_manager("").await;
    manager
        .sign_up(&sign_up("mia", "mia@example.com"))
        .await
        .expect("sign up");

    let mut request = log_in("mia", PASSWORD);
    request.is_refreshable = true;
    let first = manager.sign_in(&request).await.expect("sign in");
    let first_refresh = first.refresh_token.clone().expect("refresh token");

    let cancel = CancellationToken::new();
    let second = manager
        .refresh_sign_in(&refresh_request(&first.token, &first_refresh.token), &cancel)
        .await
        .expect("refresh");
    let second_refresh = second.refresh_token.clone().expect("rotated refresh token");
    assert_ne!(first_refresh.token, second_refresh.token);
    assert_eq!(second.user_id, first.user_id);

    let replay = manager
        .refresh_sign_in(&refresh_request(&first.token, &first_refresh.token), &cancel)
        .await;
    assert!(matches!(replay, Err(IdentityError::Unauthorized)));

    manager
        .refresh_sign_in(&refresh_request(&second.token, &second_refresh.token), &cancel)
        .await
        .expect("refresh with the rotated token");
}

#[tokio::test]
async fn refresh_mismatch_keeps_the_stored_token() {
    let manager = test_manager("").await;
    manager
        .sign_up(&sign_up("nina", "nina@example.com"))
        .await
        .expect("sign up");

    let mut request = log_in("nina", PASSWORD);
    request.is_refreshable = true;
    let token = manager.sign_in(&request).await.expect("sign in");
    let refresh = token.refresh_token.clone().expect("refresh token");

    let cancel = CancellationToken::new();
    let mismatch = manager
        .refresh_sign_in(&refresh_request(&token.token, "not-the-token"), &cancel)
        .await;
    assert!(matches!(mismatch, Err(IdentityError::Unauthorized)));

    manager
        .refresh_sign_in(&refresh_request(&token.token, &refresh.token), &cancel)
        .await
        .expect("stored token still valid");
}

#[tokio::test]
async fn refresh_rejects_tampered_access_token() {
    let manager = test_manager("").await;
    let cancel = CancellationToken::new();
    let result = manager
        .refresh_sign_in(&refresh_request("not.a.jwt", "whatever"), &cancel)
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn new_sign_in_supersedes_the_previous_refresh_token() {
    let manager = test_manager("").await;
    manager
        .sign_up(&sign_up("owen", "owen@example.com"))
        .await
        .expect("sign up");

    let mut request = log_in("owen", PASSWORD);
    request.is_refreshable = true;
    let first = manager.sign_in(&request).await.expect("sign in");
    let second = manager.sign_in(&request).await.expect("sign in");

    let cancel = CancellationToken::new();
    let stale = manager
        .refresh_sign_in(
            &refresh_request(&first.token, &first.refresh_token.expect("refresh").token),
            &cancel,
        )
        .await;
    assert!(matches!(stale, Err(IdentityError::Unauthorized)));

    manager
        .refresh_sign_in(
            &refresh_request(&second.token, &second.refresh_token.expect("refresh").token),
            &cancel,
        )
        .await
        .expect("latest refresh token is valid");
}

#[tokio::test]
async fn refresh_tokens_are_scoped_per_application() {
    let manager = test_manager("").await;
    manager
        .sign_up(&sign_up("pia", "pia@example.com"))
        .await
        .expect("sign up");

    let mut web = log_in("pia", PASSWORD);
    web.is_refreshable = true;
    web.app_id = "web".to_string();
    let mut mobile = web.clone();
    mobile.app_id = "mobile".to_string();

    let web_token = manager.sign_in(&web).await.expect("web sign in");
    manager.sign_in(&mobile).await.expect("mobile sign in");

    let cancel = CancellationToken::new();
    manager
        .refresh_sign_in(
            &refresh_request(&web_token.token, &web_token.refresh_token.expect("refresh").token),
            &cancel,
        )
        .await
        .expect("web token unaffected by the mobile sign-in");
}

#[tokio::test]
async fn sign_out_revokes_the_refresh_token() {
    let manager = test_manager("").await;
    let user = manager
        .sign_up(&sign_up("quinn", "quinn@example.com"))
        .await
        .expect("sign up");

    let mut request = log_in("quinn", PASSWORD);
    request.is_refreshable = true;
    let token = manager.sign_in(&request).await.expect("sign in");

    manager
        .sign_out(&SignOut {
            user_id: user.id.clone(),
            app_id: "Default".to_string(),
        })
        .await
        .expect("sign out");

    let cancel = CancellationToken::new();
    let result = manager
        .refresh_sign_in(
            &refresh_request(&token.token, &token.refresh_token.expect("refresh").token),
            &cancel,
        )
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn external_sign_in_uses_the_linked_account() {
    let manager = test_manager("").await;
    let data = facebook_login("fb-42", Some("rita@example.com"));
    let user = manager
        .sign_up_external_direct(&data, &[], &BTreeMap::new())
        .await
        .expect("external sign up");

    let token = manager
        .sign_in_external_direct(&LogInExternalDirect {
            external_login_data: data,
            app_id: "Default".to_string(),
            is_refreshable: true,
            transient_roles: Vec::new(),
            transient_claims: BTreeMap::new(),
        })
        .await
        .expect("external sign in");
    assert_eq!(token.user_id, user.id);
    assert!(token.refresh_token.is_some());

    let principal = manager.codec().validate(&token.token).expect("valid token");
    assert_eq!(principal.external_provider_name.as_deref(), Some("Facebook"));
    assert_eq!(
        principal.external_provider_token.as_deref(),
        Some("fb-access-token")
    );
    assert_eq!(principal.external_provider_refresh_token, None);
}

#[tokio::test]
async fn external_sign_up_links_to_the_existing_account() {
    let manager = test_manager("").await;
    let local = manager
        .sign_up(&sign_up("sam", "sam@example.com"))
        .await
        .expect("sign up");

    let linked = manager
        .sign_up_external_direct(
            &facebook_login("fb-7", Some("SAM@example.com")),
            &[],
            &BTreeMap::new(),
        )
        .await
        .expect("external sign up");
    assert_eq!(linked.id, local.id);

    let again = manager
        .sign_up_external_direct(
            &facebook_login("fb-7", Some("sam@example.com")),
            &[],
            &BTreeMap::new(),
        )
        .await;
    let Err(IdentityError::Validation(errors)) = again else {
        panic!("expected validation failure");
    };
    assert!(errors.has_code("LoginAlreadyAssociated"));
}

#[tokio::test]
async fn external_sign_up_requires_an_email() {
    let manager = test_manager("").await;
    let result = manager
        .sign_up_external_direct(&facebook_login("fb-9", None), &[], &BTreeMap::new())
        .await;
    let Err(IdentityError::Validation(errors)) = result else {
        panic!("expected validation failure");
    };
    assert!(errors.has_code("InvalidEmail"));
}

#[tokio::test]
async fn external_sign_in_without_linked_account_is_unauthorized() {
    let manager = test_manager("").await;
    let result = manager
        .sign_in_external_direct(&LogInExternalDirect {
            external_login_data: facebook_login("fb-unknown", Some("x@example.com")),
            app_id: "Default".to_string(),
            is_refreshable: false,
            transient_roles: Vec::new(),
            transient_claims: BTreeMap::new(),
        })
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
}

#[tokio::test]
async fn transient_external_sign_in_needs_no_store() {
    let manager = IdentityManager::new(Arc::new(test_config("")), None);
    let token = manager
        .sign_in_external_transient(
            &facebook_login("fb-3", Some("tom@example.com")),
            &["guest".to_string()],
            &BTreeMap::new(),
        )
        .expect("transient token");
    assert_eq!(token.user_id, "fb-3");

    let principal = manager.codec().validate(&token.token).expect("valid token");
    assert!(principal.is_in_role("guest"));
    assert_eq!(principal.email, "tom@example.com");
}

#[tokio::test]
async fn role_typed_claims_cannot_be_stored_or_attached() {
    let manager = test_manager("").await;
    let admin_role = manager.create_role(ADMINISTRATOR).await.expect("create role");

    let mut request = sign_up("mallory", "mallory@example.com");
    request
        .claims
        .insert("role".to_string(), ADMINISTRATOR.to_string());
    request.claims.insert("sub".to_string(), "someone".to_string());
    let Err(IdentityError::Validation(errors)) = manager.sign_up(&request).await else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.iter().filter(|e| e.code == "InvalidClaimType").count(), 2);

    let user = manager
        .sign_up(&sign_up("mallory", "mallory@example.com"))
        .await
        .expect("account was not created by the rejected attempt");

    let assign_user = manager
        .assign_user_claim(&AssignClaim {
            id: user.id.clone(),
            claim_type: "role".to_string(),
            claim_value: ADMINISTRATOR.to_string(),
        })
        .await;
    assert!(matches!(assign_user, Err(IdentityError::Validation(_))));

    let assign_role = manager
        .assign_role_claim(&AssignClaim {
            id: admin_role.id,
            claim_type: "email".to_string(),
            claim_value: "root@example.com".to_string(),
        })
        .await;
    assert!(matches!(assign_role, Err(IdentityError::Validation(_))));

    let mut log_in_request = log_in("mallory", PASSWORD);
    log_in_request
        .transient_claims
        .insert("role".to_string(), ADMINISTRATOR.to_string());
    let Err(IdentityError::Validation(errors)) = manager.sign_in(&log_in_request).await else {
        panic!("expected validation failure");
    };
    assert!(errors.has_code("InvalidClaimType"));

    let token = manager
        .sign_in(&log_in("mallory", PASSWORD))
        .await
        .expect("sign in");
    let principal = manager.codec().validate(&token.token).expect("valid token");
    assert!(!principal.is_in_role(ADMINISTRATOR));
    assert!(manager.get_user_claims(&user.id).await.expect("claims").is_empty());
}

#[tokio::test]
async fn failed_external_grants_unlink_the_existing_account() {
    let db = test_db().await;
    let manager = IdentityManager::new(Arc::new(test_config("")), Some(db.clone()));
    let strict = IdentityManager::new(
        Arc::new(test_config("user:\n  default_roles: [\"missing\"]\n")),
        Some(db),
    );
    let local = manager
        .sign_up(&sign_up("nina", "nina@example.com"))
        .await
        .expect("sign up");

    let data = facebook_login("fb-nina", Some("nina@example.com"));
    assert!(
        strict
            .sign_up_external_direct(&data, &[], &BTreeMap::new())
            .await
            .is_err()
    );

    let result = manager
        .sign_in_external_direct(&LogInExternalDirect {
            external_login_data: data.clone(),
            app_id: "Default".to_string(),
            is_refreshable: false,
            transient_roles: Vec::new(),
            transient_claims: BTreeMap::new(),
        })
        .await;
    assert!(matches!(result, Err(IdentityError::Unauthorized)));
    assert!(manager.get_user(&local.id).await.is_ok());

    let linked = manager
        .sign_up_external_direct(&data, &[], &BTreeMap::new())
        .await
        .expect("login is free to link again");
    assert_eq!(linked.id, local.id);
}
