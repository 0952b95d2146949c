//! Refresh token and purpose token storage: lookups, mismatches and expiry.

mod common;

use std::sync::Arc;

use common::{sign_up, test_config, test_db};
use identity_core::entity::{identity_purpose_token, identity_user_token};
use identity_core::manager::IdentityManager;
use identity_core::purpose::TokenPurpose;
use identity_core::refresh::{RefreshTokenError, RefreshTokenStore};
use identity_core::token::REFRESH_TOKEN_PROVIDER;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter,
};
use time::{Duration, OffsetDateTime};

/// Manager and refresh store over one database, plus a signed-up user id.
async fn setup() -> (IdentityManager, RefreshTokenStore, Arc<DatabaseConnection>, String) {
    let db = test_db().await;
    let manager = IdentityManager::new(Arc::new(test_config("")), Some(db.clone()));
    let user = manager
        .sign_up(&sign_up("olga", "olga@example.com"))
        .await
        .expect("sign up");
    let refresh = RefreshTokenStore::new(db.clone(), 24);
    (manager, refresh, db, user.id)
}

#[tokio::test]
async fn refresh_validate_distinguishes_missing_and_mismatched_tokens() {
    let (_, refresh, _, user_id) = setup().await;

    assert!(matches!(
        refresh.validate(&user_id, "Default", "anything").await,
        Err(RefreshTokenError::NotFound)
    ));

    let first = refresh.issue(&user_id, "Default").await.expect("issue");
    refresh
        .validate(&user_id, "Default", &first.token)
        .await
        .expect("fresh token is valid");

    let second = refresh.issue(&user_id, "Default").await.expect("issue");
    assert!(matches!(
        refresh.validate(&user_id, "Default", &first.token).await,
        Err(RefreshTokenError::Mismatch)
    ));
    refresh
        .validate(&user_id, "Default", &second.token)
        .await
        .expect("latest token is valid");

    assert!(refresh.revoke(&user_id, "Default").await.expect("revoke"));
    assert!(matches!(
        refresh.validate(&user_id, "Default", &second.token).await,
        Err(RefreshTokenError::NotFound)
    ));
}

#[tokio::test]
async fn expired_refresh_token_is_rejected_and_kept() {
    let (_, refresh, db, user_id) = setup().await;
    let issued = refresh.issue(&user_id, "Default").await.expect("issue");

    let row = identity_user_token::Entity::find_by_id((
        user_id.clone(),
        REFRESH_TOKEN_PROVIDER.to_string(),
        "Default".to_string(),
    ))
    .one(db.as_ref())
    .await
    .expect("query")
    .expect("stored row");
    let mut row = row.into_active_model();
    row.expire_at = Set(OffsetDateTime::now_utc() - Duration::minutes(1));
    row.update(db.as_ref()).await.expect("expire row");

    assert!(matches!(
        refresh.validate(&user_id, "Default", &issued.token).await,
        Err(RefreshTokenError::Expired)
    ));
    let still_stored = identity_user_token::Entity::find()
        .filter(identity_user_token::Column::UserId.eq(user_id.as_str()))
        .all(db.as_ref())
        .await
        .expect("query");
    assert_eq!(still_stored.len(), 1);
}

#[tokio::test]
async fn expired_purpose_token_does_not_verify() {
    let (manager, _, db, user_id) = setup().await;
    let token = manager
        .generate_reset_password_token("olga@example.com")
        .await
        .expect("reset token");

    let row = identity_purpose_token::Entity::find()
        .filter(identity_purpose_token::Column::UserId.eq(user_id.as_str()))
        .one(db.as_ref())
        .await
        .expect("query")
        .expect("stored row");
    let mut row = row.into_active_model();
    row.expires_at = Set(OffsetDateTime::now_utc() - Duration::minutes(1));
    row.update(db.as_ref()).await.expect("expire row");

    let valid = manager
        .purpose_tokens()
        .expect("store configured")
        .verify(&user_id, &TokenPurpose::ResetPassword, &token.token, None)
        .await
        .expect("verify");
    assert!(!valid);
}
