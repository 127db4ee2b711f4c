//! Tests for the session operations.

use std::sync::Arc;

use keywarden_core::TokenFormat;
use keywarden_core::db::unix_timestamp;
use keywarden_crypto::test_key_manager;

use super::session_svc::{LOGOUT_MESSAGE, SessionService};
use super::types::NewUser;
use crate::auth::{AuthError, TokenCodec, TokenError};
use crate::storage::UserDatabase;

async fn setup() -> SessionService {
    setup_with_format(TokenFormat::Signed).await
}

async fn setup_with_format(format: TokenFormat) -> SessionService {
    let db = UserDatabase::open_in_memory().await.unwrap();
    let codec = Arc::new(TokenCodec::new(test_key_manager(), format, "keywarden"));
    SessionService::new(db, codec)
}

/// Standard "alice" registration used by most tests.
fn alice() -> NewUser {
    NewUser {
        username: "alice".into(),
        email: "alice@example.com".into(),
        password: "password123".into(),
        first_name: "Alice".into(),
        last_name: "Liddell".into(),
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

#[tokio::test]
async fn register_and_login() {
    let svc = setup().await;

    let reg = svc.register(alice()).await.unwrap();
    assert!(!reg.user.id.is_empty());
    assert_eq!(reg.user.username, "alice");
    assert_eq!(reg.token_type, "Bearer");
    assert_eq!(reg.expires_in, 86_400);
    assert!(svc.codec().is_valid(&reg.token));

    let login = svc.login("alice", "password123").await.unwrap();
    assert_eq!(login.user.id, reg.user.id);
    assert_eq!(login.user.first_name, "Alice");
    assert_eq!(login.expires_in, 86_400);

    let claims = svc.codec().verify(&login.token).unwrap();
    assert_eq!(claims.sub, reg.user.id);
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.email, "alice@example.com");
    assert_eq!(claims.exp - claims.iat, 86_400);
}

#[tokio::test]
async fn stored_password_is_hashed() {
    let svc = setup().await;
    svc.register(alice()).await.unwrap();

    let user = svc.database().get_user_by_username("alice").await.unwrap();
    assert_ne!(user.password_hash, "password123");
    assert!(user.password_hash.starts_with("$argon2"));
}

#[tokio::test]
async fn unknown_user_and_wrong_password_are_indistinguishable() {
    let svc = setup().await;
    svc.register(alice()).await.unwrap();

    let ghost = svc.login("ghost", "x").await.unwrap_err();
    let wrong = svc.login("alice", "wrong-pass").await.unwrap_err();

    assert!(matches!(ghost, AuthError::BadCredentials));
    assert!(matches!(wrong, AuthError::BadCredentials));
    assert_eq!(ghost.to_string(), wrong.to_string());
    assert_eq!(ghost.status_code(), wrong.status_code());
}

#[tokio::test]
async fn inactive_account_cannot_log_in() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();
    svc.database().set_active(&reg.user.id, false).await.unwrap();

    let err = svc.login("alice", "password123").await.unwrap_err();
    assert!(matches!(err, AuthError::AccountInactive));
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn inactive_account_with_wrong_password_is_bad_credentials() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();
    svc.database().set_active(&reg.user.id, false).await.unwrap();

    let err = svc.login("alice", "nope").await.unwrap_err();
    assert!(matches!(err, AuthError::BadCredentials));
}

#[tokio::test]
async fn duplicate_username_rejected() {
    let svc = setup().await;
    svc.register(alice()).await.unwrap();

    let err = svc
        .register(NewUser {
            email: "other@example.com".into(),
            ..alice()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UsernameTaken));
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn duplicate_email_rejected() {
    let svc = setup().await;
    svc.register(alice()).await.unwrap();

    let err = svc
        .register(NewUser {
            username: "alice2".into(),
            ..alice()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::EmailTaken));
}

#[tokio::test]
async fn refresh_issues_a_new_token_and_keeps_the_old_one() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();

    let refreshed = svc.refresh(Some(&bearer(&reg.token))).await.unwrap();
    assert_ne!(refreshed.token, reg.token);
    assert_eq!(refreshed.user.id, reg.user.id);
    assert_eq!(refreshed.expires_in, 86_400);

    let old = svc.codec().verify(&reg.token).unwrap();
    let new = svc.codec().verify(&refreshed.token).unwrap();
    assert_ne!(old.jti, new.jti);
    assert!(new.exp >= old.exp);

    // No revocation: the presented token keeps working.
    assert!(svc.codec().is_valid(&reg.token));
}

#[tokio::test]
async fn refresh_restarts_the_full_lifetime() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();

    let later = unix_timestamp() + 3_600;
    let refreshed = svc.refresh_at(Some(&bearer(&reg.token)), later).await.unwrap();
    let claims = svc.codec().verify_at(&refreshed.token, later).unwrap();
    assert_eq!(claims.iat, later);
    assert_eq!(claims.exp, later + 86_400);
}

#[tokio::test]
async fn refresh_rejects_expired_token() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();

    let after_expiry = unix_timestamp() + 86_400 + 60;
    let err = svc
        .refresh_at(Some(&bearer(&reg.token)), after_expiry)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(TokenError::Expired)));
}

#[tokio::test]
async fn refresh_requires_a_bearer_header() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();

    assert!(matches!(
        svc.refresh(None).await,
        Err(AuthError::MissingToken)
    ));
    assert!(matches!(
        svc.refresh(Some(&format!("bearer {}", reg.token))).await,
        Err(AuthError::MissingToken)
    ));
}

#[tokio::test]
async fn deleted_user_cannot_refresh() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();
    svc.database().delete_user(&reg.user.id).await.unwrap();

    let err = svc.refresh(Some(&bearer(&reg.token))).await.unwrap_err();
    assert!(matches!(err, AuthError::UnknownSubject));
}

#[tokio::test]
async fn logout_is_a_stateless_acknowledgement() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();

    assert_eq!(svc.logout().message, LOGOUT_MESSAGE);
    assert!(svc.codec().is_valid(&reg.token));
}

#[tokio::test]
async fn verify_reports_claims_for_valid_token() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();

    let resp = svc.verify(Some(&bearer(&reg.token)));
    assert!(resp.valid);
    let info = resp.token_info.unwrap();
    assert_eq!(info.sub, reg.user.id);
    assert_eq!(info.iss, "keywarden");
}

#[tokio::test]
async fn verify_never_fails() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();

    for header in [
        None,
        Some(String::new()),
        Some("Basic abc".to_string()),
        Some("Bearer garbage".to_string()),
    ] {
        let resp = svc.verify(header.as_deref());
        assert!(!resp.valid);
        assert!(resp.token_info.is_none());
    }

    let expired = svc.verify_at(Some(&bearer(&reg.token)), unix_timestamp() + 86_400);
    assert!(!expired.valid);
}

#[tokio::test]
async fn current_user_returns_projection() {
    let svc = setup().await;
    let reg = svc.register(alice()).await.unwrap();

    let me = svc.current_user(Some(&bearer(&reg.token))).await.unwrap();
    assert_eq!(me, reg.user);

    assert!(matches!(
        svc.current_user(None).await,
        Err(AuthError::MissingToken)
    ));
}

#[tokio::test]
async fn public_key_needs_no_authentication() {
    let svc = setup().await;
    let resp = svc.public_key();
    assert_eq!(resp.public_key, test_key_manager().public_key_base64());
}

#[tokio::test]
async fn encrypted_sessions_work_end_to_end() {
    let svc = setup_with_format(TokenFormat::Encrypted).await;
    let reg = svc.register(alice()).await.unwrap();
    assert_eq!(reg.token.split('.').count(), 5);

    let login = svc.login("alice", "password123").await.unwrap();
    let me = svc.current_user(Some(&bearer(&login.token))).await.unwrap();
    assert_eq!(me.username, "alice");

    let refreshed = svc.refresh(Some(&bearer(&login.token))).await.unwrap();
    assert!(svc.verify(Some(&bearer(&refreshed.token))).valid);
}

#[tokio::test]
async fn custom_ttl_is_reported() {
    let svc = setup().await.with_ttl_minutes(15);
    let reg = svc.register(alice()).await.unwrap();
    assert_eq!(reg.expires_in, 900);

    let claims = svc.codec().verify(&reg.token).unwrap();
    assert_eq!(claims.exp - claims.iat, 900);
}
