//! Session and activation lifecycle through the services, with a manual clock.

mod common;

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;

use babytrack::error::AppError;
use babytrack::identity::Role;

use common::{code_for, harness, harness_with, ACCESS_TTL_SECS, REFRESH_TTL_SECS};

#[tokio::test]
async fn access_credential_lives_until_its_ttl() -> Result<()> {
    let h = harness();
    h.signup("Alice", "alice@example.com", "secret-pass").await;
    let login = h.state.accounts.login("alice@example.com", "secret-pass").await?;
    assert_eq!(login.identity.email, "alice@example.com");

    let me = h.state.issuer.authenticate(&login.tokens.access_token).await?;
    assert_eq!(me.id, login.identity.id);

    h.clock.advance(Duration::seconds(ACCESS_TTL_SECS - 2));
    assert!(h.state.issuer.authenticate(&login.tokens.access_token).await.is_ok());

    h.clock.advance(Duration::seconds(3));
    let err = h.state.issuer.authenticate(&login.tokens.access_token).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }), "{:?}", err);
    Ok(())
}

#[tokio::test]
async fn logout_kills_unexpired_access_credential() -> Result<()> {
    let h = harness();
    let user = h.signup("Alice", "alice@example.com", "secret-pass").await;
    let login = h.state.accounts.login("alice@example.com", "secret-pass").await?;
    assert!(h.state.issuer.authenticate(&login.tokens.access_token).await.is_ok());

    h.state.accounts.logout(&user.id).await?;
    let err = h.state.issuer.authenticate(&login.tokens.access_token).await.unwrap_err();
    assert_eq!(err.kind(), "unauthenticated");
    Ok(())
}

#[tokio::test]
async fn profile_read_after_logout_does_not_restore_the_session() -> Result<()> {
    let h = harness();
    let user = h.signup("Alice", "alice@example.com", "secret-pass").await;
    let login = h.state.accounts.login("alice@example.com", "secret-pass").await?;
    assert_eq!(h.state.accounts.me(&user.id).await?.email, "alice@example.com");

    h.state.accounts.logout(&user.id).await?;
    let err = h.state.accounts.me(&user.id).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }), "{:?}", err);
    let err = h.state.issuer.authenticate(&login.tokens.access_token).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }), "{:?}", err);
    assert!(h.state.issuer.sessions().load(&user.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn refresh_slides_the_session_window() -> Result<()> {
    // Access credentials outlive the session here, so only the session decides.
    let long_access = (REFRESH_TTL_SECS * 3).to_string();
    let h = harness_with(&[("ACCESS_TOKEN_TTL_SECS", long_access.as_str())]);
    let user = h.signup("Alice", "alice@example.com", "secret-pass").await;
    let login = h.state.accounts.login("alice@example.com", "secret-pass").await?;

    h.clock.advance(Duration::seconds(REFRESH_TTL_SECS - 10));
    let refreshed = h.state.accounts.refresh(&login.tokens.refresh_token).await?;

    // Past the first session's lifetime, inside the renewed one.
    h.clock.advance(Duration::seconds(REFRESH_TTL_SECS - 10));
    let me = h.state.issuer.authenticate(&refreshed.tokens.access_token).await?;
    assert_eq!(me.id, user.id);

    h.clock.advance(Duration::seconds(20));
    let err = h.state.issuer.authenticate(&refreshed.tokens.access_token).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }), "{:?}", err);
    Ok(())
}

#[tokio::test]
async fn bad_login_is_invalid_credential() -> Result<()> {
    let h = harness();
    h.signup("Alice", "alice@example.com", "secret-pass").await;
    let err = h.state.accounts.login("alice@example.com", "wrong-pass").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredential { .. }));
    let err = h.state.accounts.login("nobody@example.com", "secret-pass").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredential { .. }));
    // Email matching ignores case and surrounding spaces.
    assert!(h.state.accounts.login("  Alice@Example.com ", "secret-pass").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn resend_within_cooldown_is_throttled_with_same_token() -> Result<()> {
    let h = harness();
    let first = h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await?;

    let mut last_remaining = u64::MAX;
    for step in 0..3 {
        if step > 0 { h.clock.advance(Duration::seconds(30)); }
        match h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await {
            Err(AppError::ResendThrottled { remaining_seconds, activation_token, .. }) => {
                assert!(remaining_seconds < last_remaining, "{} !< {}", remaining_seconds, last_remaining);
                assert!(remaining_seconds <= 120);
                assert_eq!(activation_token, first.activation_token);
                last_remaining = remaining_seconds;
            }
            other => panic!("expected throttle, got {:?}", other),
        }
    }
    assert_eq!(last_remaining, 60);
    assert_eq!(h.mailer.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn resend_after_cooldown_mints_new_code_and_token() -> Result<()> {
    let h = harness_with(&[("ACTIVATION_RESEND_COOLDOWN_SECS", "60")]);
    let first = h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await?;
    let first_code = code_for(&h.mailer, "alice@example.com");

    h.clock.advance(Duration::seconds(61));
    let second = h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await?;
    assert_ne!(second.activation_token, first.activation_token);
    assert_eq!(h.mailer.sent().len(), 2);
    let second_code = code_for(&h.mailer, "alice@example.com");

    let err = h.state.activation.activate_registration(&first.activation_token, &first_code).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidOrExpiredCode { .. }), "{:?}", err);

    let user = h.state.activation.activate_registration(&second.activation_token, &second_code).await?;
    assert_eq!(user.email, "alice@example.com");
    assert!(user.verified);
    Ok(())
}

#[tokio::test]
async fn expired_code_is_rejected() -> Result<()> {
    let h = harness();
    let ticket = h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await?;
    let code = code_for(&h.mailer, "alice@example.com");
    h.clock.advance(Duration::seconds(121));
    let err = h.state.activation.activate_registration(&ticket.activation_token, &code).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidOrExpiredCode { .. }));
    assert_eq!(err.http_status(), 400);

    // The expired row no longer blocks a fresh request.
    assert!(h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn wrong_code_leaves_pending_row_usable() -> Result<()> {
    let h = harness();
    let ticket = h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await?;
    let code = code_for(&h.mailer, "alice@example.com");
    let wrong = if code == "1000" { "1001" } else { "1000" };
    let err = h.state.activation.activate_registration(&ticket.activation_token, wrong).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidOrExpiredCode { .. }));
    assert!(h.state.activation.activate_registration(&ticket.activation_token, &code).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn refresh_round_trip_passes_authentication() -> Result<()> {
    let h = harness();
    let user = h.signup("Alice", "alice@example.com", "secret-pass").await;
    let login = h.state.accounts.login("alice@example.com", "secret-pass").await?;

    h.clock.advance(Duration::seconds(1));
    let refreshed = h.state.accounts.refresh(&login.tokens.refresh_token).await?;
    assert_ne!(refreshed.tokens.refresh_token, login.tokens.refresh_token);
    let me = h.state.issuer.authenticate(&refreshed.tokens.access_token).await?;
    assert_eq!(me.id, user.id);

    // An access credential is not a refresh credential.
    let err = h.state.accounts.refresh(&login.tokens.access_token).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredential { .. }));

    h.state.accounts.logout(&user.id).await?;
    let err = h.state.accounts.refresh(&refreshed.tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AppError::SessionExpired { .. }), "{:?}", err);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activation_creates_one_account() -> Result<()> {
    let h = harness();
    let ticket = h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await?;
    let code = code_for(&h.mailer, "alice@example.com");

    let workflow = Arc::clone(&h.state.activation);
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let wf = workflow.clone();
        let token = ticket.activation_token.clone();
        let code = code.clone();
        tasks.push(tokio::spawn(async move { wf.activate_registration(&token, &code).await }));
    }
    let mut created = 0;
    for t in tasks {
        match t.await? {
            Ok(_) => created += 1,
            Err(AppError::AlreadyActivated { .. }) => {}
            Err(other) => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(h.state.accounts.list_users().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_is_rejected() -> Result<()> {
    let h = harness();
    h.signup("Alice", "alice@example.com", "secret-pass").await;
    let err = h.state.activation.request_registration("Alice 2", "ALICE@example.com", "secret-pass", None).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateEmail { .. }));
    assert_eq!(err.http_status(), 409);
    Ok(())
}

#[tokio::test]
async fn failed_mail_leaves_nothing_pending() -> Result<()> {
    let h = harness();
    h.mailer.set_failing(true);
    let err = h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await.unwrap_err();
    assert_eq!(err.http_status(), 503);

    h.mailer.set_failing(false);
    let ticket = h.state.activation.request_registration("Alice", "alice@example.com", "secret-pass", None).await?;
    let code = code_for(&h.mailer, "alice@example.com");
    h.state.activation.activate_registration(&ticket.activation_token, &code).await?;
    Ok(())
}

#[tokio::test]
async fn password_reset_flow() -> Result<()> {
    let h = harness();
    h.signup("Alice", "alice@example.com", "secret-pass").await;

    let err = h.state.activation.request_password_reset("nobody@example.com").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    let ticket = h.state.activation.request_password_reset("alice@example.com").await?;
    let code = code_for(&h.mailer, "alice@example.com");

    // A reset token cannot activate a registration.
    let err = h.state.activation.activate_registration(&ticket.activation_token, &code).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidOrExpiredCode { .. }));

    h.state.activation.reset_password(&ticket.activation_token, &code, "new-secret").await?;
    assert!(h.state.accounts.login("alice@example.com", "secret-pass").await.is_err());
    assert!(h.state.accounts.login("alice@example.com", "new-secret").await.is_ok());

    let err = h.state.activation.reset_password(&ticket.activation_token, &code, "another").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidOrExpiredCode { .. }));
    Ok(())
}

#[tokio::test]
async fn email_change_needs_the_requesting_account() -> Result<()> {
    let h = harness();
    let alice = h.signup("Alice", "alice@example.com", "secret-pass").await;
    let bob = h.signup("Bob", "bob@example.com", "secret-pass").await;
    let login = h.state.accounts.login("alice@example.com", "secret-pass").await?;

    let err = h.state.activation.request_email_change(&login.identity, "bob@example.com").await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateEmail { .. }));

    let ticket = h.state.activation.request_email_change(&login.identity, "alice@new.example.com").await?;
    let code = code_for(&h.mailer, "alice@new.example.com");

    let err = h.state.activation.confirm_email_change(&bob.id, &ticket.activation_token, &code).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));

    let updated = h.state.activation.confirm_email_change(&alice.id, &ticket.activation_token, &code).await?;
    h.state.accounts.sync_session(&updated).await?;
    let me = h.state.accounts.me(&alice.id).await?;
    assert_eq!(me.email, "alice@new.example.com");
    assert!(h.state.accounts.login("alice@new.example.com", "secret-pass").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn profile_updates_rewrite_the_cached_session() -> Result<()> {
    let h = harness();
    h.signup("Alice", "alice@example.com", "secret-pass").await;
    let login = h.state.accounts.login("alice@example.com", "secret-pass").await?;

    h.state.accounts.update_name(&login.identity, "Alice Liddell").await?;
    h.state.accounts.update_avatar(&login.identity, "avatars/alice.png").await?;
    let me = h.state.issuer.authenticate(&login.tokens.access_token).await?;
    assert_eq!(me.name, "Alice Liddell");
    assert_eq!(me.avatar.as_deref(), Some("avatars/alice.png"));

    let err = h.state.accounts.change_password(&login.identity, "wrong", "next-pass").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredential { .. }));
    h.state.accounts.change_password(&login.identity, "secret-pass", "next-pass").await?;
    assert!(h.state.accounts.login("alice@example.com", "next-pass").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn admin_changes_role_and_deletes_user() -> Result<()> {
    let h = harness();
    let alice = h.signup("Alice", "alice@example.com", "secret-pass").await;
    let bob = h.signup("Bob", "bob@example.com", "secret-pass").await;
    let bob_login = h.state.accounts.login("bob@example.com", "secret-pass").await?;

    h.state.accounts.update_role(&alice.id, Role::Admin).await?;
    let users = h.state.accounts.list_users().await?;
    assert_eq!(users.len(), 2);
    assert!(users.iter().any(|u| u.id == alice.id && u.role == Role::Admin));

    h.state.accounts.delete_user(&bob.id).await?;
    let err = h.state.issuer.authenticate(&bob_login.tokens.access_token).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    let err = h.state.accounts.delete_user(&bob.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn sweep_drops_expired_sessions_and_pending_rows() -> Result<()> {
    let h = harness();
    h.signup("Alice", "alice@example.com", "secret-pass").await;
    h.state.accounts.login("alice@example.com", "secret-pass").await?;
    h.state.activation.request_registration("Bob", "bob@example.com", "secret-pass", None).await?;
    assert_eq!(h.cache.len(), 1);

    h.clock.advance(Duration::seconds(common::REFRESH_TTL_SECS + 1));
    let removed = h.state.sweep_once().await;
    assert_eq!(removed, 2);
    assert!(h.cache.is_empty());
    Ok(())
}
