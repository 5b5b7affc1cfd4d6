//! Account scenarios.

#![allow(clippy::unwrap_used)]

use cookmaster_client::backend::Operation;
use cookmaster_client::persist::JsonStore;
use cookmaster_client::services::auth::{AuthError, SignUpOutcome};
use cookmaster_integration_tests::{EMAIL, PASSWORD, TestContext};

#[tokio::test]
async fn test_sign_up_with_confirmation() {
    let ctx = TestContext::new();
    ctx.backend.set_require_email_confirmation(true);

    let outcome = ctx.state.session().sign_up(EMAIL, PASSWORD).await.unwrap();

    assert!(matches!(outcome, SignUpOutcome::ConfirmationRequired { .. }));
    assert!(!ctx.state.session().is_logged_in().await);
}

#[tokio::test]
async fn test_sign_up_signs_in_and_survives_restore() {
    let ctx = TestContext::new();

    let SignUpOutcome::SignedIn(user) = ctx.state.session().sign_up(EMAIL, PASSWORD).await.unwrap()
    else {
        panic!("expected an immediate session");
    };

    let reopened = TestContext::reopen(ctx.backend.clone(), JsonStore::memory());
    let restored = reopened.state.restore().await.unwrap();
    assert_eq!(restored.map(|u| u.id), Some(user.id));
}

#[tokio::test]
async fn test_wrong_password_and_malformed_email() {
    let ctx = TestContext::new();
    ctx.backend.add_user(EMAIL, PASSWORD);

    let err = ctx.state.session().sign_in(EMAIL, "salah").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    ctx.backend.clear_calls();
    let err = ctx.state.session().sign_in("bukan-email", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidEmail(_)));
    assert!(ctx.backend.calls().is_empty());
}

#[tokio::test]
async fn test_sign_out_clears_local_state_even_if_remote_fails() {
    let ctx = TestContext::new();
    ctx.signed_in().await;

    ctx.backend.fail_next(Operation::SignOut, "network down");
    assert!(ctx.state.sign_out().await.is_err());

    assert!(!ctx.state.session().is_logged_in().await);
    assert!(ctx.state.require_user().await.is_err());
}
