use std::sync::Arc;

use chrono::{Duration, Utc};
use federation_api::auth::password_reset::{RESET_COMPLETED_MESSAGE, RESET_REQUESTED_MESSAGE};
use federation_api::auth::tokens::generate_reset_token;
use federation_api::models::Role;
use federation_api::test_support::{
    FailingTransport, RecordingTransport, TEST_FRONTEND_URL, TestDatabase, TestFixtures,
    TestRocketBuilder, fetch_csrf_token, login, post_json,
};
use federation_api::mail::{MailError, MailTransport, OutgoingMail};
use rocket::http::Status;
use serde_json::json;

/// Provider that never answers.
struct StalledTransport;

#[rocket::async_trait]
impl MailTransport for StalledTransport {
    async fn send(&self, _mail: &OutgoingMail) -> Result<Option<String>, MailError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn forgot_password_rejects_malformed_email() {
    let client = TestRocketBuilder::new().async_client().await;
    let csrf = fetch_csrf_token(&client).await;

    let (status, body) = post_json(
        &client,
        &csrf,
        "/api/auth/forgot-password",
        json!({"email": "not-an-email"}),
        None,
    )
    .await;

    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["errors"][0]["path"], "email");
    assert_eq!(body["errors"][0]["msg"], "Please provide a valid email address");
}

#[tokio::test]
async fn reset_password_requires_matching_confirmation() {
    let client = TestRocketBuilder::new().async_client().await;
    let csrf = fetch_csrf_token(&client).await;

    let (status, body) = post_json(
        &client,
        &csrf,
        "/api/auth/reset-password",
        json!({
            "token": "",
            "newPassword": "newSecurePassword123",
            "confirmPassword": "somethingElse123"
        }),
        None,
    )
    .await;

    assert_eq!(status, Status::BadRequest);
    let paths: Vec<&str> = body["errors"]
        .as_array()
        .expect("errors array")
        .iter()
        .filter_map(|error| error["path"].as_str())
        .collect();
    assert!(paths.contains(&"token"));
    assert!(paths.contains(&"confirmPassword"));
}

#[tokio::test]
async fn user_resets_password_through_emailed_link() {
    let Some(test_db) = TestDatabase::start_or_skip("password reset flow test").await else {
        return;
    };
    let fixtures = TestFixtures::new(test_db.pool());
    let user = fixtures
        .insert_user("testuser", "testuser@example.com", "oldpassword123", Role::Moderator)
        .await;

    let mail = RecordingTransport::new();
    let client = TestRocketBuilder::new()
        .manage_pg_pool(test_db.pool_clone())
        .mail_transport(Arc::new(mail.clone()))
        .async_client()
        .await;
    let csrf = fetch_csrf_token(&client).await;
    let (_, old_refresh) = login(&client, &csrf, "testuser", "oldpassword123").await;

    let (status, body) = post_json(
        &client,
        &csrf,
        "/api/auth/forgot-password",
        json!({"email": "  TestUser@Example.com "}),
        None,
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["message"], RESET_REQUESTED_MESSAGE);

    let sent = mail.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "testuser@example.com");
    assert_eq!(sent[0].subject, "Password Reset Request");
    assert!(sent[0]
        .text
        .contains(&format!("{TEST_FRONTEND_URL}/reset-password.html?token=")));

    let token = mail.last_reset_token().await.expect("token in mail");
    assert_eq!(token.len(), 64);

    let pending = fixtures.reload(user.id).await.expect("user exists");
    let stored_hash = pending.password_reset_token.expect("hash stored");
    assert_ne!(stored_hash, token);
    let expires = pending.password_reset_expires.expect("expiry stored");
    assert!(expires > Utc::now() + Duration::minutes(55));
    assert!(expires <= Utc::now() + Duration::minutes(60));

    let (status, body) = post_json(
        &client,
        &csrf,
        "/api/auth/reset-password",
        json!({
            "token": token,
            "newPassword": "newSecurePassword123",
            "confirmPassword": "newSecurePassword123"
        }),
        None,
    )
    .await;
    assert_eq!(status, Status::Ok, "{body}");
    assert_eq!(body["message"], RESET_COMPLETED_MESSAGE);

    let updated = fixtures.reload(user.id).await.expect("user exists");
    assert!(updated.password_reset_token.is_none());
    assert!(updated.password_reset_expires.is_none());
    assert!(updated.refresh_token.is_none());
    assert!(!updated.needs_password_change);

    let (status, _) = post_json(
        &client,
        &csrf,
        "/api/admin/refresh",
        json!({"refreshToken": old_refresh}),
        None,
    )
    .await;
    assert_eq!(status, Status::Forbidden);

    let (status, _) = post_json(
        &client,
        &csrf,
        "/api/admin/login",
        json!({"username": "testuser", "password": "oldpassword123"}),
        None,
    )
    .await;
    assert_eq!(status, Status::Unauthorized);
    login(&client, &csrf, "testuser", "newSecurePassword123").await;

    let (status, body) = post_json(
        &client,
        &csrf,
        "/api/auth/reset-password",
        json!({
            "token": token,
            "newPassword": "anotherPassword123",
            "confirmPassword": "anotherPassword123"
        }),
        None,
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(
        body["message"],
        "Password reset token is invalid or has expired."
    );

    test_db.close().await;
}

#[tokio::test]
async fn unknown_email_gets_the_same_answer_and_no_mail() {
    let Some(test_db) = TestDatabase::start_or_skip("unknown email reset test").await else {
        return;
    };
    let mail = RecordingTransport::new();
    let client = TestRocketBuilder::new()
        .manage_pg_pool(test_db.pool_clone())
        .mail_transport(Arc::new(mail.clone()))
        .async_client()
        .await;
    let csrf = fetch_csrf_token(&client).await;

    let (status, body) = post_json(
        &client,
        &csrf,
        "/api/auth/forgot-password",
        json!({"email": "nobody@example.com"}),
        None,
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["message"], RESET_REQUESTED_MESSAGE);
    assert!(mail.wait_for(1).await.is_empty());

    test_db.close().await;
}

#[tokio::test]
async fn mail_failure_is_not_reported_to_the_client() {
    let Some(test_db) = TestDatabase::start_or_skip("mail failure reset test").await else {
        return;
    };
    let fixtures = TestFixtures::new(test_db.pool());
    let user = fixtures
        .insert_user("testuser", "testuser@example.com", "oldpassword123", Role::Moderator)
        .await;

    let client = TestRocketBuilder::new()
        .manage_pg_pool(test_db.pool_clone())
        .mail_transport(Arc::new(FailingTransport))
        .async_client()
        .await;
    let csrf = fetch_csrf_token(&client).await;

    let (status, body) = post_json(
        &client,
        &csrf,
        "/api/auth/forgot-password",
        json!({"email": "testuser@example.com"}),
        None,
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["message"], RESET_REQUESTED_MESSAGE);

    let pending = fixtures.reload(user.id).await.expect("user exists");
    assert!(pending.password_reset_token.is_some());

    test_db.close().await;
}

#[tokio::test]
async fn expired_token_is_rejected_and_password_unchanged() {
    let Some(test_db) = TestDatabase::start_or_skip("expired reset test").await else {
        return;
    };
    let fixtures = TestFixtures::new(test_db.pool());
    let user = fixtures
        .insert_user("testuser", "testuser@example.com", "oldpassword123", Role::Moderator)
        .await;

    let token = generate_reset_token();
    fixtures
        .users()
        .issue_password_reset(user.id, token.clone(), Utc::now() - Duration::minutes(1))
        .await
        .expect("issue reset");

    let client = TestRocketBuilder::new()
        .manage_pg_pool(test_db.pool_clone())
        .async_client()
        .await;
    let csrf = fetch_csrf_token(&client).await;

    let (status, _) = post_json(
        &client,
        &csrf,
        "/api/auth/reset-password",
        json!({
            "token": token,
            "newPassword": "newSecurePassword123",
            "confirmPassword": "newSecurePassword123"
        }),
        None,
    )
    .await;
    assert_eq!(status, Status::BadRequest);

    let unchanged = fixtures.reload(user.id).await.expect("user exists");
    assert_eq!(unchanged.password_hash, user.password_hash);
    login(&client, &csrf, "testuser", "oldpassword123").await;

    test_db.close().await;
}

#[tokio::test]
async fn newer_reset_request_replaces_the_older_token() {
    let Some(test_db) = TestDatabase::start_or_skip("reset replacement test").await else {
        return;
    };
    let fixtures = TestFixtures::new(test_db.pool());
    fixtures
        .insert_user("testuser", "testuser@example.com", "oldpassword123", Role::Moderator)
        .await;

    let mail = RecordingTransport::new();
    let client = TestRocketBuilder::new()
        .manage_pg_pool(test_db.pool_clone())
        .mail_transport(Arc::new(mail.clone()))
        .async_client()
        .await;
    let csrf = fetch_csrf_token(&client).await;

    for count in 1..=2 {
        let (status, _) = post_json(
            &client,
            &csrf,
            "/api/auth/forgot-password",
            json!({"email": "testuser@example.com"}),
            None,
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(mail.wait_for(count).await.len(), count);
    }
    let sent = mail.sent().await;
    assert_eq!(sent.len(), 2);
    let first = sent[0]
        .text
        .split_once("?token=")
        .map(|(_, rest)| rest.chars().take(64).collect::<String>())
        .expect("first token");
    let second = mail.last_reset_token().await.expect("second token");
    assert_ne!(first, second);

    let body = |token: &str| {
        json!({
            "token": token,
            "newPassword": "newSecurePassword123",
            "confirmPassword": "newSecurePassword123"
        })
    };
    let (status, _) = post_json(&client, &csrf, "/api/auth/reset-password", body(&first), None).await;
    assert_eq!(status, Status::BadRequest);
    let (status, _) = post_json(&client, &csrf, "/api/auth/reset-password", body(&second), None).await;
    assert_eq!(status, Status::Ok);

    test_db.close().await;
}

#[tokio::test]
async fn known_email_is_answered_without_waiting_for_the_mail_provider() {
    let Some(test_db) = TestDatabase::start_or_skip("stalled mail reset test").await else {
        return;
    };
    let fixtures = TestFixtures::new(test_db.pool());
    let user = fixtures
        .insert_user("testuser", "testuser@example.com", "oldpassword123", Role::Moderator)
        .await;

    let client = TestRocketBuilder::new()
        .manage_pg_pool(test_db.pool_clone())
        .mail_transport(Arc::new(StalledTransport))
        .async_client()
        .await;
    let csrf = fetch_csrf_token(&client).await;

    let request = post_json(
        &client,
        &csrf,
        "/api/auth/forgot-password",
        json!({"email": "testuser@example.com"}),
        None,
    );
    let (status, body) = tokio::time::timeout(std::time::Duration::from_secs(10), request)
        .await
        .expect("response before the mail is sent");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["message"], RESET_REQUESTED_MESSAGE);

    let pending = fixtures.reload(user.id).await.expect("user exists");
    assert!(pending.password_reset_token.is_some());

    test_db.close().await;
}
