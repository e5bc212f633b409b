use std::sync::Arc;

use federation_api::models::Role;
use federation_api::test_support::{
    RecordingTransport, TestDatabase, TestFixtures, TestRocketBuilder, csrf_header,
    fetch_csrf_token, post_json,
};
use rocket::http::{ContentType, Status};
use serde_json::{Value, json};

#[tokio::test]
async fn csrf_token_sets_http_only_cookie() {
    let client = TestRocketBuilder::new().async_client().await;

    let response = client.get("/api/csrf-token").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let cookie = response
        .cookies()
        .get("__Host-x-csrf-token")
        .expect("csrf cookie")
        .clone();
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.path(), Some("/"));

    let body: Value = response.into_json().await.expect("json");
    let token = body["csrfToken"].as_str().expect("csrfToken");
    assert_eq!(token.len(), 128);
    assert!(cookie.value().starts_with(token));
}

#[tokio::test]
async fn state_changing_request_without_header_is_rejected() {
    let client = TestRocketBuilder::new().async_client().await;
    fetch_csrf_token(&client).await;

    let response = client
        .post("/api/admin/login")
        .header(ContentType::JSON)
        .body(json!({"username": "testadmin", "password": "testpassword123"}).to_string())
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Forbidden);
    let body: Value = response.into_json().await.expect("json");
    assert_eq!(body["message"], "invalid CSRF token");
}

#[tokio::test]
async fn header_from_another_session_is_rejected() {
    let first = TestRocketBuilder::new().async_client().await;
    let second = TestRocketBuilder::new().async_client().await;
    fetch_csrf_token(&first).await;
    let foreign = fetch_csrf_token(&second).await;

    let (status, body) = post_json(
        &first,
        &foreign,
        "/api/admin/refresh",
        json!({"refreshToken": "a".repeat(128)}),
        None,
    )
    .await;

    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["message"], "invalid CSRF token");
}

#[tokio::test]
async fn header_without_cookie_is_rejected() {
    let client = rocket::local::asynchronous::Client::untracked(
        TestRocketBuilder::new().build(),
    )
    .await
    .expect("client");
    let token = fetch_csrf_token(&client).await;

    let response = client
        .post("/api/auth/forgot-password")
        .header(ContentType::JSON)
        .header(csrf_header(&token))
        .body(json!({"email": "someone@example.com"}).to_string())
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Forbidden);
}

#[tokio::test]
async fn rejected_forgot_password_has_no_side_effects() {
    let Some(test_db) = TestDatabase::start_or_skip("csrf side-effect test").await else {
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
    fetch_csrf_token(&client).await;

    let response = client
        .post("/api/auth/forgot-password")
        .header(ContentType::JSON)
        .header(csrf_header("not-the-issued-token"))
        .body(json!({"email": "testuser@example.com"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let reloaded = fixtures.reload(user.id).await.expect("user still exists");
    assert!(reloaded.password_reset_token.is_none());
    assert!(reloaded.password_reset_expires.is_none());
    assert!(mail.sent().await.is_empty());

    test_db.close().await;
}
