//! Administrative endpoints for managing moderator accounts.

use rocket::response::status::{Created, NoContent};
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use rocket_okapi::openapi;

use crate::auth::responses::{CreateUserRequest, CreateUserResponse};
use crate::auth::tokens::generate_temporary_password;
use crate::auth::validation::{
    FieldErrors, INVALID_EMAIL, is_valid_email, is_valid_username, normalize_email,
};
use crate::auth::{AuthState, CsrfProtected, NewUser, RequireAdmin};
use crate::error::ApiError;
use crate::models::{Role, UserProfile};
use crate::rate_limit::{ApiScope, RateLimited};
use crate::request_body::JsonBody;

const INVALID_USERNAME: &str = "Username must be between 3 and 30 printable characters";

/// Create a moderator with a generated temporary password.
#[openapi(tag = "Admin")]
#[post("/admin/users", data = "<payload>")]
pub async fn create_user(
    _rate: RateLimited<ApiScope>,
    _csrf: CsrfProtected,
    state: &State<AuthState>,
    admin: RequireAdmin,
    payload: JsonBody<CreateUserRequest>,
) -> Result<Created<Json<CreateUserResponse>>, ApiError> {
    let CreateUserRequest { username, email } = payload.into_inner();
    let username = username.trim().to_string();
    let email = normalize_email(&email);

    let mut errors = FieldErrors::new();
    errors.check(is_valid_username(&username), "username", INVALID_USERNAME);
    errors.check(is_valid_email(&email), "email", INVALID_EMAIL);
    errors.into_result()?;

    let mut errors = FieldErrors::new();
    if state.users.find_by_username(&username).await?.is_some() {
        errors.push("username", "Username already in use");
    }
    if state.users.find_by_email(&email).await?.is_some() {
        errors.push("email", "Email already in use");
    }
    errors.into_result()?;

    let temporary_password = generate_temporary_password();
    let user = state
        .users
        .insert(NewUser {
            username,
            email,
            password: temporary_password.clone(),
            role: Role::Moderator,
            needs_password_change: true,
        })
        .await?;

    log::info!("admin {} created moderator {}", admin.0.id, user.id);

    let body = CreateUserResponse {
        message: "Moderator created successfully".to_string(),
        user_id: user.id,
        username: user.username,
        email: user.email,
        temporary_password,
    };
    Ok(Created::new(format!("/api/admin/users/{}", user.id)).body(Json(body)))
}

/// List every account.
#[openapi(tag = "Admin")]
#[get("/admin/users")]
pub async fn list_users(
    _rate: RateLimited<ApiScope>,
    state: &State<AuthState>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    let users = state.users.list().await?;
    Ok(Json(users.iter().map(|user| user.profile()).collect()))
}

/// Delete a moderator account. Administrators can never be deleted here.
#[openapi(tag = "Admin")]
#[delete("/admin/users/<user_id>")]
pub async fn delete_user(
    _rate: RateLimited<ApiScope>,
    _csrf: CsrfProtected,
    state: &State<AuthState>,
    admin: RequireAdmin,
    user_id: i32,
) -> Result<NoContent, ApiError> {
    let target = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if target.id == admin.0.id {
        return Err(ApiError::Forbidden(
            "Administrators cannot delete their own account.".to_string(),
        ));
    }
    if target.is_admin() {
        return Err(ApiError::Forbidden(
            "Administrators cannot delete another administrator account.".to_string(),
        ));
    }

    if !state.users.delete(target.id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    log::info!("admin {} deleted user {}", admin.0.id, target.id);
    Ok(NoContent)
}
