use rocket::State;
use rocket::response::status::NoContent;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::auth::jwt::password_fingerprint;
use crate::auth::responses::{
    AccessTokenResponse, ForceChangePasswordRequest, LoginRequest, LoginResponse,
    PasswordChangeRequired, RefreshRequest, TokenPair,
};
use crate::auth::tokens::{constant_time_eq, generate_refresh_token, is_refresh_token_format};
use crate::auth::validation::{
    FieldErrors, PASSWORD_TOO_SHORT, check_new_password, is_long_enough_password,
};
use crate::auth::{AuthError, AuthResult, AuthState, AuthUser, CsrfProtected};
use crate::error::ApiError;
use crate::models::{User, UserProfile};
use crate::rate_limit::{ApiScope, RateLimited};
use crate::request_body::JsonBody;

/// Mints an access token plus a fresh refresh token, replacing any refresh
/// token the user already had.
async fn issue_session(state: &AuthState, user: &User) -> AuthResult<TokenPair> {
    let access = state
        .jwt
        .issue_access_token(user.id, &user.username, user.role)?;
    let refresh_token = generate_refresh_token();
    state
        .users
        .set_refresh_token(user.id, Some(&refresh_token))
        .await?;

    Ok(TokenPair {
        access_token: access.token,
        refresh_token,
    })
}

/// Exchange username and password for tokens, or for a change-password token
/// when the account still has its temporary password.
#[openapi(tag = "Auth")]
#[post("/admin/login", data = "<payload>")]
pub async fn login(
    _rate: RateLimited<ApiScope>,
    _csrf: CsrfProtected,
    state: &State<AuthState>,
    payload: JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let LoginRequest { username, password } = payload.into_inner();
    let username = username.trim();

    let mut errors = FieldErrors::new();
    errors.check(!username.is_empty(), "username", "Username is required");
    errors.check(is_long_enough_password(&password), "password", PASSWORD_TOO_SHORT);
    errors.into_result()?;

    let Some(user) = state.users.find_by_username(username).await? else {
        log::warn!("login failed: unknown username");
        return Err(AuthError::InvalidCredentials.into());
    };

    let verified = state
        .passwords
        .verify_password_blocking(password, user.password_hash.clone())
        .await?;
    if !verified {
        log::warn!("login failed: wrong password for user {}", user.id);
        return Err(AuthError::InvalidCredentials.into());
    }

    if user.needs_password_change {
        let change = state
            .jwt
            .issue_password_change_token(user.id, &user.password_hash)?;
        log::info!("user {} must change password before login", user.id);
        return Ok(Json(LoginResponse::PasswordChangeRequired(
            PasswordChangeRequired {
                needs_password_change: true,
                username: user.username,
                change_password_token: change.token,
            },
        )));
    }

    let tokens = issue_session(state, &user).await?;
    log::info!("user {} logged in", user.id);
    Ok(Json(LoginResponse::Tokens(tokens)))
}

/// Replace the temporary password using the token returned by login.
#[openapi(tag = "Auth")]
#[post("/admin/force-change-password", data = "<payload>")]
pub async fn force_change_password(
    _rate: RateLimited<ApiScope>,
    _csrf: CsrfProtected,
    state: &State<AuthState>,
    payload: JsonBody<ForceChangePasswordRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let ForceChangePasswordRequest {
        change_password_token,
        new_password,
        confirm_password,
    } = payload.into_inner();

    let mut errors = FieldErrors::new();
    errors.check(
        !change_password_token.trim().is_empty(),
        "changePasswordToken",
        "Change password token is required",
    );
    check_new_password(&mut errors, &new_password, &confirm_password);
    errors.into_result()?;

    let claims = state
        .jwt
        .decode_password_change_token(change_password_token.trim())?;
    let user_id: i32 = claims
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidChangePasswordToken)?;

    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .filter(|user| user.needs_password_change)
        .ok_or(AuthError::InvalidChangePasswordToken)?;

    let fingerprint = password_fingerprint(&user.password_hash);
    if !constant_time_eq(fingerprint.as_bytes(), claims.pwv.as_bytes()) {
        return Err(AuthError::InvalidChangePasswordToken.into());
    }

    if !state
        .users
        .change_password(user.id, &user.password_hash, new_password)
        .await?
    {
        return Err(AuthError::InvalidChangePasswordToken.into());
    }

    let tokens = issue_session(state, &user).await?;
    log::info!("user {} replaced temporary password", user.id);
    Ok(Json(tokens))
}

/// Trade a refresh token for a new access token. The refresh token stays valid.
#[openapi(tag = "Auth")]
#[post("/admin/refresh", data = "<payload>")]
pub async fn refresh(
    _rate: RateLimited<ApiScope>,
    _csrf: CsrfProtected,
    state: &State<AuthState>,
    payload: JsonBody<RefreshRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let refresh_token = payload.into_inner().refresh_token;

    let mut errors = FieldErrors::new();
    errors.check(
        is_refresh_token_format(&refresh_token),
        "refreshToken",
        "Refresh token must be 128 hexadecimal characters",
    );
    errors.into_result()?;

    let user = state
        .users
        .find_by_refresh_token(&refresh_token)
        .await?
        .ok_or(AuthError::InvalidRefreshToken)?;

    let access = state
        .jwt
        .issue_access_token(user.id, &user.username, user.role)?;
    Ok(Json(AccessTokenResponse {
        access_token: access.token,
    }))
}

/// Forget the caller's refresh token.
#[openapi(tag = "Auth")]
#[post("/admin/logout")]
pub async fn logout(
    _rate: RateLimited<ApiScope>,
    _csrf: CsrfProtected,
    state: &State<AuthState>,
    user: AuthUser,
) -> Result<NoContent, ApiError> {
    state.users.set_refresh_token(user.id, None).await?;
    log::info!("user {} logged out", user.id);
    Ok(NoContent)
}

/// Profile of the authenticated caller.
#[openapi(tag = "Auth")]
#[get("/admin/me")]
pub async fn me(
    _rate: RateLimited<ApiScope>,
    state: &State<AuthState>,
    user: AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    let account = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(account.profile()))
}
