//! Forgot/reset password flow.
//!
//! Initiation answers identically whether or not the address belongs to an
//! account, and the reset email goes out after the response. Only the argon2 hash of the emailed token is stored, so consuming
//! a token means verifying it against every pending reset.

use chrono::Utc;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::auth::responses::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest};
use crate::auth::tokens::generate_reset_token;
use crate::auth::validation::{
    FieldErrors, INVALID_EMAIL, check_new_password, is_valid_email, normalize_email,
};
use crate::auth::{AuthError, AuthResult, AuthState, CsrfProtected, UserStore};
use crate::error::ApiError;
use crate::mail::MailService;
use crate::rate_limit::{
    ApiScope, ForgotPasswordScope, RateLimited, ResetPasswordScope,
};
use crate::request_body::JsonBody;

pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";
pub const RESET_COMPLETED_MESSAGE: &str = "Password has been reset successfully.";

/// Start a password reset. The response never reveals whether the email is known.
#[openapi(tag = "Auth")]
#[post("/auth/forgot-password", data = "<payload>")]
pub async fn forgot_password(
    _rate: RateLimited<ApiScope>,
    _forgot_rate: RateLimited<ForgotPasswordScope>,
    _csrf: CsrfProtected,
    state: &State<AuthState>,
    mail: &State<MailService>,
    payload: JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = normalize_email(&payload.email);

    let mut errors = FieldErrors::new();
    errors.check(is_valid_email(&email), "email", INVALID_EMAIL);
    errors.into_result()?;

    match state.users.find_by_email(&email).await? {
        Some(user) => {
            let token = generate_reset_token();
            let expires_at = Utc::now() + state.config.password_reset_ttl();
            state
                .users
                .issue_password_reset(user.id, token.clone(), expires_at)
                .await?;
            log::info!("password reset issued for user {}", user.id);

            let mail = MailService::clone(mail);
            tokio::spawn(async move {
                match mail.send_password_reset_email(&user.email, &token).await {
                    Ok(Some(id)) => log::info!("password reset email queued as {}", id),
                    Ok(None) => {}
                    Err(err) => log::error!(
                        "failed to send password reset email to user {}: {}",
                        user.id,
                        err
                    ),
                }
            });
        }
        None => {
            // Same hashing cost as issuing a token.
            state
                .passwords
                .hash_password_blocking(generate_reset_token())
                .await?;
            log::debug!("password reset requested for unknown email");
        }
    }

    Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)))
}

/// Set a new password with a token from the reset email.
#[openapi(tag = "Auth")]
#[post("/auth/reset-password", data = "<payload>")]
pub async fn reset_password(
    _rate: RateLimited<ApiScope>,
    _reset_rate: RateLimited<ResetPasswordScope>,
    _csrf: CsrfProtected,
    state: &State<AuthState>,
    payload: JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let ResetPasswordRequest {
        token,
        new_password,
        confirm_password,
    } = payload.into_inner();
    let token = token.trim().to_string();

    let mut errors = FieldErrors::new();
    errors.check(!token.is_empty(), "token", "Token is required");
    check_new_password(&mut errors, &new_password, &confirm_password);
    errors.into_result()?;

    consume_reset_token(&state.users, token, new_password).await?;
    Ok(Json(MessageResponse::new(RESET_COMPLETED_MESSAGE)))
}

/// Finds the pending reset that `token` belongs to and applies the new
/// password. Expired rows are skipped before any hash is checked.
pub async fn consume_reset_token(
    users: &UserStore,
    token: String,
    new_password: String,
) -> AuthResult<i32> {
    let now = Utc::now();
    let passwords = users.passwords();

    for candidate in users.reset_candidates().await? {
        if candidate.expires_at <= now {
            continue;
        }
        let matches = passwords
            .verify_password_blocking(token.clone(), candidate.token_hash.clone())
            .await?;
        if !matches {
            continue;
        }

        if users
            .consume_password_reset(candidate.user_id, &candidate.token_hash, new_password, now)
            .await?
        {
            log::info!("password reset completed for user {}", candidate.user_id);
            return Ok(candidate.user_id);
        }
        break;
    }

    Err(AuthError::ResetTokenInvalid)
}
