use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Unique column that an insert collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Username,
    Email,
}

impl DuplicateField {
    pub fn path(&self) -> &'static str {
        match self {
            DuplicateField::Username => "username",
            DuplicateField::Email => "email",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DuplicateField::Username => "Username already in use",
            DuplicateField::Email => "Email already in use",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("Unauthorized: No token provided")]
    MissingToken,
    #[error("Forbidden: Invalid token")]
    TokenInvalid,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("invalid or expired password change token")]
    InvalidChangePasswordToken,
    #[error("Password reset token is invalid or has expired.")]
    ResetTokenInvalid,
    #[error("invalid CSRF token")]
    CsrfInvalid,
    #[error("admin role required")]
    AdminRequired,
    #[error("{}", .0.message())]
    Duplicate(DuplicateField),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials | AuthError::MissingToken => Status::Unauthorized,
            AuthError::TokenInvalid
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidChangePasswordToken
            | AuthError::CsrfInvalid
            | AuthError::AdminRequired => Status::Forbidden,
            AuthError::ResetTokenInvalid | AuthError::Duplicate(_) => Status::BadRequest,
            AuthError::Config(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Join(_) => Status::InternalServerError,
        }
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}
