//! HTTP-facing error type and the terminal error formatting.
//!
//! Handlers return [`ApiError`]; request guards call [`reject`], which stashes
//! the rendered body in request-local cache so the registered catchers emit
//! exactly the same JSON shape.

use rocket::http::Status;
use rocket::request::Outcome;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Request, catch};
use rocket_okapi::gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::util::add_schema_response;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::config::{AppConfig, Environment};

pub const VALIDATION_MESSAGE: &str = "Validation Error";
const INTERNAL_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub msg: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            msg: msg.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ErrorBody {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: None,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    TooManyRequests(String),
    PayloadTooLarge(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::TooManyRequests(_) => Status::TooManyRequests,
            ApiError::PayloadTooLarge(_) => Status::PayloadTooLarge,
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => {
                Status::InternalServerError
            }
        }
    }

    /// Response body for this error. Server-side failures only reveal their
    /// text outside production.
    pub fn body(&self, environment: Environment) -> ErrorBody {
        match self {
            ApiError::Validation(errors) => ErrorBody {
                message: VALIDATION_MESSAGE.to_string(),
                errors: Some(errors.clone()),
            },
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::PayloadTooLarge(msg) => ErrorBody::message(msg.clone()),
            ApiError::DatabaseError(_) | ApiError::InternalError(_)
                if environment.is_production() =>
            {
                ErrorBody::message(INTERNAL_MESSAGE)
            }
            ApiError::DatabaseError(err) => ErrorBody::message(format!("database error: {err}")),
            ApiError::InternalError(msg) => ErrorBody::message(msg.clone()),
        }
    }

    fn log(&self) {
        match self {
            ApiError::DatabaseError(e) => log::error!("database error: {}", e),
            ApiError::InternalError(msg) => log::error!("internal error: {}", msg),
            ApiError::Validation(errors) => log::debug!("validation failed: {:?}", errors),
            other => log::debug!("request rejected ({}): {:?}", other.status().code, other),
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        self.log();
        let status = self.status();
        let body = self.body(environment_of(request));
        (status, Json(body)).respond_to(request)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::DatabaseError(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Duplicate(field) => {
                ApiError::Validation(vec![FieldError::new(field.path(), field.message())])
            }
            AuthError::ResetTokenInvalid => ApiError::BadRequest(err.to_string()),
            AuthError::InvalidCredentials | AuthError::MissingToken => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::TokenInvalid
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidChangePasswordToken
            | AuthError::CsrfInvalid
            | AuthError::AdminRequired => ApiError::Forbidden(err.to_string()),
            AuthError::Sqlx(inner) => ApiError::DatabaseError(inner),
            AuthError::Config(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Join(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        let schema = generator.json_schema::<ErrorBody>();
        for status in [400, 401, 403, 404, 413, 429, 500] {
            add_schema_response(&mut responses, status, "application/json", schema.clone())?;
        }
        Ok(responses)
    }
}

/// Rejection recorded by a request guard for the catchers to render.
struct StashedError(Option<(Status, ErrorBody)>);

/// Records `error` for the catchers and fails the guard with its status.
pub fn reject<S>(request: &Request<'_>, error: ApiError) -> Outcome<S, ApiError> {
    let status = stash(request, &error);
    Outcome::Error((status, error))
}

/// Stashes the rendered `error` for the catchers and returns its status.
/// Shared by request guards and data guards.
pub fn stash(request: &Request<'_>, error: &ApiError) -> Status {
    error.log();
    let status = error.status();
    let body = error.body(environment_of(request));
    request.local_cache(|| StashedError(Some((status, body))));
    status
}

/// Environment of the running instance; unknown means production so that
/// internal details stay hidden.
pub fn environment_of(request: &Request<'_>) -> Environment {
    request
        .rocket()
        .state::<AppConfig>()
        .map(|config| config.environment)
        .unwrap_or(Environment::Production)
}

#[catch(default)]
pub fn default_catcher(status: Status, request: &Request<'_>) -> (Status, Json<ErrorBody>) {
    if let StashedError(Some((stashed_status, body))) = request.local_cache(|| StashedError(None))
    {
        return (*stashed_status, Json(body.clone()));
    }

    let message = if status.code >= 500 && environment_of(request).is_production() {
        INTERNAL_MESSAGE
    } else {
        status.reason().unwrap_or("Error")
    };
    (status, Json(ErrorBody::message(message)))
}
