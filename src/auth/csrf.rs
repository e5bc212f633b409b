//! Double-submit CSRF protection.
//!
//! The cookie carries `<token>.<hex hmac(token)>`; the client echoes the
//! token in the `x-csrf-token` header. A request passes only when the header
//! matches the cookie's token and the cookie's MAC verifies under the
//! process-wide secret.

use hmac::{Hmac, Mac};
use rocket::http::{Cookie, CookieJar, Method};
use rocket::request::{FromRequest, Outcome};
use rocket::serde::json::Json;
use rocket::{Request, State};
use rocket_okapi::request::OpenApiFromRequest;
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::auth::tokens::{constant_time_eq, generate_csrf_token};
use crate::auth::{AuthConfig, AuthError, AuthResult, AuthState};
use crate::error::{ApiError, reject};
use crate::rate_limit::{ApiScope, RateLimited};

type HmacSha256 = Hmac<Sha256>;

pub struct IssuedCsrfToken {
    pub token: String,
    pub cookie_value: String,
}

#[derive(Clone)]
pub struct CsrfService {
    mac: HmacSha256,
    cookie_name: String,
    header_name: String,
    cookie_secure: bool,
    cookie_same_site: rocket::http::SameSite,
}

impl CsrfService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        if config.csrf_secret.is_empty() {
            return Err(AuthError::Config("CSRF_SECRET must not be empty".into()));
        }
        let mac = HmacSha256::new_from_slice(config.csrf_secret.as_bytes())
            .map_err(|err| AuthError::Config(format!("invalid CSRF secret: {err}")))?;

        Ok(Self {
            mac,
            cookie_name: config.csrf_cookie_name.clone(),
            header_name: config.csrf_header_name.clone(),
            cookie_secure: config.cookie_secure,
            cookie_same_site: config.cookie_same_site,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    fn sign(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn issue(&self) -> IssuedCsrfToken {
        let token = generate_csrf_token();
        let cookie_value = format!("{}.{}", token, self.sign(&token));
        IssuedCsrfToken {
            token,
            cookie_value,
        }
    }

    pub fn cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(self.cookie_same_site)
            .build()
    }

    /// True when `header` is the token bound into `cookie_value`.
    pub fn verify(&self, header: &str, cookie_value: &str) -> bool {
        let Some((token, signature)) = cookie_value.split_once('.') else {
            return false;
        };
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            return false;
        }

        !token.is_empty() && constant_time_eq(header.as_bytes(), token.as_bytes())
    }
}

/// Guard for every state-changing route. Safe methods pass through.
#[derive(Debug, OpenApiFromRequest)]
pub struct CsrfProtected;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CsrfProtected {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if matches!(request.method(), Method::Get | Method::Head | Method::Options) {
            return Outcome::Success(CsrfProtected);
        }

        let Some(state) = request.rocket().state::<AuthState>() else {
            return reject(
                request,
                ApiError::InternalError("AuthState not available".into()),
            );
        };
        let csrf = &state.csrf;

        let header = request.headers().get_one(csrf.header_name());
        let cookie = request.cookies().get(csrf.cookie_name());

        match (header, cookie) {
            (Some(header), Some(cookie)) if csrf.verify(header, cookie.value()) => {
                Outcome::Success(CsrfProtected)
            }
            _ => {
                log::warn!(
                    "rejected {} {}: CSRF token missing or mismatched",
                    request.method(),
                    request.uri().path()
                );
                reject(request, AuthError::CsrfInvalid.into())
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Issue a fresh CSRF token and set the matching cookie.
#[openapi(tag = "Auth")]
#[get("/csrf-token")]
pub fn csrf_token(
    _rate: RateLimited<ApiScope>,
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
) -> Json<CsrfTokenResponse> {
    let issued = state.csrf.issue();
    cookies.add(state.csrf.cookie(issued.cookie_value));
    Json(CsrfTokenResponse {
        csrf_token: issued.token,
    })
}
