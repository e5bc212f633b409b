use std::fmt;

use chrono::Duration;
use rocket::http::SameSite;

use crate::config::{ConfigError, Environment, Lookup, optional, parse_or, required};

const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// Authentication configuration loaded from environment variables.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub csrf_secret: String,
    pub access_token_ttl_secs: i64,
    pub change_password_token_ttl_secs: i64,
    pub password_reset_ttl_secs: i64,
    pub csrf_cookie_name: String,
    pub csrf_header_name: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
}

impl AuthConfig {
    /// Defaults for everything except the two secrets; cookie attributes
    /// follow the environment (strict + secure only in production).
    pub fn new(
        jwt_secret: impl Into<String>,
        csrf_secret: impl Into<String>,
        environment: Environment,
    ) -> Self {
        let production = environment.is_production();
        Self {
            jwt_secret: jwt_secret.into(),
            csrf_secret: csrf_secret.into(),
            access_token_ttl_secs: 15 * 60,
            change_password_token_ttl_secs: 10 * 60,
            password_reset_ttl_secs: 60 * 60,
            csrf_cookie_name: "__Host-x-csrf-token".into(),
            csrf_header_name: "x-csrf-token".into(),
            cookie_secure: production,
            cookie_same_site: if production {
                SameSite::Strict
            } else {
                SameSite::Lax
            },
        }
    }

    pub fn from_lookup(lookup: Lookup<'_>, environment: Environment) -> Result<Self, ConfigError> {
        let jwt_secret = required(lookup, "JWT_SECRET")?;
        let csrf_secret = required(lookup, "CSRF_SECRET")?;

        if environment.is_production() {
            for (name, secret) in [("JWT_SECRET", &jwt_secret), ("CSRF_SECRET", &csrf_secret)] {
                if secret.len() < MIN_PRODUCTION_SECRET_LEN {
                    return Err(ConfigError::Invalid {
                        name,
                        reason: format!(
                            "must be at least {MIN_PRODUCTION_SECRET_LEN} bytes in production"
                        ),
                    });
                }
            }
        }

        let mut config = Self::new(jwt_secret, csrf_secret, environment);
        config.access_token_ttl_secs =
            parse_or(lookup, "ACCESS_TOKEN_TTL_SECS", config.access_token_ttl_secs)?;
        if let Some(name) = optional(lookup, "CSRF_COOKIE_NAME") {
            config.csrf_cookie_name = name;
        }

        Ok(config)
    }

    pub fn password_reset_ttl(&self) -> Duration {
        Duration::seconds(self.password_reset_ttl_secs)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("csrf_secret", &"<redacted>")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field(
                "change_password_token_ttl_secs",
                &self.change_password_token_ttl_secs,
            )
            .field("password_reset_ttl_secs", &self.password_reset_ttl_secs)
            .field("csrf_cookie_name", &self.csrf_cookie_name)
            .field("csrf_header_name", &self.csrf_header_name)
            .field("cookie_secure", &self.cookie_secure)
            .field("cookie_same_site", &self.cookie_same_site)
            .finish()
    }
}
