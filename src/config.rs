//! Process configuration, read once from the environment at startup.
//!
//! Every value goes through a lookup closure so the parsing rules can be
//! exercised in tests without touching the real process environment.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;

use crate::auth::AuthConfig;
use crate::mail::MailConfig;

/// Smallest accepted JSON body limit (1 MiB).
pub const MIN_JSON_LIMIT_BYTES: u64 = 1024 * 1024;
const DEFAULT_PORT: u16 = 8000;

/// Borrowed environment accessor; returns `None` for unset variables.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Deployment flavour; controls cookie attributes, error verbosity and
/// whether mail credentials are mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid {
                name: "APP_ENV",
                reason: format!("unknown environment '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP-level settings shared by the request pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub address: IpAddr,
    pub port: u16,
    pub cors_origin: String,
    pub frontend_url: String,
    pub json_limit_bytes: u64,
    /// Header carrying the client address when behind a proxy. Unset means
    /// only the socket peer address identifies a client.
    pub trusted_ip_header: Option<String>,
}

impl AppConfig {
    pub fn from_lookup(lookup: Lookup<'_>, environment: Environment) -> Result<Self, ConfigError> {
        let address = match optional(lookup, "BIND_ADDRESS") {
            Some(raw) => raw.parse::<IpAddr>().map_err(|err| ConfigError::Invalid {
                name: "BIND_ADDRESS",
                reason: err.to_string(),
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let port = parse_or(lookup, "PORT", DEFAULT_PORT)?;
        let json_limit_bytes = parse_or(lookup, "JSON_LIMIT_BYTES", MIN_JSON_LIMIT_BYTES)?;
        if json_limit_bytes < MIN_JSON_LIMIT_BYTES {
            return Err(ConfigError::Invalid {
                name: "JSON_LIMIT_BYTES",
                reason: format!("must be at least {MIN_JSON_LIMIT_BYTES} bytes"),
            });
        }

        Ok(Self {
            environment,
            address,
            port,
            cors_origin: required(lookup, "CORS_ORIGIN")?,
            frontend_url: required(lookup, "FRONTEND_URL")?
                .trim_end_matches('/')
                .to_string(),
            json_limit_bytes,
            trusted_ip_header: optional(lookup, "TRUSTED_IP_HEADER")
                .map(|header| header.trim().to_string())
                .filter(|header| !header.is_empty()),
        })
    }
}

/// Everything the server needs to boot.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app: AppConfig,
    pub database_url: String,
    pub auth: AuthConfig,
    pub mail: MailConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let environment = match optional(lookup, "APP_ENV") {
            Some(raw) => Environment::parse(&raw)?,
            None => Environment::Development,
        };

        Ok(Self {
            app: AppConfig::from_lookup(lookup, environment)?,
            database_url: required(lookup, "DATABASE_URL")?,
            auth: AuthConfig::from_lookup(lookup, environment)?,
            mail: MailConfig::from_lookup(lookup, environment)?,
        })
    }
}

/// Returns the trimmed value, treating blank strings as unset.
pub fn optional(lookup: Lookup<'_>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn required(lookup: Lookup<'_>, name: &'static str) -> Result<String, ConfigError> {
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

pub fn parse_or<T>(lookup: Lookup<'_>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match optional(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}
