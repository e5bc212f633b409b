//! Outgoing account mail.
//!
//! [`MailService`] renders the messages; a [`MailTransport`] delivers them.
//! Production always talks to Mailgun's HTTP API, other environments fall
//! back to writing the message to the log when no credentials are set.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::config::{ConfigError, Environment, Lookup, optional, required};

const MAILGUN_API_BASE: &str = "https://api.mailgun.net/v3";
const MAIL_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RESET_PAGE: &str = "reset-password.html";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail provider returned status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct MailgunCredentials {
    pub api_key: String,
    pub domain: String,
    pub api_base: String,
}

impl std::fmt::Debug for MailgunCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailgunCredentials")
            .field("api_key", &"<redacted>")
            .field("domain", &self.domain)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub mailgun: Option<MailgunCredentials>,
    pub from_address: String,
}

impl MailConfig {
    /// Mailgun credentials are mandatory in production; elsewhere they are
    /// used only when both the key and the domain are present.
    pub fn from_lookup(lookup: Lookup<'_>, environment: Environment) -> Result<Self, ConfigError> {
        let (api_key, domain) = if environment.is_production() {
            (
                Some(required(lookup, "MAILGUN_API_KEY")?),
                Some(required(lookup, "MAILGUN_DOMAIN")?),
            )
        } else {
            (
                optional(lookup, "MAILGUN_API_KEY"),
                optional(lookup, "MAILGUN_DOMAIN"),
            )
        };

        let mailgun = match (api_key, domain) {
            (Some(api_key), Some(domain)) => Some(MailgunCredentials {
                api_key,
                domain,
                api_base: optional(lookup, "MAILGUN_API_BASE")
                    .unwrap_or_else(|| MAILGUN_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            }),
            _ => None,
        };

        let from_address = optional(lookup, "MAIL_FROM").unwrap_or_else(|| {
            let domain = mailgun
                .as_ref()
                .map(|creds| creds.domain.as_str())
                .unwrap_or("localhost");
            format!("Federation News <no-reply@{domain}>")
        });

        Ok(Self {
            mailgun,
            from_address,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Delivery backend. Returns the provider's message id when it reports one.
#[rocket::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<Option<String>, MailError>;
}

pub struct MailgunTransport {
    credentials: MailgunCredentials,
    http: Client,
}

impl MailgunTransport {
    pub fn new(credentials: MailgunCredentials) -> Result<Self, MailError> {
        let http = Client::builder().timeout(MAIL_REQUEST_TIMEOUT).build()?;
        Ok(Self { credentials, http })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.credentials.api_base, self.credentials.domain
        )
    }
}

#[derive(serde::Deserialize)]
struct MailgunResponse {
    id: Option<String>,
}

#[rocket::async_trait]
impl MailTransport for MailgunTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<Option<String>, MailError> {
        let form = [
            ("from", mail.from.as_str()),
            ("to", mail.to.as_str()),
            ("subject", mail.subject.as_str()),
            ("text", mail.text.as_str()),
            ("html", mail.html.as_str()),
        ];

        let response = self
            .http
            .post(self.messages_url())
            .basic_auth("api", Some(&self.credentials.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(MailError::Rejected { status, body });
        }

        let parsed: MailgunResponse = response.json().await?;
        debug!("mailgun accepted message {:?}", parsed.id);
        Ok(parsed.id)
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogTransport;

#[rocket::async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<Option<String>, MailError> {
        info!(
            "mail transport not configured; message to {} ({}):\n{}",
            mail.to, mail.subject, mail.text
        );
        Ok(None)
    }
}

/// Managed Rocket state used by the password-reset flow.
#[derive(Clone)]
pub struct MailService {
    transport: Arc<dyn MailTransport>,
    frontend_url: String,
    from_address: String,
}

impl MailService {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        frontend_url: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
            from_address: from_address.into(),
        }
    }

    pub fn from_config(config: &MailConfig, frontend_url: &str) -> Result<Self, MailError> {
        let transport: Arc<dyn MailTransport> = match &config.mailgun {
            Some(credentials) => Arc::new(MailgunTransport::new(credentials.clone())?),
            None => {
                warn!("MAILGUN_API_KEY/MAILGUN_DOMAIN not set; reset mail will only be logged");
                Arc::new(LogTransport)
            }
        };
        Ok(Self::new(transport, frontend_url, config.from_address.clone()))
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/{}?token={}", self.frontend_url, RESET_PAGE, token)
    }

    pub fn password_reset_mail(&self, to: &str, token: &str) -> OutgoingMail {
        let link = self.reset_link(token);
        OutgoingMail {
            to: to.to_string(),
            from: self.from_address.clone(),
            subject: "Password Reset Request".to_string(),
            text: format!(
                "You requested a password reset.\n\n\
                 Open the following link to choose a new password:\n{link}\n\n\
                 The link expires in 60 minutes. If you did not request this, ignore this email."
            ),
            html: format!(
                "<p>You requested a password reset.</p>\
                 <p><a href=\"{link}\">Choose a new password</a></p>\
                 <p>The link expires in 60 minutes. If you did not request this, ignore this email.</p>"
            ),
        }
    }

    pub async fn send_password_reset_email(
        &self,
        to: &str,
        token: &str,
    ) -> Result<Option<String>, MailError> {
        let mail = self.password_reset_mail(to, token);
        self.transport.send(&mail).await
    }
}
