use std::fmt;

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Moderator,
}

#[derive(Debug, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "admin" => Some(Role::Admin),
            "moderator" => Some(Role::Moderator),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::parse(&value).ok_or(UnknownRole(value))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full `users` row. Deliberately not `Serialize`: it carries the password
/// hash and token material; use [`UserProfile`] for responses.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub needs_password_change: bool,
    pub refresh_token: Option<String>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            needs_password_change: self.needs_password_change,
        }
    }
}

/// Public projection of a user; never includes secrets.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub needs_password_change: bool,
}

/// Row projection used by the password-reset scan.
#[derive(Debug, Clone, FromRow)]
pub struct ResetCandidate {
    pub user_id: i32,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles_only() {
        assert_eq!(Role::try_from("admin".to_string()).unwrap(), Role::Admin);
        assert_eq!(
            Role::try_from("moderator".to_string()).unwrap(),
            Role::Moderator
        );
        assert!(Role::try_from("user".to_string()).is_err());
        assert_eq!(Role::default(), Role::Moderator);
    }

    #[test]
    fn profile_serializes_without_secrets() {
        let now = Utc::now();
        let user = User {
            id: 3,
            username: "newModTest".into(),
            email: "newmod@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::Moderator,
            needs_password_change: true,
            refresh_token: Some("f".repeat(128)),
            password_reset_token: None,
            password_reset_expires: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(user.profile()).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "id": 3,
                "username": "newModTest",
                "email": "newmod@example.com",
                "role": "moderator",
                "needsPasswordChange": true
            })
        );
    }
}
