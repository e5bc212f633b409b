use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};

use crate::auth::{AuthConfig, AuthError, AuthResult};
use crate::models::Role;

const PASSWORD_CHANGE_PURPOSE: &str = "password_change";
const FINGERPRINT_BYTES: usize = 16;

/// Claims carried by every access token.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenClaims {
    pub user_id: i32,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of the short-lived token returned by login while a forced password
/// change is pending. `pwv` pins the token to the password hash it was
/// issued against, so it stops verifying once the password changes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PasswordChangeClaims {
    pub sub: String,
    pub purpose: String,
    pub pwv: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_ttl: Duration,
    change_password_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Config("JWT_SECRET must not be empty".into()));
        }

        let secret_bytes = config.jwt_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            change_password_ttl: Duration::seconds(config.change_password_token_ttl_secs),
        })
    }

    pub fn issue_access_token(
        &self,
        user_id: i32,
        username: &str,
        role: Role,
    ) -> AuthResult<SignedToken> {
        let now = Utc::now();
        let expires_at = now + self.access_token_ttl;

        let claims = AccessTokenClaims {
            user_id,
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedToken { token, expires_at })
    }

    /// Any signature, expiry or shape failure collapses into `TokenInvalid`.
    pub fn decode_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                log::debug!("rejected access token: {err}");
                AuthError::TokenInvalid
            })
    }

    pub fn issue_password_change_token(
        &self,
        user_id: i32,
        password_hash: &str,
    ) -> AuthResult<SignedToken> {
        let now = Utc::now();
        let expires_at = now + self.change_password_ttl;

        let claims = PasswordChangeClaims {
            sub: user_id.to_string(),
            purpose: PASSWORD_CHANGE_PURPOSE.to_string(),
            pwv: password_fingerprint(password_hash),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedToken { token, expires_at })
    }

    pub fn decode_password_change_token(&self, token: &str) -> AuthResult<PasswordChangeClaims> {
        let claims = decode::<PasswordChangeClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                log::debug!("rejected password change token: {err}");
                AuthError::InvalidChangePasswordToken
            })?;

        if claims.purpose != PASSWORD_CHANGE_PURPOSE {
            return Err(AuthError::InvalidChangePasswordToken);
        }

        Ok(claims)
    }
}

/// Short digest of a stored password hash, used to bind change tokens.
pub fn password_fingerprint(password_hash: &str) -> String {
    let digest = Sha256::digest(password_hash.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..FINGERPRINT_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    const TEST_JWT_SECRET: &str = "super-secret-test-key";

    fn make_service() -> JwtService {
        let config = AuthConfig::new(TEST_JWT_SECRET, "csrf-secret", Environment::Test);
        JwtService::from_config(&config).expect("jwt service")
    }

    #[test]
    fn issues_and_decodes_access_tokens() {
        let service = make_service();
        let token = service
            .issue_access_token(42, "testadmin", Role::Admin)
            .expect("issue token");

        let claims = service
            .decode_access_token(&token.token)
            .expect("decode token");

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.username, "testadmin");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn access_token_payload_uses_camel_case_claims() {
        let service = make_service();
        let token = service
            .issue_access_token(7, "mod", Role::Moderator)
            .expect("issue token");
        let payload = token.token.split('.').nth(1).expect("payload segment");
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).expect("base64"))
                .expect("json");
        assert_eq!(json["userId"], 7);
        assert_eq!(json["username"], "mod");
        assert_eq!(json["role"], "moderator");
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let service = make_service();
        let other = JwtService::from_config(&AuthConfig::new(
            "another-secret",
            "csrf-secret",
            Environment::Test,
        ))
        .expect("jwt service");
        let token = other
            .issue_access_token(1, "someone", Role::Admin)
            .expect("issue");
        assert!(matches!(
            service.decode_access_token(&token.token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn rejects_expired_access_tokens() {
        let service = make_service();
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            user_id: 1,
            username: "late".into(),
            role: Role::Moderator,
            iat: now - 1000,
            exp: now - 100,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
        )
        .expect("encode");
        assert!(matches!(
            service.decode_access_token(&token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn change_password_tokens_are_not_access_tokens() {
        let service = make_service();
        let change = service
            .issue_password_change_token(5, "$argon2id$hash")
            .expect("issue change token");
        assert!(service.decode_access_token(&change.token).is_err());

        let claims = service
            .decode_password_change_token(&change.token)
            .expect("decode change token");
        assert_eq!(claims.sub, "5");
        assert_eq!(claims.pwv, password_fingerprint("$argon2id$hash"));
        assert_eq!(claims.exp - claims.iat, 600);

        let access = service
            .issue_access_token(5, "user", Role::Moderator)
            .expect("issue access");
        assert!(matches!(
            service.decode_password_change_token(&access.token),
            Err(AuthError::InvalidChangePasswordToken)
        ));
    }

    #[test]
    fn fingerprint_changes_with_password_hash() {
        assert_ne!(password_fingerprint("hash-a"), password_fingerprint("hash-b"));
        assert_eq!(password_fingerprint("hash-a"), password_fingerprint("hash-a"));
    }

    #[test]
    fn rejects_empty_secret() {
        let config = AuthConfig::new("", "csrf", Environment::Test);
        assert!(matches!(
            JwtService::from_config(&config),
            Err(AuthError::Config(_))
        ));
    }
}
