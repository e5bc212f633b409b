use argon2::password_hash::{self, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::RngCore;

use crate::auth::AuthResult;

const SALT_LEN: usize = 16;
const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

/// Argon2id hashing shared by account passwords and emailed reset tokens.
/// Neither is ever stored in plaintext.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    fn fresh_salt() -> AuthResult<SaltString> {
        let mut bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Ok(SaltString::encode_b64(&bytes)?)
    }

    pub fn hash_password(&self, secret: &str) -> AuthResult<String> {
        let salt = Self::fresh_salt()?;
        let encoded = self.argon2.hash_password(secret.as_bytes(), &salt)?;
        Ok(encoded.to_string())
    }

    /// `Ok(false)` on mismatch; a malformed stored hash is an error.
    pub fn verify_password(&self, secret: &str, stored_hash: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(stored_hash)?;
        match self.argon2.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Hashing costs tens of milliseconds, so request handlers go through
    /// the blocking pool.
    pub async fn hash_password_blocking(&self, secret: String) -> AuthResult<String> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.hash_password(&secret)).await?
    }

    pub async fn verify_password_blocking(
        &self,
        secret: String,
        stored_hash: String,
    ) -> AuthResult<bool> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.verify_password(&secret, &stored_hash))
            .await?
    }
}
