//! Authentication module: configuration, credential storage, token minting,
//! CSRF protection, Rocket request guards, and HTTP route handlers.

use std::sync::Arc;

use rocket_db_pools::sqlx::PgPool;

pub mod config;
pub mod csrf;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod password_reset;
pub mod passwords;
pub mod responses;
pub mod routes;
pub mod tokens;
pub mod user_store;
pub mod validation;

pub use config::AuthConfig;
pub use csrf::{CsrfProtected, CsrfService};
pub use error::{AuthError, AuthResult, DuplicateField};
pub use guards::{AuthUser, RequireAdmin};
pub use jwt::JwtService;
pub use passwords::PasswordService;
pub use user_store::{NewUser, UserStore};

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub passwords: Arc<PasswordService>,
    pub jwt: Arc<JwtService>,
    pub csrf: Arc<CsrfService>,
    pub users: UserStore,
}

impl AuthState {
    pub fn new(config: AuthConfig, pool: PgPool) -> AuthResult<Self> {
        let passwords = Arc::new(PasswordService::new()?);
        let jwt = Arc::new(JwtService::from_config(&config)?);
        let csrf = Arc::new(CsrfService::from_config(&config)?);
        let users = UserStore::new(pool, Arc::clone(&passwords));

        Ok(Self {
            config,
            passwords,
            jwt,
            csrf,
            users,
        })
    }
}
