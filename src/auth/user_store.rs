use std::ops::DerefMut;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool};

use crate::auth::{AuthError, AuthResult, DuplicateField, PasswordService};
use crate::models::{ResetCandidate, Role, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, needs_password_change, \
     refresh_token, password_reset_token, password_reset_expires, created_at, updated_at";

/// Applies a new password hash and clears every outstanding credential.
const APPLY_PASSWORD_CHANGE: &str = r#"
    UPDATE users
    SET password_hash = $2,
        needs_password_change = FALSE,
        password_reset_token = NULL,
        password_reset_expires = NULL,
        refresh_token = NULL,
        updated_at = NOW()
    WHERE id = $1
"#;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub needs_password_change: bool,
}

/// Access to the `users` table. Plaintext passwords and reset tokens are
/// hashed here before they reach the database.
#[derive(Clone)]
pub struct UserStore {
    pool: PgPool,
    passwords: Arc<PasswordService>,
}

impl UserStore {
    pub fn new(pool: PgPool, passwords: Arc<PasswordService>) -> Self {
        Self { pool, passwords }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn passwords(&self) -> &PasswordService {
        &self.passwords
    }

    pub async fn insert(&self, user: NewUser) -> AuthResult<User> {
        let password_hash = self.passwords.hash_password_blocking(user.password).await?;

        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role, needs_password_change) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&password_hash)
            .bind(user.role.as_str())
            .bind(user.needs_password_change)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    pub async fn find_by_id(&self, id: i32) -> AuthResult<Option<User>> {
        self.find_one("id = $1", id).await
    }

    pub async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        self.find_one("username = $1", username).await
    }

    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        self.find_one("email = $1", email).await
    }

    pub async fn find_by_refresh_token(&self, token: &str) -> AuthResult<Option<User>> {
        self.find_one("refresh_token = $1", token).await
    }

    async fn find_one<T>(&self, predicate: &str, value: T) -> AuthResult<Option<User>>
    where
        T: Send + for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn list(&self) -> AuthResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn set_refresh_token(&self, id: i32, token: Option<&str>) -> AuthResult<()> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stores the hash of `plaintext` as the pending reset token for `id`.
    pub async fn issue_password_reset(
        &self,
        id: i32,
        plaintext: String,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let token_hash = self.passwords.hash_password_blocking(plaintext).await?;
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token = $2,
                password_reset_expires = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every user with a pending reset, oldest account first.
    pub async fn reset_candidates(&self) -> AuthResult<Vec<ResetCandidate>> {
        let candidates = sqlx::query_as::<_, ResetCandidate>(
            r#"
            SELECT id AS user_id,
                   password_reset_token AS token_hash,
                   password_reset_expires AS expires_at
            FROM users
            WHERE password_reset_token IS NOT NULL
              AND password_reset_expires IS NOT NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(candidates)
    }

    /// Completes a reset for `id` if its pending token is still `expected_hash`
    /// and unexpired at `now`. Returns `false` when another request consumed
    /// or replaced the token first.
    pub async fn consume_password_reset(
        &self,
        id: i32,
        expected_hash: &str,
        new_password: String,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let new_hash = self.passwords.hash_password_blocking(new_password).await?;

        let mut tx = self.pool.begin().await?;

        let pending: Option<(Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT password_reset_token, password_reset_expires FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

        let still_valid = matches!(
            pending,
            Some((Some(ref hash), Some(expires))) if hash == expected_hash && expires > now
        );
        if !still_valid {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(APPLY_PASSWORD_CHANGE)
            .bind(id)
            .bind(&new_hash)
            .execute(tx.deref_mut())
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Sets a new password if the stored hash is still `expected_old_hash`.
    /// Returns `false` when the password changed concurrently.
    pub async fn change_password(
        &self,
        id: i32,
        expected_old_hash: &str,
        new_password: String,
    ) -> AuthResult<bool> {
        let new_hash = self.passwords.hash_password_blocking(new_password).await?;

        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(tx.deref_mut())
                .await?;

        if current.as_deref() != Some(expected_old_hash) {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(APPLY_PASSWORD_CHANGE)
            .bind(id)
            .bind(&new_hash)
            .execute(tx.deref_mut())
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn delete(&self, id: i32) -> AuthResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn map_unique_violation(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            match db_err.constraint() {
                Some("users_username_key") => {
                    return AuthError::Duplicate(DuplicateField::Username);
                }
                Some("users_email_key") => return AuthError::Duplicate(DuplicateField::Email),
                _ => {}
            }
        }
    }
    AuthError::Sqlx(err)
}
