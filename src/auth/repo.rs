use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

const USER_COLUMNS: &str = "id, username, email, nama, satker, no_hp, password_hash, role, \
     last_login_at, reset_token_hash, reset_token_expires_at, created_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username or email already registered")]
    DuplicateIdentity,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted user records. Lookups are case-sensitive exact matches and every
/// mutation is a single-row atomic write.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Username matches win over email matches when both exist.
    async fn find_by_username_or_email(&self, identifier: &str) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// Whether `username` or `email` already belongs to an account.
    async fn identity_taken(&self, username: &str, email: &str) -> StoreResult<bool>;
    /// Fails with `DuplicateIdentity` when the username or email is taken.
    async fn create(&self, new_user: NewUser<'_>) -> StoreResult<User>;
    /// Unconditional overwrite. Password resets go through
    /// `complete_password_reset` instead.
    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()>;
    /// Overwrites any previous token, so at most one is live per user.
    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<()>;
    async fn clear_reset_token(&self, user_id: Uuid) -> StoreResult<()>;
    async fn touch_last_login(&self, user_id: Uuid) -> StoreResult<()>;
    /// Replaces the password hash and clears the reset fields in one write, but
    /// only while the stored token hash still equals `token_hash`. Returns
    /// whether the row was updated.
    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        password_hash: &str,
    ) -> StoreResult<bool>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username_or_email(&self, identifier: &str) -> StoreResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE username = $1 OR email = $1 \
             ORDER BY (username = $1) DESC \
             LIMIT 1"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(identifier)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn identity_taken(&self, username: &str, email: &str) -> StoreResult<bool> {
        let taken: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM users
            WHERE username = $1 OR email = $2
            LIMIT 1
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(taken.is_some())
    }

    async fn create(&self, new_user: NewUser<'_>) -> StoreResult<User> {
        if self.identity_taken(new_user.username, new_user.email).await? {
            return Err(StoreError::DuplicateIdentity);
        }

        let sql = format!(
            "INSERT INTO users (id, nama, email, satker, no_hp, username, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {USER_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_user.nama)
            .bind(new_user.email)
            .bind(new_user.satker)
            .bind(new_user.no_hp)
            .bind(new_user.username)
            .bind(new_user.password_hash)
            .bind(new_user.role)
            .fetch_one(&self.db)
            .await;

        match inserted {
            Ok(user) => Ok(user),
            // Lost the race between the pre-check and the insert.
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateIdentity),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET reset_token_hash = $2, reset_token_expires_at = $3
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn clear_reset_token(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET reset_token_hash = NULL, reset_token_expires_at = NULL
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn touch_last_login(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $3,
                   reset_token_hash = NULL,
                   reset_token_expires_at = NULL
             WHERE id = $1 AND reset_token_hash = $2 AND reset_token_expires_at > now()
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(password_hash)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code == "23505"),
        _ => false,
    }
}
