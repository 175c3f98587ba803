use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role, stored as the Postgres enum `user_role`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub nama: String,
    pub satker: Option<String>,
    pub no_hp: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string
    pub role: Role,
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>, // sha256 hex of the emailed token
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Fields needed to insert a user. The password is already hashed.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub nama: &'a str,
    pub email: &'a str,
    pub satker: Option<&'a str>,
    pub no_hp: Option<&'a str>,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
}
