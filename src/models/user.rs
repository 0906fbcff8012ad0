use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use validator::{Validate, ValidationError};

lazy_static! {
    // Regex for username validation: alphanumeric, underscores, hyphens
    pub static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, reset_code, reset_code_expires_at, created_at, updated_at";

/// A row of the `users` table. Never serialized; use [`UserProfile`] for responses.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub reset_code: Option<String>,
    pub reset_code_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl User {
    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        pool: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .await
    }

    /// Updates whichever of username/email is given. `None` when the user is gone.
    pub async fn update_profile(
        pool: &PgPool,
        id: i32,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET username = COALESCE($2, username), email = COALESCE($3, email), updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(username)
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_password(pool: &PgPool, id: i32, password_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_reset_code(
        pool: &PgPool,
        id: i32,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET reset_code = $2, reset_code_expires_at = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(code)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Replaces the password if `code` is the user's current, unexpired reset code,
    /// clearing the code in the same statement so it cannot be replayed.
    pub async fn reset_password_with_code(
        pool: &PgPool,
        email: &str,
        code: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users
             SET password_hash = $3, reset_code = NULL, reset_code_expires_at = NULL, updated_at = NOW()
             WHERE email = $1 AND reset_code = $2 AND reset_code_expires_at > NOW()",
        )
        .bind(email)
        .bind(code)
        .bind(password_hash)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// Random six-digit reset code.
pub fn generate_reset_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// True when `err` is a Postgres unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// Body of `PUT /api/user/edit-user`. At least one field is required.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_profile_update"))]
pub struct UpdateUserRequest {
    #[validate(
        length(min = 4, max = 50),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: Option<String>,
    #[validate(email, length(max = 100))]
    pub email: Option<String>,
}

fn validate_profile_update(input: &UpdateUserRequest) -> Result<(), ValidationError> {
    if input.username.is_none() && input.email.is_none() {
        let mut err = ValidationError::new("empty_update");
        err.message = Some("Provide a username or an email".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 6, max = 100))]
    pub old_password: String,
    #[validate(length(min = 8, max = 100))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    #[validate(email, length(min = 5, max = 100))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub reset_code: String,
    #[validate(length(min = 8, max = 100))]
    pub new_password: String,
}
