//! User repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;

use crate::{
    models::{Scope, User, token::hash_plaintext},
    password::Password,
    repositories::{RepositoryError, RepositoryResult, UserRepository, with_deadline},
};

/// User repository
#[derive(Clone)]
pub struct UserModel {
    pool: PgPool,
}

impl UserModel {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password: Password::from_hash(row.try_get("password_hash")?),
        activated: row.try_get("activated")?,
        version: row.try_get("version")?,
    })
}

/// Unique violations on `users.email` become [`RepositoryError::DuplicateEmail`].
fn map_unique_email(err: RepositoryError) -> RepositoryError {
    match err {
        RepositoryError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            RepositoryError::DuplicateEmail
        }
        other => other,
    }
}

fn password_hash(user: &User) -> RepositoryResult<&[u8]> {
    user.password
        .hash()
        .ok_or_else(|| RepositoryError::Internal("missing password hash for user".to_string()))
}

#[async_trait]
impl UserRepository for UserModel {
    async fn insert(&self, user: &mut User) -> RepositoryResult<()> {
        let row = with_deadline(
            sqlx::query(
                r#"
                INSERT INTO users (name, email, password_hash, activated)
                VALUES ($1, $2, $3, $4)
                RETURNING id, created_at, version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(password_hash(user)?)
            .bind(user.activated)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(map_unique_email)?;

        user.id = row.get("id");
        user.created_at = row.get("created_at");
        user.version = row.get("version");
        info!(user_id = user.id, "user created");

        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> RepositoryResult<User> {
        let row = with_deadline(
            sqlx::query(
                r#"
                SELECT id, created_at, name, email, password_hash, activated, version
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(RepositoryError::NoRecord)?;

        Ok(user_from_row(&row)?)
    }

    async fn update(&self, user: &mut User) -> RepositoryResult<()> {
        let row = with_deadline(
            sqlx::query(
                r#"
                UPDATE users
                SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(password_hash(user)?)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool),
        )
        .await
        .map_err(map_unique_email)?
        .ok_or(RepositoryError::EditConflict)?;

        user.version = row.get("version");
        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> RepositoryResult<User> {
        let hash = hash_plaintext(plaintext);

        let row = with_deadline(
            sqlx::query(
                r#"
                SELECT users.id, users.created_at, users.name, users.email,
                       users.password_hash, users.activated, users.version
                FROM users
                INNER JOIN tokens ON users.id = tokens.user_id
                WHERE tokens.hash = $1
                AND tokens.scope = $2
                AND tokens.expiry > $3
                "#,
            )
            .bind(&hash[..])
            .bind(scope.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(RepositoryError::NoRecord)?;

        Ok(user_from_row(&row)?)
    }
}
