//! Token repository for database operations

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    models::{Scope, Token},
    repositories::{RepositoryResult, TokenRepository, with_deadline},
};

/// Token repository
#[derive(Clone)]
pub struct TokenModel {
    pool: PgPool,
}

impl TokenModel {
    /// Create a new token repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for TokenModel {
    async fn insert(&self, token: &Token) -> RepositoryResult<()> {
        with_deadline(
            sqlx::query(
                r#"
                INSERT INTO tokens (hash, user_id, expiry, scope)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&token.hash[..])
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> RepositoryResult<()> {
        with_deadline(
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }
}
