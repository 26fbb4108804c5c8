//! Permission repository for database operations

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    models::Permissions,
    repositories::{PermissionRepository, RepositoryResult, with_deadline},
};

/// Permission repository
#[derive(Clone)]
pub struct PermissionModel {
    pool: PgPool,
}

impl PermissionModel {
    /// Create a new permission repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionRepository for PermissionModel {
    async fn get_all_for_user(&self, user_id: i64) -> RepositoryResult<Permissions> {
        let codes: Vec<String> = with_deadline(
            sqlx::query_scalar(
                r#"
                SELECT permissions.code
                FROM permissions
                INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                WHERE users_permissions.user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(codes.into_iter().collect())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> RepositoryResult<()> {
        let codes: Vec<String> = codes.iter().map(|code| code.to_string()).collect();

        with_deadline(
            sqlx::query(
                r#"
                INSERT INTO users_permissions (user_id, permission_id)
                SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(&codes)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }
}
