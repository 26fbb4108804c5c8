//! Repositories for database operations
//!
//! Each entity has a trait describing its storage contract and a PostgreSQL
//! implementation. Handlers only see the traits, bundled in [`Repositories`].

use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use std::{future::Future, sync::Arc};
use thiserror::Error;

use crate::models::{Filters, Item, Metadata, Permissions, Scope, Token, User};

pub mod item;
pub mod permission;
pub mod token;
pub mod user;

pub use item::ItemModel;
pub use permission::PermissionModel;
pub use token::TokenModel;
pub use user::UserModel;

/// Deadline applied to every database call.
pub const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found")]
    NoRecord,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("database call exceeded {QUERY_TIMEOUT:?}")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Run a query under [`QUERY_TIMEOUT`].
pub(crate) async fn with_deadline<T, F>(query: F) -> RepositoryResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    tokio::time::timeout(QUERY_TIMEOUT, query)
        .await
        .map_err(|_| RepositoryError::Timeout)?
        .map_err(RepositoryError::from)
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Store `item`, filling in its id and timestamps.
    async fn insert(&self, item: &mut Item) -> RepositoryResult<()>;

    async fn get(&self, id: i64) -> RepositoryResult<Item>;

    /// Compare-and-swap on `(id, updated_at)`; writes back the new `updated_at`.
    async fn update(&self, item: &mut Item) -> RepositoryResult<()>;

    async fn delete(&self, id: i64) -> RepositoryResult<()>;

    /// Page through items matching the name query, supplier and tags.
    ///
    /// Empty `name`, zero `supplier` and empty `tags` match everything.
    async fn get_all(
        &self,
        name: &str,
        supplier: i64,
        tags: &[String],
        filters: &Filters,
    ) -> RepositoryResult<(Vec<Item>, Metadata)>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Store `user`, filling in its id, creation time and version.
    async fn insert(&self, user: &mut User) -> RepositoryResult<()>;

    async fn get_by_email(&self, email: &str) -> RepositoryResult<User>;

    /// Compare-and-swap on `(id, version)`; bumps `version` on success.
    async fn update(&self, user: &mut User) -> RepositoryResult<()>;

    /// Owner of an unexpired token with the given scope and plaintext.
    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> RepositoryResult<User>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: &Token) -> RepositoryResult<()>;

    /// Remove every token of `scope` held by `user_id`.
    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> RepositoryResult<()>;

    /// Mint and store a token, returning it with its plaintext.
    async fn new_token(&self, user_id: i64, ttl: Duration, scope: Scope) -> RepositoryResult<Token> {
        let token = Token::generate(user_id, ttl, scope);
        self.insert(&token).await?;
        Ok(token)
    }
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> RepositoryResult<Permissions>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> RepositoryResult<()>;
}

/// Every repository the handlers use.
#[derive(Clone)]
pub struct Repositories {
    pub items: Arc<dyn ItemRepository>,
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub permissions: Arc<dyn PermissionRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            items: Arc::new(ItemModel::new(pool.clone())),
            users: Arc::new(UserModel::new(pool.clone())),
            tokens: Arc::new(TokenModel::new(pool.clone())),
            permissions: Arc::new(PermissionModel::new(pool)),
        }
    }
}
