//! Shared harness for router-level tests
//!
//! Drives the real router against in-memory repositories and a mailer that
//! records what it would have sent.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use clap::Parser;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use item_service::{
    AppState,
    config::Config,
    mailer::{Email, Mailer, MailerError},
    models::{
        Filters, Item, Metadata, Permissions, Scope, Token, User,
        token::{TOKEN_LENGTH, hash_plaintext},
    },
    password::Password,
    rate_limiter::RateLimiter,
    repositories::{
        ItemRepository, PermissionRepository, Repositories, RepositoryError, RepositoryResult,
        TokenRepository, UserRepository,
    },
    routes::create_router,
};

pub const CLIENT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 40000);
pub const TRUSTED_ORIGIN: &str = "http://trusted.example";

#[derive(Default)]
struct Tables {
    items: BTreeMap<i64, Item>,
    users: BTreeMap<i64, User>,
    tokens: Vec<Token>,
    permissions: BTreeMap<i64, BTreeSet<String>>,
    next_item_id: i64,
    next_user_id: i64,
}

/// Repository implementations over plain collections.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn item(&self, id: i64) -> Option<Item> {
        self.tables().items.get(&id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.tables().users.len()
    }

    pub fn tokens_for(&self, user_id: i64, scope: Scope) -> usize {
        self.tables()
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.scope == scope)
            .count()
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            items: self.clone(),
            users: self.clone(),
            tokens: self.clone(),
            permissions: self.clone(),
        }
    }
}

fn tags_match(item: &Item, tags: &[String]) -> bool {
    tags.iter().all(|tag| item.tags.contains(tag))
}

fn name_matches(item: &Item, name: &str) -> bool {
    let words: Vec<String> = item
        .name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    name.split_whitespace()
        .all(|term| words.contains(&term.to_lowercase()))
}

fn compare(a: &Item, b: &Item, column: &str) -> std::cmp::Ordering {
    match column {
        "name" => a.name.cmp(&b.name),
        "model" => a.model.cmp(&b.model),
        "supplier" => a.supplier.cmp(&b.supplier),
        "price" => a.price.total_cmp(&b.price),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl ItemRepository for MemoryStore {
    async fn insert(&self, item: &mut Item) -> RepositoryResult<()> {
        let mut tables = self.tables();
        tables.next_item_id += 1;
        item.id = tables.next_item_id;
        item.created_at = Utc::now();
        item.updated_at = item.created_at;
        tables.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> RepositoryResult<Item> {
        if id < 1 {
            return Err(RepositoryError::NoRecord);
        }
        self.item(id).ok_or(RepositoryError::NoRecord)
    }

    async fn update(&self, item: &mut Item) -> RepositoryResult<()> {
        let mut tables = self.tables();
        let stored = tables
            .items
            .get_mut(&item.id)
            .filter(|stored| stored.updated_at == item.updated_at)
            .ok_or(RepositoryError::EditConflict)?;

        item.updated_at = Utc::now().max(stored.updated_at + Duration::microseconds(1));
        *stored = item.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepositoryResult<()> {
        self.tables()
            .items
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NoRecord)
    }

    async fn get_all(
        &self,
        name: &str,
        supplier: i64,
        tags: &[String],
        filters: &Filters,
    ) -> RepositoryResult<(Vec<Item>, Metadata)> {
        let column = filters
            .sort_column()
            .ok_or_else(|| RepositoryError::Internal("unsafe sort parameter".into()))?;

        let mut matched: Vec<Item> = self
            .tables()
            .items
            .values()
            .filter(|item| name.is_empty() || name_matches(item, name))
            .filter(|item| supplier == 0 || item.supplier == supplier)
            .filter(|item| tags_match(item, tags))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ordering = compare(a, b, column);
            let ordering = if filters.sort_direction() == "DESC" {
                ordering.reverse()
            } else {
                ordering
            };
            ordering.then(a.id.cmp(&b.id))
        });

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .collect();

        Ok((page, Metadata::calculate(total, filters.page, filters.page_size)))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &mut User) -> RepositoryResult<()> {
        let mut tables = self.tables();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::DuplicateEmail);
        }
        tables.next_user_id += 1;
        user.id = tables.next_user_id;
        user.created_at = Utc::now();
        user.version = 1;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> RepositoryResult<User> {
        self.tables()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(RepositoryError::NoRecord)
    }

    async fn update(&self, user: &mut User) -> RepositoryResult<()> {
        let mut tables = self.tables();
        let stored = tables
            .users
            .get_mut(&user.id)
            .filter(|stored| stored.version == user.version)
            .ok_or(RepositoryError::EditConflict)?;

        user.version += 1;
        *stored = user.clone();
        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> RepositoryResult<User> {
        let hash = hash_plaintext(plaintext);
        let now = Utc::now();
        let tables = self.tables();
        tables
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
            .and_then(|t| tables.users.get(&t.user_id))
            .cloned()
            .ok_or(RepositoryError::NoRecord)
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert(&self, token: &Token) -> RepositoryResult<()> {
        // Only the digest is kept, as in the database.
        let mut stored = token.clone();
        stored.plaintext = String::new();
        self.tables().tokens.push(stored);
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> RepositoryResult<()> {
        self.tables()
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> RepositoryResult<Permissions> {
        Ok(self
            .tables()
            .permissions
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> RepositoryResult<()> {
        self.tables()
            .permissions
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(|c| c.to_string()));
        Ok(())
    }
}

/// Mailer that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, Email)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, Email)> {
        self.sent.lock().unwrap().clone()
    }

    /// Activation token from the last welcome email sent to `recipient`.
    pub fn activation_token(&self, recipient: &str) -> Option<String> {
        let marker = "{\"token\": \"";
        self.sent()
            .into_iter()
            .rev()
            .find(|(to, _)| to == recipient)
            .and_then(|(_, email)| {
                let start = email.plain_body.find(marker)? + marker.len();
                email
                    .plain_body
                    .get(start..start + TOKEN_LENGTH)
                    .map(String::from)
            })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, email: Email) -> Result<(), MailerError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), email));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn config(extra: &[&str]) -> Config {
    let args = ["item-service", "--cors-trusted-origins", TRUSTED_ORIGIN]
        .into_iter()
        .chain(extra.iter().copied());
    Config::try_parse_from(args).unwrap()
}

/// App with the rate limiter switched off.
pub fn spawn_app() -> TestApp {
    spawn_app_with(config(&["--limiter-enabled", "false"]))
}

pub fn spawn_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::default());
    spawn_app_with_repositories(config, store.clone(), store.repositories())
}

pub fn spawn_app_with_repositories(
    config: Config,
    store: Arc<MemoryStore>,
    repositories: Repositories,
) -> TestApp {
    let mailer = Arc::new(RecordingMailer::default());
    let limiter = RateLimiter::new(config.rate_limiter()).unwrap();
    let state = AppState::new(config, repositories, mailer.clone(), limiter);
    let router = create_router(state.clone()).layer(MockConnectInfo(SocketAddr::from(CLIENT_ADDR)));

    TestApp {
        router,
        state,
        store,
        mailer,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        self.request(builder.body(body).unwrap()).await
    }

    /// Wait for every background task spawned so far.
    pub async fn settle(&self) {
        self.state.tracker.close();
        self.state.tracker.wait().await;
        self.state.tracker.reopen();
    }

    /// Store a user directly and hand back an authentication token for it.
    pub async fn seed_user(&self, email: &str, activated: bool, codes: &[&str]) -> (User, String) {
        let mut user = User {
            name: "Seeded".into(),
            email: email.into(),
            password: Password::default(),
            activated,
            ..User::default()
        };
        UserRepository::insert(self.store.as_ref(), &mut user)
            .await
            .unwrap();
        self.store.add_for_user(user.id, codes).await.unwrap();
        let token = self
            .store
            .new_token(user.id, Duration::hours(24), Scope::Authentication)
            .await
            .unwrap();
        (user, token.plaintext)
    }
}
