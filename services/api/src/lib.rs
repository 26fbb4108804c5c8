//! Item catalog HTTP service
//!
//! JSON API over an item inventory with token-based authentication,
//! per-client rate limiting and optimistic concurrency on every write.

pub mod config;
pub mod error;
pub mod handlers;
pub mod json;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod server;
pub mod state;
pub mod validator;

pub use state::AppState;
