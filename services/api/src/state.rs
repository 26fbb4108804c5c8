//! Application state shared across handlers

use futures::FutureExt;
use sqlx::PgPool;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::error;

use crate::{
    config::Config, mailer::Mailer, metrics::Metrics, rate_limiter::RateLimiter,
    repositories::Repositories,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repositories: Repositories,
    pub mailer: Arc<dyn Mailer>,
    pub limiter: RateLimiter,
    pub metrics: Arc<Metrics>,
    /// Fire-and-forget work the server waits on before exiting
    pub tracker: TaskTracker,
    /// Source of the pool gauges on `/debug/vars`; absent when the
    /// repositories are not database-backed.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        config: Config,
        repositories: Repositories,
        mailer: Arc<dyn Mailer>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            config: Arc::new(config),
            repositories,
            mailer,
            limiter,
            metrics: Arc::new(Metrics::new()),
            tracker: TaskTracker::new(),
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Run `task` in the background.
    ///
    /// The task is registered with the tracker before it is spawned. A panic
    /// inside it is logged and goes no further.
    pub fn background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                error!(panic = panic_message(panic.as_ref()), "background task panicked");
            }
        });
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
