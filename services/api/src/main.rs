use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

use common::database::init_pool;
use item_service::{
    AppState,
    config::{Config, VERSION},
    mailer::SmtpMailer,
    rate_limiter::RateLimiter,
    repositories::Repositories,
    server,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    if config.version {
        println!("Version:\t{VERSION}");
        return Ok(());
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(config).await {
        error!(error = format!("{err:#}"), "item service exited with an error");
        return Err(err);
    }
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let pool = init_pool(&config.database())
        .await
        .context("failed to open database pool")?;

    let mailer = SmtpMailer::new(&config.smtp()).context("failed to configure mailer")?;
    let limiter = RateLimiter::new(config.rate_limiter()).context("invalid rate limiter")?;

    let state = AppState::new(
        config,
        Repositories::new(pool.clone()),
        Arc::new(mailer),
        limiter.clone(),
    )
    .with_pool(pool);

    let shutdown = CancellationToken::new();
    let janitor = limiter.spawn_janitor(shutdown.clone());
    let signals = tokio::spawn(server::shutdown_on_signal(shutdown.clone()));

    let result = server::serve(state, shutdown.clone()).await;

    shutdown.cancel();
    janitor.await.context("rate limiter janitor failed")?;
    signals.await.context("signal handler failed")??;

    result
}
