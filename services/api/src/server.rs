//! HTTP server lifecycle

use anyhow::{Context, Result, anyhow};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{routes::create_router, state::AppState};

/// How long in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Bind the configured port and serve until `shutdown` is cancelled.
pub async fn serve(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, env = %state.config.env, "starting server");
    run(listener, state, shutdown).await
}

/// Serve on `listener`, then drain background work.
///
/// Once `shutdown` fires the server stops accepting connections and waits up
/// to [`SHUTDOWN_GRACE`] for in-flight requests. Background tasks are then
/// awaited regardless of how the HTTP side ended.
pub async fn run(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let tracker = state.tracker.clone();
    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );

    let result = tokio::select! {
        joined = &mut server => flatten(joined, "server stopped unexpectedly"),
        _ = shutdown.cancelled() => {
            info!("shutting down server");
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(joined) => flatten(joined, "graceful shutdown failed"),
                Err(_) => {
                    server.abort();
                    Err(anyhow!("graceful shutdown exceeded {SHUTDOWN_GRACE:?}"))
                }
            }
        }
    };

    if let Err(err) = &result {
        error!(error = %err, "server shutdown error");
    }

    info!(tasks = tracker.len(), "completing background tasks");
    tracker.close();
    tracker.wait().await;
    info!("stopped server");

    result
}

fn flatten(joined: Result<std::io::Result<()>, JoinError>, what: &'static str) -> Result<()> {
    joined.context("server task failed")?.context(what)
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
pub async fn shutdown_on_signal(shutdown: CancellationToken) -> Result<()> {
    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!(signal = "SIGINT", "caught signal");
        }
        result = sigterm() => {
            result?;
            info!(signal = "SIGTERM", "caught signal");
        }
        _ = shutdown.cancelled() => return Ok(()),
    }

    shutdown.cancel();
    Ok(())
}

#[cfg(unix)]
async fn sigterm() -> Result<()> {
    let mut handler = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    handler.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn sigterm() -> Result<()> {
    std::future::pending::<Result<()>>().await
}
