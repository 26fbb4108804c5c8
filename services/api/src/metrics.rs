//! Request counters exposed on `/debug/vars`

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use common::database::{PoolStats, pool_stats};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::{config::VERSION, json::write_json, state::AppState};

/// Process-wide request counters.
#[derive(Debug, Default)]
pub struct Metrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    responses_by_status: Mutex<BTreeMap<u16, u64>>,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    #[serde(rename = "total_processing_time_μs")]
    pub total_processing_time_us: u64,
    pub total_responses_sent_by_status: BTreeMap<u16, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_sent(&self, status: StatusCode, elapsed_us: u64) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
        *self
            .responses_by_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(status.as_u16())
            .or_default() += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
            total_responses_sent_by_status: self
                .responses_by_status
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Outermost middleware: counts every request and the status it ended with.
pub async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    state.metrics.request_received();

    let response = next.run(req).await;

    let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    state.metrics.response_sent(response.status(), elapsed_us);
    response
}

#[derive(Debug, Serialize)]
struct DebugVars {
    version: &'static str,
    timestamp: i64,
    database: PoolStats,
    #[serde(flatten)]
    requests: MetricsSnapshot,
    background_tasks: usize,
}

/// GET /debug/vars
pub async fn debug_vars(State(state): State<AppState>) -> Response {
    let vars = DebugVars {
        version: VERSION,
        timestamp: chrono::Utc::now().timestamp(),
        database: state.pool.as_ref().map(pool_stats).unwrap_or_default(),
        requests: state.metrics.snapshot(),
        background_tasks: state.tracker.len(),
    };
    write_json(StatusCode::OK, &vars, HeaderMap::new())
}
