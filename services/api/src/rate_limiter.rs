//! Per-client rate limiter

use anyhow::{Context, Result, anyhow};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as Bucket};
use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often idle clients are swept.
pub const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Clients silent for longer than this are forgotten.
pub const IDLE_EXPIRY: Duration = Duration::from_secs(3 * 60);

/// Rate limiter configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub enabled: bool,
    /// Sustained requests per second, may be fractional
    pub rps: f64,
    /// Requests allowed at once on top of the sustained rate
    pub burst: u32,
}

struct Client {
    bucket: DefaultDirectRateLimiter,
    last_seen: Instant,
}

/// Token bucket per client IP.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    quota: Quota,
    clients: Arc<Mutex<HashMap<IpAddr, Client>>>,
}

impl RateLimiter {
    /// # Errors
    /// Returns an error if `rps` is not a positive rate or `burst` is zero.
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        if !(config.rps.is_finite() && config.rps > 0.0) {
            return Err(anyhow!("limiter rps must be positive, got {}", config.rps));
        }
        let period = Duration::try_from_secs_f64(config.rps.recip())
            .with_context(|| anyhow!("limiter rps {} is out of range", config.rps))?;
        let quota = Quota::with_period(period)
            .with_context(|| anyhow!("limiter rps {} is out of range", config.rps))?
            .allow_burst(
                NonZeroU32::new(config.burst).with_context(|| anyhow!("limiter burst is zero"))?,
            );

        Ok(Self {
            enabled: config.enabled,
            quota,
            clients: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<IpAddr, Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a token for `ip`. Always true when the limiter is disabled.
    pub fn check(&self, ip: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }

        let mut clients = self.clients();
        let client = clients.entry(ip).or_insert_with(|| Client {
            bucket: Bucket::direct(self.quota),
            last_seen: Instant::now(),
        });
        client.last_seen = Instant::now();
        client.bucket.check().is_ok()
    }

    /// Drop clients not seen within [`IDLE_EXPIRY`] of `now`.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, client| now.duration_since(client.last_seen) <= IDLE_EXPIRY);
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients().len()
    }

    /// Sweep idle clients every [`JANITOR_INTERVAL`] until `shutdown` fires.
    pub fn spawn_janitor(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_idle(Instant::now());
                        if evicted > 0 {
                            debug!(evicted, "evicted idle rate limiter clients");
                        }
                    }
                }
            }
        })
    }
}
