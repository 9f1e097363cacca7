use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use tokio::sync::{Mutex, Semaphore};

use sv_core::{Error, Result};

use crate::config::ServerConfig;
use crate::conn::Connection;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A bounded pool of up to `max_connections` warm, authenticated sessions
/// against one server. Admission is a semaphore so waiters on
/// an empty pool block with a bounded timeout rather than spawning unbounded
/// connections; idle connections older than `idle_ttl` are dropped rather
/// than reused, rotating out stale connections on a configurable TTL.
pub struct ServerPool {
    pub config: ServerConfig,
    idle: Mutex<Vec<Connection>>,
    admission: Arc<Semaphore>,
    idle_ttl: Duration,
    rate_limiter: Option<DirectRateLimiter>,
}

impl ServerPool {
    pub fn new(config: ServerConfig, idle_ttl: Duration, rate_limit_per_sec: Option<u32>) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_connections));
        let rate_limiter = rate_limit_per_sec
            .and_then(NonZeroU32::new)
            .map(|n| RateLimiter::direct(Quota::per_second(n)));
        Self { config, idle: Mutex::new(Vec::new()), admission, idle_ttl, rate_limiter }
    }

    pub fn available_permits(&self) -> usize {
        self.admission.available_permits()
    }

    /// Checks out a ready connection, waiting up to `timeout` for both
    /// pool capacity and (if configured) the server's rate limit. Reuses an
    /// idle connection under the TTL when one exists, otherwise dials a
    /// fresh one, and always performs the health check before handing it
    /// back.
    pub async fn checkout(&self, timeout: Duration) -> Result<PooledGuard<'_>> {
        let permit = tokio::time::timeout(timeout, self.admission.clone().acquire_owned())
            .await
            .map_err(|_| Error::ResourceExhausted(format!("pool for {} exhausted", self.config.name)))?
            .map_err(|_| Error::Internal("semaphore closed".into()))?;

        if let Some(limiter) = &self.rate_limiter {
            tokio::time::timeout(timeout, limiter.until_ready())
                .await
                .map_err(|_| Error::ResourceExhausted(format!("rate limit wait exceeded for {}", self.config.name)))?;
        }

        let mut conn = {
            let mut idle = self.idle.lock().await;
            let fresh_enough = idle
                .last()
                .map(|c| c.last_used.elapsed() < self.idle_ttl)
                .unwrap_or(false);
            if fresh_enough {
                idle.pop()
            } else {
                idle.clear();
                None
            }
        };

        if conn.is_none() {
            conn = Some(Connection::connect(&self.config).await?);
        }
        let mut conn = conn.expect("connection populated above");

        if conn.health_check(&self.config.default_group).await.is_err() {
            conn = Connection::connect(&self.config).await?;
        }

        conn.mark_in_use();
        Ok(PooledGuard { pool: self, conn: Some(conn), _permit: permit })
    }

    async fn release(&self, mut conn: Connection) {
        use crate::conn::ConnState;
        if conn.state() == ConnState::Broken || conn.created_at.elapsed() > self.idle_ttl * 8 {
            tracing::debug!(server = %self.config.name, "discarding broken/aged connection");
            return;
        }
        conn.mark_ready();
        self.idle.lock().await.push(conn);
    }
}

/// RAII guard returned by [`ServerPool::checkout`]. Dropping it without
/// calling [`Self::release`] (e.g. on panic-unwind) discards the connection
/// rather than returning a possibly-inconsistent session to the pool.
pub struct PooledGuard<'a> {
    pool: &'a ServerPool,
    conn: Option<Connection>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl<'a> PooledGuard<'a> {
    pub fn connection_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken only on drop/release")
    }

    pub fn mark_broken(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.mark_broken();
        }
    }

    /// Returns the connection to the pool's idle list (unless broken).
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn).await;
        }
    }
}
