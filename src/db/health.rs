//! Database liveness probe.
//!
//! A background task runs `SELECT 1` on an interval and keeps a
//! shared flag with hysteresis: several consecutive failures to go
//! unhealthy, several consecutive successes to come back. /healthz
//! and the admin status endpoint read the flag; they never touch the
//! pool directly.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::config::DatabaseConfig;

pub struct DbHealth {
    healthy: AtomicBool,
    last_check: AtomicI64,
}

impl DbHealth {
    pub fn new() -> Self {
        Self {
            // Optimistic start: the pool connected before this exists.
            healthy: AtomicBool::new(true),
            last_check: AtomicI64::new(0),
        }
    }

    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn last_check(&self) -> i64 {
        self.last_check.load(Ordering::SeqCst)
    }

    fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
        gauge!("relay_db_healthy").set(if healthy { 1.0 } else { 0.0 });
    }
}

impl Default for DbHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe loop. Runs until shutdown.
pub async fn run_probe(
    pool: PgPool,
    health: Arc<DbHealth>,
    config: DatabaseConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.health_interval_secs));
    let mut failures = 0u32;
    let mut successes = 0u32;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.recv() => {
                tracing::debug!("Database probe stopping");
                return;
            }
        }

        let ok = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&pool)
            .await
            .is_ok();
        health
            .last_check
            .store(chrono::Utc::now().timestamp(), Ordering::SeqCst);

        if ok {
            successes += 1;
            failures = 0;
            if !health.healthy() && successes >= config.healthy_threshold {
                tracing::info!("Database recovered");
                health.set(true);
            }
        } else {
            failures += 1;
            successes = 0;
            if health.healthy() && failures >= config.unhealthy_threshold {
                tracing::warn!(failures, "Database unhealthy");
                health.set(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy() {
        let health = DbHealth::new();
        assert!(health.healthy());
        assert_eq!(health.last_check(), 0);
    }

    #[test]
    fn flag_transitions() {
        let health = DbHealth::new();
        health.set(false);
        assert!(!health.healthy());
        health.set(true);
        assert!(health.healthy());
    }
}
