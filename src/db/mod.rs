//! Persistence layer.
//!
//! # Data Flow
//! ```text
//! startup:
//!     connect_pool (retry with jittered backoff)
//!     → embedded migrations
//!     → PgPool shared via Arc to repositories
//!
//! runtime:
//!     Journal / BanRepository traits
//!     ├─ Pg* impls when the database layer is enabled
//!     └─ Memory* impls otherwise (development, tests)
//!     health::run_probe keeps a liveness flag for /healthz
//! ```
//!
//! # Design Decisions
//! - Repositories are trait objects so the relay runs without Postgres;
//!   enabling the database swaps implementations, not call sites
//! - All queries bind parameters at runtime; nothing requires a live
//!   database at compile time

pub mod bans;
pub mod health;
pub mod journal;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::resilience::calculate_backoff;

pub use bans::{BanRepository, MemoryBanRepository, NewBan, PgBanRepository};
pub use health::{run_probe, DbHealth};
pub use journal::{Journal, MemoryJournal, NullJournal, PgJournal};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("database unavailable after {attempts} attempts")]
    Unavailable { attempts: u32 },
}

/// Connect to Postgres, retrying with backoff, then run embedded
/// migrations. The deployment starts the database container alongside
/// the relay, so the first attempts routinely race its startup.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let url = config.connection_url();
    let mut last_error = None;

    for attempt in 1..=config.connect_attempts {
        let delay = calculate_backoff(attempt - 1, 500, 10_000);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&url)
            .await
        {
            Ok(pool) => {
                tracing::info!(
                    host = %config.host,
                    port = config.port,
                    database = %config.name,
                    attempt,
                    "Connected to Postgres"
                );
                sqlx::migrate!("./migrations").run(&pool).await?;
                return Ok(pool);
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = config.connect_attempts,
                    error = %e,
                    "Postgres connect failed"
                );
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(DbError::Sqlx(e)),
        None => Err(DbError::Unavailable {
            attempts: config.connect_attempts,
        }),
    }
}
