//! SSE Event Relay
//!
//! Accepts events from trusted producers and fans them out to
//! subscribers over Server-Sent Events, with optional Postgres-backed
//! replay and ban moderation.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                 SSE RELAY                     │
//!                      │                                               │
//!   POST /api/events   │  ┌─────────┐    ┌─────────┐    ┌──────────┐  │
//!   ───────────────────┼─▶│  http   │───▶│ publish │───▶│  events  │  │
//!                      │  │ server  │    │ handler │    │   bus    │  │
//!                      │  └─────────┘    └────┬────┘    └────┬─────┘  │
//!                      │                      │              │        │
//!                      │                      ▼              │        │
//!                      │                ┌──────────┐         │        │
//!                      │                │ journal  │         │        │
//!                      │                │ (replay) │         │        │
//!                      │                └────┬─────┘         │        │
//!                      │                     │               ▼        │
//!   GET /events        │  ┌─────────┐   ┌───┴────┐    ┌──────────┐   │
//!   ◀──────────────────┼──│   sse   │◀──│ replay │ +  │   live   │   │
//!                      │  │ stream  │   │ frames │    │  frames  │   │
//!                      │  └─────────┘   └────────┘    └──────────┘   │
//!                      │                                               │
//!                      │  ┌─────────────────────────────────────────┐ │
//!                      │  │           Cross-Cutting Concerns         │ │
//!                      │  │  ┌────────┐ ┌───────────┐ ┌───────────┐ │ │
//!                      │  │  │ config │ │moderation │ │observa-   │ │ │
//!                      │  │  │ reload │ │  (bans)   │ │bility     │ │ │
//!                      │  │  └────────┘ └───────────┘ └───────────┘ │ │
//!                      │  │  ┌────────────────┐  ┌────────────────┐ │ │
//!                      │  │  │ db (pool,      │  │ lifecycle      │ │ │
//!                      │  │  │ probe, bans)   │  │ (signals)      │ │ │
//!                      │  │  └────────────────┘  └────────────────┘ │ │
//!                      │  └─────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use clap::Parser;
use tokio::net::TcpListener;

use sse_relay::config::{load_config, watcher::ConfigWatcher};
use sse_relay::db::{
    connect_pool, run_probe, BanRepository, DbHealth, Journal, MemoryBanRepository,
    MemoryJournal, NullJournal, PgBanRepository, PgJournal,
};
use sse_relay::lifecycle::watch_signals;
use sse_relay::observability::{init_logging, init_metrics};
use sse_relay::{AppState, RelayServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "sse-relay", version, about = "Loopback SSE event relay")]
struct Args {
    /// Path to the configuration file. Missing file means defaults
    /// plus environment overrides.
    #[arg(long, default_value = "relay.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        bind_address = %config.listener.bind_address,
        database = config.database.enabled,
        admin = config.admin.enabled,
        "sse-relay starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        watch_signals(&signal_shutdown).await;
    });

    let bind_address = config.listener.bind_address.clone();
    let shared_config = Arc::new(ArcSwap::from_pointee(config));
    let config = shared_config.load_full();

    let (journal, bans_repo, db_health): (
        Arc<dyn Journal>,
        Arc<dyn BanRepository>,
        Option<Arc<DbHealth>>,
    ) = if config.database.enabled {
        let pool = connect_pool(&config.database).await?;
        let health = Arc::new(DbHealth::new());
        tokio::spawn(run_probe(
            pool.clone(),
            Arc::clone(&health),
            config.database.clone(),
            shutdown.subscribe(),
        ));
        let journal: Arc<dyn Journal> = if config.database.journal.enabled {
            Arc::new(PgJournal::new(pool.clone()))
        } else {
            Arc::new(NullJournal)
        };
        (journal, Arc::new(PgBanRepository::new(pool)), Some(health))
    } else {
        tracing::info!("Database disabled, using in-memory journal and bans");
        (
            Arc::new(MemoryJournal::new(
                config.database.journal.retain_events as usize,
            )),
            Arc::new(MemoryBanRepository::new()),
            None,
        )
    };

    // Hot reload: the watcher revalidates on its own, but the listener
    // address cannot change without a restart.
    let (watcher, mut reload_rx) = ConfigWatcher::new(&args.config);
    let _watcher_handle = watcher.run()?;
    let reload_target = Arc::clone(&shared_config);
    tokio::spawn(async move {
        while let Some(new_config) = reload_rx.recv().await {
            if new_config.listener.bind_address != reload_target.load().listener.bind_address {
                tracing::warn!("bind_address changed on disk; restart to apply");
            }
            reload_target.store(Arc::new(new_config));
            tracing::info!("Configuration reloaded");
        }
    });

    let state = AppState::assemble(shared_config, journal, bans_repo, db_health);
    let listener = TcpListener::bind(&bind_address).await?;
    let server = RelayServer::new(state);
    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
