//! HTTP server assembly.
//!
//! # Responsibilities
//! - Hold the shared application state handed to every handler
//! - Build the Axum router with middleware (request ids, tracing,
//!   timeouts, body limits)
//! - Serve plaintext or TLS depending on configuration
//! - Run the periodic tasks tied to server lifetime (ban refresh,
//!   topic reaping, journal pruning)
//!
//! # Data Flow
//! ```text
//! TcpListener ──> Router
//!                   ├── GET  /events       (sse::subscribe)
//!                   ├── POST /api/events   (publish::publish_event)
//!                   ├── GET  /healthz
//!                   └── /admin/*           (admin::admin_router)
//! ```
//!
//! # Design Decisions
//! - Handlers read limits from the config snapshot per request, so a
//!   hot reload applies without a restart. Middleware built here
//!   (timeout, body cap) is fixed until restart.
//! - Shutdown closes the event bus first: ending every SSE stream is
//!   what lets graceful drain finish instead of waiting on connections
//!   that would otherwise stay open forever.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::db::{BanRepository, DbHealth, Journal, MemoryBanRepository, MemoryJournal};
use crate::events::EventBus;
use crate::http::{publish, sse};
use crate::lifecycle::Shutdown;
use crate::moderation::{sync, BanCache, BanService};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<RelayConfig>>,
    pub bus: Arc<EventBus>,
    pub journal: Arc<dyn Journal>,
    pub bans: Arc<BanService>,
    pub ban_cache: Arc<BanCache>,
    /// `None` when the database layer is disabled.
    pub db_health: Option<Arc<DbHealth>>,
    pub started_at: i64,
}

impl AppState {
    /// Memory-backed state, used when the database layer is disabled
    /// and by in-process tests.
    pub fn new(config: RelayConfig) -> Self {
        let retain = config.database.journal.retain_events as usize;
        let config = Arc::new(ArcSwap::from_pointee(config));
        let repo: Arc<dyn BanRepository> = Arc::new(MemoryBanRepository::new());
        Self::assemble(config, Arc::new(MemoryJournal::new(retain)), repo, None)
    }

    /// Wire explicit storage backends, as startup does when Postgres
    /// is enabled.
    pub fn assemble(
        config: Arc<ArcSwap<RelayConfig>>,
        journal: Arc<dyn Journal>,
        bans_repo: Arc<dyn BanRepository>,
        db_health: Option<Arc<DbHealth>>,
    ) -> Self {
        let capacity = config.load().stream.channel_capacity;
        Self {
            bus: Arc::new(EventBus::new(capacity)),
            bans: Arc::new(BanService::new(bans_repo, Arc::clone(&config))),
            ban_cache: Arc::new(BanCache::new()),
            journal,
            db_health,
            config,
            started_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// The relay's HTTP server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router, mainly for in-process tests.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until shutdown, running the server-lifetime tasks.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        let config = self.state.config.load_full();

        tokio::spawn(sync::run_refresh(
            Arc::clone(self.state.bans.repository()),
            Arc::clone(&self.state.ban_cache),
            config.moderation.refresh_secs,
            shutdown.subscribe(),
        ));
        tokio::spawn(run_topic_reaper(
            Arc::clone(&self.state.bus),
            Duration::from_secs(config.stream.reap_interval_secs),
            shutdown.subscribe(),
        ));
        tokio::spawn(run_journal_pruner(self.state.clone(), shutdown.subscribe()));

        // Closing the bus ends every live SSE stream, which is what
        // lets the drain below complete.
        let bus = Arc::clone(&self.state.bus);
        let mut close_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = close_rx.recv().await;
            bus.close();
        });

        let app = build_router(self.state.clone());
        let mut serve_rx = shutdown.subscribe();

        match &config.listener.tls {
            Some(tls) => {
                let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
                let handle = axum_server::Handle::new();
                let watcher = handle.clone();
                tokio::spawn(async move {
                    let _ = serve_rx.recv().await;
                    watcher.graceful_shutdown(Some(Duration::from_secs(10)));
                });
                tracing::info!(address = %addr, tls = true, "Relay listening");
                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, tls = false, "Relay listening");
                axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(async move {
                    let _ = serve_rx.recv().await;
                })
                .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Assemble routes and middleware around shared state.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.load();
    // The body cap leaves envelope headroom over the payload cap; the
    // handler enforces the exact payload limit.
    let body_limit = config.stream.max_payload_bytes + 4 * 1024;
    let timeout = Duration::from_secs(config.listener.request_timeout_secs);
    drop(config);

    Router::new()
        .route("/events", get(sse::subscribe))
        .route("/api/events", post(publish::publish_event))
        .route("/healthz", get(healthz))
        .merge(crate::admin::admin_router(state.clone()))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
    clients: usize,
    uptime_secs: i64,
}

/// Liveness endpoint, unauthenticated by design so the compose
/// healthcheck and load balancers can poll it.
async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.db_health {
        Some(health) if health.healthy() => "healthy",
        Some(_) => "unhealthy",
        None => "disabled",
    };
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database,
        clients: state.bus.client_count(),
        uptime_secs: chrono::Utc::now().timestamp() - state.started_at,
    })
}

async fn run_topic_reaper(
    bus: Arc<EventBus>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                bus.reap_idle();
            }
            _ = shutdown.recv() => {
                tracing::debug!("Topic reaper stopping");
                return;
            }
        }
    }
}

async fn run_journal_pruner(state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let every = Duration::from_secs(state.config.load().database.journal.prune_interval_secs);
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let retain = state.config.load().database.journal.retain_events;
                match state.journal.prune(retain).await {
                    Ok(0) => {}
                    Ok(pruned) => tracing::debug!(pruned, "Pruned journal"),
                    Err(e) => tracing::warn!(error = %e, "Journal prune failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("Journal pruner stopping");
                return;
            }
        }
    }
}
