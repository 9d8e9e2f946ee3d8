//! SSE subscription endpoint.
//!
//! # Responsibilities
//! - Authenticate subscribers via signed stream tokens
//! - Enforce active bans before a stream is opened
//! - Resume missed events from the journal via `Last-Event-ID`
//! - Fan live events from the bus into the client's SSE stream
//!
//! # Data Flow
//! ```text
//! GET /events?token=..&topics=a,b
//!        |
//!   verify token ──> ban check ──> topic narrowing ──> client slot
//!        |
//!   Last-Event-ID? ──> journal replay (ordered, capped)
//!        |
//!   replay frames ++ live broadcast streams ──> text/event-stream
//! ```
//!
//! # Design Decisions
//! - Bans are enforced when the stream is opened, not per event. A
//!   subject banned mid-stream keeps its current connection until it
//!   reconnects; the cache refresh window bounds the exposure.
//! - Replay frames are emitted before any live frame so a resuming
//!   client sees events in journal order. Events published between the
//!   replay query and the broadcast subscription can be duplicated,
//!   never lost; clients dedupe by event id.
//! - An unparseable `Last-Event-ID` is ignored rather than rejected.
//!   The header is client-controlled and stale values must not lock a
//!   client out of the stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::header::{self, HeaderMap};
use axum::response::sse::{self, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::future::ready;
use futures_util::stream::{self, select_all, Stream, StreamExt};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::auth::{self, parse_bearer, TokenError};
use crate::events::{validate_topic, ClientGuard, Event};
use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    /// Stream token. Browsers cannot set headers on `EventSource`, so
    /// the query string is the primary carrier; `Authorization: Bearer`
    /// also works for non-browser clients.
    pub token: Option<String>,
    /// Comma-separated topic filter. Must be a subset of the token's
    /// topic grant. Absent means the full grant.
    pub topics: Option<String>,
}

/// The JSON body of each SSE `data:` line. The topic rides along so
/// multi-topic subscribers can tell frames apart.
#[derive(Serialize)]
struct WireEvent<'a> {
    topic: &'a str,
    payload: &'a serde_json::Value,
    created_at: i64,
}

pub async fn subscribe(
    State(state): State<AppState>,
    Query(params): Query<SubscribeParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.config.load_full();

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer);
    let token = params
        .token
        .as_deref()
        .or(bearer)
        .ok_or(ApiError::Unauthorized("Missing stream token"))?;

    let now = chrono::Utc::now().timestamp();
    let claims = auth::verify(&config.auth.secret, token, now).map_err(|e| match e {
        TokenError::Expired => ApiError::Unauthorized("Stream token has expired"),
        _ => ApiError::Unauthorized("Invalid stream token"),
    })?;

    if let Some(ban) = state.ban_cache.check(&claims.sub) {
        let reason = ban
            .public_reason
            .unwrap_or_else(|| "Access revoked".to_string());
        tracing::info!(subject = %claims.sub, "Rejected banned subscriber");
        return Err(ApiError::Forbidden(reason));
    }

    let topics = requested_topics(&params, &claims)?;
    if topics.len() > config.auth.max_topics_per_token {
        return Err(ApiError::BadRequest(format!(
            "A subscription covers at most {} topics",
            config.auth.max_topics_per_token
        )));
    }

    let guard = state
        .bus
        .try_register_client(config.stream.max_clients)
        .ok_or(ApiError::TooManyClients)?;

    // Subscribe to the bus before the replay query runs. An event
    // published while the query is in flight then shows up live (and
    // possibly also in the replay, since it is journaled first), so a
    // resuming client can see a duplicate but never a gap.
    let live = select_all(
        topics
            .iter()
            .map(|topic| BroadcastStream::new(state.bus.subscribe(topic))),
    )
    .filter_map(|item| {
        ready(match item {
            Ok(event) => Some(Ok::<_, Infallible>(event_to_sse(&event))),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                counter!("relay_subscriber_lag_skips_total").increment(skipped);
                tracing::warn!(skipped, "Subscriber lagged behind the bus");
                None
            }
        })
    });

    let replayed = match last_event_id(&headers) {
        Some(last_id) => {
            let limit = config.database.journal.replay_limit;
            match state.journal.replay_after(last_id, &topics, limit).await {
                Ok(events) => {
                    counter!("relay_events_replayed_total").increment(events.len() as u64);
                    tracing::debug!(
                        subject = %claims.sub,
                        last_id = %last_id,
                        count = events.len(),
                        "Replayed journal entries"
                    );
                    events
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Journal replay failed, serving live only");
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    let replay = stream::iter(
        replayed
            .into_iter()
            .map(|event| Ok::<_, Infallible>(event_to_sse(&event))),
    );

    tracing::info!(
        subject = %claims.sub,
        topics = topics.len(),
        clients = state.bus.client_count(),
        "Subscriber connected"
    );

    let stream = GuardedStream {
        inner: replay.chain(live),
        _guard: guard,
    };

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(config.stream.keepalive_secs))
            .text("keep-alive"),
    );

    // X-Accel-Buffering stops nginx-style proxies from buffering the
    // stream into uselessness.
    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    ))
}

/// Resolve the effective topic list from the optional `topics` filter
/// and the token's grant.
fn requested_topics(
    params: &SubscribeParams,
    claims: &auth::TokenClaims,
) -> Result<Vec<String>, ApiError> {
    let topics: Vec<String> = match &params.topics {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        None => claims.topics.clone(),
    };

    if topics.is_empty() {
        return Err(ApiError::BadRequest("No topics requested".to_string()));
    }

    for topic in &topics {
        validate_topic(topic).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if !claims.permits(topic) {
            return Err(ApiError::Forbidden(format!(
                "Topic '{topic}' is not covered by this token"
            )));
        }
    }

    Ok(topics)
}

fn last_event_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

fn event_to_sse(event: &Event) -> sse::Event {
    let wire = WireEvent {
        topic: &event.topic,
        payload: &event.payload,
        created_at: event.created_at,
    };
    // A Value round-trips through to_string without error; the fallback
    // keeps the stream alive rather than poisoning it.
    let data = serde_json::to_string(&wire).unwrap_or_else(|_| "{}".to_string());
    sse::Event::default()
        .id(event.id.to_string())
        .event(&event.category)
        .data(data)
}

/// Couples the SSE stream to its client-slot guard so the slot is
/// released exactly when the connection drops.
struct GuardedStream<S> {
    inner: S,
    _guard: ClientGuard,
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx)
    }
}
