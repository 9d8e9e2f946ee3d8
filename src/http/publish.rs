//! Event publishing endpoint.
//!
//! Producers are trusted backend services holding the relay secret
//! itself (not a scoped token). A publish journals the event first,
//! then fans it out; the journal write failing degrades replay, never
//! live delivery.

use axum::extract::State;
use axum::http::header::{self, HeaderMap};
use axum::Json;
use metrics::counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{parse_bearer, verify_secret};
use crate::events::{validate_topic, Event};
use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    /// Event name clients listen for, e.g. `waitlist_update`.
    pub category: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub id: Uuid,
    /// Subscribers the event was handed to at publish time.
    pub receivers: usize,
}

pub async fn publish_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let config = state.config.load_full();

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer)
        .ok_or(ApiError::Unauthorized("Missing producer secret"))?;
    if !verify_secret(&config.auth.secret, presented) {
        return Err(ApiError::Unauthorized("Invalid producer secret"));
    }

    validate_topic(&request.topic).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    // Categories share the topic charset; they end up in the SSE
    // `event:` field where a stray newline would break framing.
    validate_topic(&request.category).map_err(|_| {
        ApiError::BadRequest(format!("'{}' is not a valid category", request.category))
    })?;

    let size = serde_json::to_vec(&request.payload)
        .map_err(|e| ApiError::BadRequest(format!("Unserializable payload: {e}")))?
        .len();
    if size > config.stream.max_payload_bytes {
        return Err(ApiError::PayloadTooLarge(config.stream.max_payload_bytes));
    }

    let event = Event::new(&request.topic, &request.category, request.payload);
    let id = event.id;

    // Journal before fan-out so a client resuming from this event's id
    // is guaranteed to find it.
    if let Err(e) = state.journal.record(&event).await {
        counter!("relay_journal_failures_total").increment(1);
        tracing::warn!(error = %e, event_id = %id, "Journal write failed, event is live only");
    }

    let receivers = state.bus.publish(event);
    tracing::debug!(
        event_id = %id,
        topic = %request.topic,
        category = %request.category,
        receivers,
        "Event published"
    );

    Ok(Json(PublishResponse { id, receivers }))
}
