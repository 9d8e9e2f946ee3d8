//! Admin route handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::{self, TokenClaims};
use crate::events::{validate_topic, TopicStat};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::moderation::{sync, Ban, BanUpdate, DraftBan};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub clients: usize,
    pub topics: usize,
    pub active_bans: usize,
    pub database: &'static str,
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let database = match &state.db_health {
        Some(health) if health.healthy() => "healthy",
        Some(_) => "unhealthy",
        None => "disabled",
    };
    Json(StatusResponse {
        status: "operational",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: chrono::Utc::now().timestamp() - state.started_at,
        clients: state.bus.client_count(),
        topics: state.bus.topic_stats().len(),
        active_bans: state.ban_cache.len(),
        database,
    })
}

pub async fn get_topics(State(state): State<AppState>) -> Json<Vec<TopicStat>> {
    Json(state.bus.topic_stats())
}

pub async fn list_bans(State(state): State<AppState>) -> Result<Json<Vec<Ban>>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    Ok(Json(state.bans.list_active(now).await?))
}

pub async fn create_ban(
    State(state): State<AppState>,
    Json(draft): Json<DraftBan>,
) -> Result<(StatusCode, Json<Ban>), ApiError> {
    let now = chrono::Utc::now().timestamp();
    let ban = state.bans.create(draft, now).await?;
    refresh_cache(&state).await;
    Ok((StatusCode::CREATED, Json(ban)))
}

pub async fn ban_history(
    State(state): State<AppState>,
    Path((kind, subject_id)): Path<(String, i64)>,
) -> Result<Json<Vec<Ban>>, ApiError> {
    Ok(Json(state.bans.history(&kind, subject_id).await?))
}

pub async fn update_ban(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<BanUpdate>,
) -> Result<Json<Ban>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let ban = state.bans.update(id, update, now).await?;
    refresh_cache(&state).await;
    Ok(Json(ban))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub revoked_by: String,
}

pub async fn revoke_ban(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<Ban>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let ban = state.bans.revoke(id, &request.revoked_by, now).await?;
    refresh_cache(&state).await;
    Ok(Json(ban))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Subject in `kind:id` form, matched against bans at subscribe.
    pub subject: String,
    pub topics: Vec<String>,
    /// Overrides `auth.token_ttl_secs` when present.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: i64,
}

pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let config = state.config.load_full();

    if request.subject.trim().is_empty() {
        return Err(ApiError::BadRequest("Subject must not be empty".to_string()));
    }
    if request.topics.is_empty() {
        return Err(ApiError::BadRequest(
            "A token needs at least one topic".to_string(),
        ));
    }
    if request.topics.len() > config.auth.max_topics_per_token {
        return Err(ApiError::BadRequest(format!(
            "A token covers at most {} topics",
            config.auth.max_topics_per_token
        )));
    }
    for topic in &request.topics {
        validate_topic(topic).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    }
    let ttl = request.ttl_secs.unwrap_or(config.auth.token_ttl_secs);
    if ttl == 0 {
        return Err(ApiError::BadRequest("ttl_secs must be positive".to_string()));
    }

    let now = chrono::Utc::now().timestamp();
    let claims = TokenClaims {
        sub: request.subject,
        topics: request.topics,
        iat: now,
        exp: now + ttl as i64,
    };
    let token = auth::issue(&config.auth.secret, &claims)
        .map_err(|e| ApiError::Internal(format!("Token signing failed: {e}")))?;

    tracing::info!(
        subject = %claims.sub,
        topics = claims.topics.len(),
        expires_at = claims.exp,
        "Issued subscriber token"
    );
    Ok(Json(TokenResponse {
        token,
        expires_at: claims.exp,
    }))
}

/// Push a ban write into the subscribe-path cache right away, instead
/// of waiting out the refresh interval.
async fn refresh_cache(state: &AppState) {
    if let Err(e) = sync::refresh(state.bans.repository().as_ref(), &state.ban_cache).await {
        tracing::warn!(error = %e, "Ban cache refresh after write failed");
    }
}
