//! Admin key middleware.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::{parse_bearer, verify_secret};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Gate every admin route behind the admin API key.
///
/// While the admin surface is disabled this answers 404, so probing
/// cannot tell "disabled" apart from "no such route".
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let config = state.config.load_full();

    if !config.admin.enabled {
        return Err(ApiError::NotFound("Not found".to_string()));
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer)
        .ok_or(ApiError::Unauthorized("Missing admin key"))?;

    if !verify_secret(&config.admin.api_key, presented) {
        tracing::warn!("Rejected admin request with an invalid key");
        return Err(ApiError::Unauthorized("Invalid admin key"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::RelayConfig;
    use crate::http::{build_router, AppState};

    const ADMIN_KEY: &str = "anadminkey0123456";

    fn router_with(admin_enabled: bool) -> axum::Router {
        let mut config = RelayConfig::default();
        config.auth.secret = "0123456789abcdef".into();
        config.admin.enabled = admin_enabled;
        config.admin.api_key = ADMIN_KEY.into();
        build_router(AppState::new(config))
    }

    #[tokio::test]
    async fn disabled_admin_hides_behind_404() {
        let response = router_with(false)
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_key_is_unauthorized() {
        let response = router_with(true)
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_key_is_unauthorized() {
        let response = router_with(true)
            .oneshot(
                Request::get("/admin/status")
                    .header("authorization", "Bearer wrong-key-entirely")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn correct_key_passes() {
        let response = router_with(true)
            .oneshot(
                Request::get("/admin/status")
                    .header("authorization", format!("Bearer {ADMIN_KEY}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
