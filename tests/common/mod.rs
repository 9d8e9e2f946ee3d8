//! Shared utilities for relay integration tests.
#![allow(dead_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sse_relay::auth::{issue, TokenClaims};
use sse_relay::config::RelayConfig;
use sse_relay::{AppState, RelayServer, Shutdown};

pub const SECRET: &str = "integration-test-secret-0123";
pub const ADMIN_KEY: &str = "integration-admin-key-0123";

/// A running in-process relay. Shuts down on drop.
pub struct RelayHandle {
    pub base_url: String,
    shutdown: Shutdown,
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Memory-backed config with auth and admin enabled.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.secret = SECRET.into();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config.stream.keepalive_secs = 1;
    config
}

/// Bind an ephemeral loopback port and serve the relay on it.
pub async fn spawn_relay(config: RelayConfig) -> RelayHandle {
    let listener = tokio::net::TcpListener::bind(&config.listener.bind_address)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let state = AppState::new(config);
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = RelayServer::new(state).run(listener, &server_shutdown).await;
    });

    // Let the accept loop come up before tests fire requests.
    tokio::time::sleep(Duration::from_millis(50)).await;

    RelayHandle {
        base_url: format!("http://{}", addr),
        shutdown,
    }
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Issue a one-hour subscriber token signed with the test secret.
pub fn subscriber_token(sub: &str, topics: &[&str]) -> String {
    let now = now_secs();
    let claims = TokenClaims {
        sub: sub.to_string(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        iat: now,
        exp: now + 3600,
    };
    issue(SECRET, &claims).unwrap()
}

/// A token that expired a minute ago.
pub fn expired_token(sub: &str, topics: &[&str]) -> String {
    let now = now_secs();
    let claims = TokenClaims {
        sub: sub.to_string(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        iat: now - 3700,
        exp: now - 60,
    };
    issue(SECRET, &claims).unwrap()
}

/// Plain client for admin calls; SSE flows go through the SDK.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
