//! Loopback SSE event relay.
//!
//! Backend services publish JSON events over an authenticated HTTP
//! endpoint; browsers and other clients hold them as Server-Sent
//! Event streams scoped by signed topic tokens. Postgres optionally
//! backs event replay and ban moderation.

pub mod admin;
pub mod auth;
pub mod config;
pub mod db;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod moderation;
pub mod observability;
pub mod resilience;
pub mod stack;

pub use config::RelayConfig;
pub use http::{AppState, RelayServer};
pub use lifecycle::Shutdown;
