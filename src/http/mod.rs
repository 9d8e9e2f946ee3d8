//! HTTP surface of the relay.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → server.rs (router, request ids, tracing, timeout, body cap)
//!     → publish.rs (POST /api/events, producer secret)
//!     → sse.rs     (GET /events, subscriber tokens, live stream)
//!     → error.rs   (uniform JSON error responses)
//! ```

pub mod error;
pub mod publish;
pub mod server;
pub mod sse;

pub use error::ApiError;
pub use server::{build_router, AppState, RelayServer};
