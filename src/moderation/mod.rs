//! Ban management and enforcement.
//!
//! # Data Flow
//! ```text
//! admin API (create / update / revoke)
//!     → service.rs (rules) → BanRepository (storage)
//!     → sync::refresh (immediate cache rebuild)
//!
//! sync::run_refresh (interval)
//!     → repo.active(now) → cache.replace
//!
//! GET /events (subscribe)
//!     → cache.check(token subject)
//!     → banned: 403 with public reason only
//! ```
//!
//! # Design Decisions
//! - Expiry is stored as a future `revoked_at`; one column drives both
//!   temporary bans and manual revocations
//! - Enforcement happens at subscribe time; streams already open are
//!   untouched until they reconnect
//! - The internal reason stays inside the relay; subjects only ever
//!   see `public_reason`

pub mod cache;
pub mod service;
pub mod sync;
pub mod types;

pub use cache::{ActiveBan, BanCache};
pub use service::{BanService, ModerationError};
pub use types::{validate_kind, Ban, BanUpdate, DraftBan};
