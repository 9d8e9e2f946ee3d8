//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Connect database → Spawn tasks → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast to tasks → drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then storage, then listeners
//! - One shutdown broadcast; every background task selects on it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::watch_signals;
