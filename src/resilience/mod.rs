//! Resilience helpers.
//!
//! # Design Decisions
//! - Every external call has a deadline; the database pool enforces
//!   an acquire timeout and startup connects retry with backoff
//! - Jittered exponential backoff avoids reconnect stampedes after a
//!   database restart

pub mod backoff;

pub use backoff::calculate_backoff;
