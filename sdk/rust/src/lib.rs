//! Client SDK for the SSE event relay.
//!
//! Producers publish events with the relay secret; subscribers open a
//! token-scoped `EventStream` and pull parsed SSE frames from it.

pub mod client;

pub use client::{EventData, EventStream, PublishAck, RelayClient, RelayEvent, SdkError};
