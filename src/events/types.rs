//! Event types shared across the relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum topic name length.
pub const MAX_TOPIC_LEN: usize = 128;

/// A single published event.
///
/// `topic` selects who receives the event; `category` is the event
/// name clients listen for on their EventSource. The payload is opaque
/// JSON supplied by the producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub topic: String,
    pub category: String,
    pub payload: Value,
    /// Unix timestamp (seconds) assigned at publish time.
    pub created_at: i64,
}

impl Event {
    pub fn new(topic: &str, category: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            category: category.to_string(),
            payload,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Rejected topic name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid topic '{topic}': {reason}")]
pub struct InvalidTopic {
    pub topic: String,
    pub reason: &'static str,
}

/// Validate a topic name.
///
/// Topics are short identifiers, optionally namespaced with `.` or `:`
/// (e.g. `waitlist`, `account:1234`). The charset is restricted so
/// topics can appear in URLs, tokens, and log lines unescaped.
pub fn validate_topic(topic: &str) -> Result<(), InvalidTopic> {
    let fail = |reason| {
        Err(InvalidTopic {
            topic: topic.to_string(),
            reason,
        })
    };

    if topic.is_empty() {
        return fail("empty");
    }
    if topic.len() > MAX_TOPIC_LEN {
        return fail("too long");
    }
    if !topic
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
    {
        return fail("contains characters outside [A-Za-z0-9._:-]");
    }
    Ok(())
}
