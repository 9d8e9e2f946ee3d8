//! Event model and in-process fan-out.

pub mod bus;
pub mod types;

pub use bus::{ClientGuard, EventBus, TopicStat};
pub use types::{validate_topic, Event, InvalidTopic, MAX_TOPIC_LEN};
