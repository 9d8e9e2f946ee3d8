//! In-process event fan-out.
//!
//! # Responsibilities
//! - One broadcast channel per topic, created lazily on first use
//! - Publish returns the number of live subscribers that received
//!   the event (zero is normal, not an error)
//! - Track the global SSE client count and enforce the cap
//! - Reap channels whose subscribers have all disconnected
//!
//! # Design Decisions
//! - Events travel as `Arc<Event>` so fan-out never clones payloads
//! - Slow subscribers skip events (bounded channel) rather than
//!   applying backpressure to producers; skipped counts are surfaced
//!   via metrics and the client can catch up through journal replay

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::broadcast;

use crate::events::types::Event;

/// Per-topic snapshot for the admin API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TopicStat {
    pub topic: String,
    pub subscribers: usize,
}

/// Topic-keyed broadcast fan-out.
pub struct EventBus {
    topics: DashMap<String, broadcast::Sender<Arc<Event>>>,
    capacity: usize,
    clients: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event to its topic. Returns how many subscribers
    /// received it; zero when nobody is listening.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic.clone();
        let delivered = match self.topics.get(&topic) {
            Some(sender) => sender.send(Arc::new(event)).unwrap_or(0),
            None => 0,
        };

        counter!("relay_events_published_total").increment(1);
        counter!("relay_events_delivered_total").increment(delivered as u64);
        tracing::debug!(topic = %topic, delivered, "Event published");
        delivered
    }

    /// Subscribe to a topic, creating its channel on first use.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Arc<Event>> {
        let receiver = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        gauge!("relay_topics").set(self.topics.len() as f64);
        receiver
    }

    /// Count a new SSE client against the cap. Returns `None` when the
    /// relay is full; the guard releases the slot on drop.
    pub fn try_register_client(&self, max_clients: usize) -> Option<ClientGuard> {
        let prev = self.clients.fetch_add(1, Ordering::SeqCst);
        if prev >= max_clients {
            self.clients.fetch_sub(1, Ordering::SeqCst);
            counter!("relay_clients_rejected_total").increment(1);
            return None;
        }
        gauge!("relay_sse_clients").set((prev + 1) as f64);
        Some(ClientGuard {
            clients: Arc::clone(&self.clients),
        })
    }

    /// Current SSE client count.
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Drop channels with no remaining subscribers. Runs periodically;
    /// a topic recreates its channel on the next subscribe.
    pub fn reap_idle(&self) -> usize {
        let before = self.topics.len();
        self.topics.retain(|_, sender| sender.receiver_count() > 0);
        let reaped = before - self.topics.len();
        if reaped > 0 {
            tracing::debug!(reaped, "Reaped idle topics");
        }
        gauge!("relay_topics").set(self.topics.len() as f64);
        reaped
    }

    /// Drop every channel, ending all live subscriber streams. Called
    /// at shutdown so SSE connections drain instead of idling forever.
    pub fn close(&self) {
        self.topics.clear();
        gauge!("relay_topics").set(0.0);
    }

    /// Per-topic subscriber counts, sorted by topic name.
    pub fn topic_stats(&self) -> Vec<TopicStat> {
        let mut stats: Vec<TopicStat> = self
            .topics
            .iter()
            .map(|entry| TopicStat {
                topic: entry.key().clone(),
                subscribers: entry.value().receiver_count(),
            })
            .collect();
        stats.sort_by(|a, b| a.topic.cmp(&b.topic));
        stats
    }
}

/// Releases an SSE client slot when the connection ends.
pub struct ClientGuard {
    clients: Arc<AtomicUsize>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let prev = self.clients.fetch_sub(1, Ordering::SeqCst);
        gauge!("relay_sse_clients").set(prev.saturating_sub(1) as f64);
    }
}
