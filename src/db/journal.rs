//! Event journal for `Last-Event-ID` replay.
//!
//! Every published event is appended with a monotonically increasing
//! sequence number. A reconnecting subscriber presents the id of the
//! last event it saw; replay returns everything after that point on
//! its topics, oldest first. An unknown id yields nothing: the client
//! fell off the retained window and simply resumes live.

use std::collections::VecDeque;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::DbError;
use crate::events::Event;

#[async_trait]
pub trait Journal: Send + Sync {
    async fn record(&self, event: &Event) -> Result<(), DbError>;

    /// Events after `last_id` on the given topics, oldest first.
    async fn replay_after(
        &self,
        last_id: Uuid,
        topics: &[String],
        limit: u32,
    ) -> Result<Vec<Event>, DbError>;

    /// Drop all but the newest `retain` entries. Returns rows removed.
    async fn prune(&self, retain: u64) -> Result<u64, DbError>;
}

/// Postgres-backed journal.
pub struct PgJournal {
    pool: PgPool,
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JournalRow {
    id: Uuid,
    topic: String,
    category: String,
    payload: serde_json::Value,
    created_at: i64,
}

impl From<JournalRow> for Event {
    fn from(row: JournalRow) -> Self {
        Event {
            id: row.id,
            topic: row.topic,
            category: row.category,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl Journal for PgJournal {
    async fn record(&self, event: &Event) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO event_journal (id, topic, category, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id)
        .bind(&event.topic)
        .bind(&event.category)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replay_after(
        &self,
        last_id: Uuid,
        topics: &[String],
        limit: u32,
    ) -> Result<Vec<Event>, DbError> {
        // The subselect yields no rows for an unknown id, and `seq >
        // NULL` matches nothing, which is exactly the fall-off-the-
        // window behavior we want.
        let rows: Vec<JournalRow> = sqlx::query_as(
            "SELECT id, topic, category, payload, created_at FROM event_journal \
             WHERE seq > (SELECT seq FROM event_journal WHERE id = $1) \
               AND topic = ANY($2) \
             ORDER BY seq ASC LIMIT $3",
        )
        .bind(last_id)
        .bind(topics.to_vec())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn prune(&self, retain: u64) -> Result<u64, DbError> {
        let result = sqlx::query(
            "DELETE FROM event_journal WHERE seq < (\
                SELECT COALESCE(MIN(seq), 0) FROM (\
                    SELECT seq FROM event_journal ORDER BY seq DESC LIMIT $1\
                ) AS keep)",
        )
        .bind(retain as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// In-memory journal used when the database layer is disabled. Replay
/// still works within one process lifetime, which is what development
/// and the integration tests need.
pub struct MemoryJournal {
    entries: RwLock<VecDeque<Event>>,
    capacity: usize,
}

impl MemoryJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity,
        }
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn record(&self, event: &Event) -> Result<(), DbError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push_back(event.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(())
    }

    async fn replay_after(
        &self,
        last_id: Uuid,
        topics: &[String],
        limit: u32,
    ) -> Result<Vec<Event>, DbError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let Some(position) = entries.iter().position(|e| e.id == last_id) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .iter()
            .skip(position + 1)
            .filter(|e| topics.contains(&e.topic))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn prune(&self, retain: u64) -> Result<u64, DbError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        while entries.len() as u64 > retain {
            entries.pop_front();
            removed += 1;
        }
        Ok(removed)
    }
}

/// Journal that records nothing, for deployments that keep the
/// database but switch replay off.
pub struct NullJournal;

#[async_trait]
impl Journal for NullJournal {
    async fn record(&self, _event: &Event) -> Result<(), DbError> {
        Ok(())
    }

    async fn replay_after(
        &self,
        _last_id: Uuid,
        _topics: &[String],
        _limit: u32,
    ) -> Result<Vec<Event>, DbError> {
        Ok(Vec::new())
    }

    async fn prune(&self, _retain: u64) -> Result<u64, DbError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(topic: &str, n: u64) -> Event {
        Event::new(topic, "tick", json!({ "n": n }))
    }

    #[tokio::test]
    async fn memory_replay_returns_later_events_on_topic() {
        let journal = MemoryJournal::new(100);
        let mut ids = Vec::new();
        for n in 0..5 {
            let e = event(if n % 2 == 0 { "a" } else { "b" }, n);
            ids.push(e.id);
            journal.record(&e).await.unwrap();
        }

        // After event 1 (topic b), topic a has events 2 and 4 left.
        let replayed = journal
            .replay_after(ids[1], &["a".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].payload, json!({ "n": 2 }));
        assert_eq!(replayed[1].payload, json!({ "n": 4 }));
    }

    #[tokio::test]
    async fn memory_replay_unknown_id_is_empty() {
        let journal = MemoryJournal::new(100);
        journal.record(&event("a", 0)).await.unwrap();
        let replayed = journal
            .replay_after(Uuid::new_v4(), &["a".to_string()], 10)
            .await
            .unwrap();
        assert!(replayed.is_empty());
    }

    #[tokio::test]
    async fn memory_replay_honors_limit() {
        let journal = MemoryJournal::new(100);
        let first = event("a", 0);
        journal.record(&first).await.unwrap();
        for n in 1..10 {
            journal.record(&event("a", n)).await.unwrap();
        }
        let replayed = journal
            .replay_after(first.id, &["a".to_string()], 3)
            .await
            .unwrap();
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed[2].payload, json!({ "n": 3 }));
    }

    #[tokio::test]
    async fn memory_capacity_evicts_oldest() {
        let journal = MemoryJournal::new(3);
        let first = event("a", 0);
        journal.record(&first).await.unwrap();
        for n in 1..5 {
            journal.record(&event("a", n)).await.unwrap();
        }
        // The first event fell off, so its id no longer anchors replay.
        let replayed = journal
            .replay_after(first.id, &["a".to_string()], 10)
            .await
            .unwrap();
        assert!(replayed.is_empty());
    }

    #[tokio::test]
    async fn memory_prune_reports_removed() {
        let journal = MemoryJournal::new(100);
        for n in 0..10 {
            journal.record(&event("a", n)).await.unwrap();
        }
        assert_eq!(journal.prune(4).await.unwrap(), 6);
        assert_eq!(journal.prune(4).await.unwrap(), 0);
    }
}
