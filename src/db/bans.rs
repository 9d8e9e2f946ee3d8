//! Ban storage.
//!
//! Plain row storage; the rules about who may be banned and when a
//! ban may change live in `moderation::service`, so both backends
//! behave identically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::DbError;
use crate::moderation::types::Ban;

/// Storage-level record for a new ban. `revoked_at` is pre-set for
/// temporary bans (expiry is modeled as a future revocation).
#[derive(Debug, Clone)]
pub struct NewBan {
    pub kind: String,
    pub subject_id: i64,
    pub subject_name: Option<String>,
    pub issued_at: i64,
    pub issued_by: String,
    pub reason: String,
    pub public_reason: Option<String>,
    pub revoked_at: Option<i64>,
}

#[async_trait]
pub trait BanRepository: Send + Sync {
    /// Bans whose revocation is unset or still in the future.
    async fn active(&self, now: i64) -> Result<Vec<Ban>, DbError>;

    /// Full record for one subject, newest first.
    async fn history(&self, kind: &str, subject_id: i64) -> Result<Vec<Ban>, DbError>;

    async fn get(&self, id: i64) -> Result<Option<Ban>, DbError>;

    async fn insert(&self, ban: NewBan) -> Result<Ban, DbError>;

    /// Rewrite the mutable fields of a ban. The issuer fields change
    /// too: whoever edits a ban owns it from then on.
    async fn update(
        &self,
        id: i64,
        reason: &str,
        public_reason: Option<&str>,
        revoked_at: Option<i64>,
        issued_at: i64,
        issued_by: &str,
    ) -> Result<Ban, DbError>;

    async fn revoke(&self, id: i64, revoked_at: i64, revoked_by: &str) -> Result<Ban, DbError>;
}

/// Postgres-backed repository.
pub struct PgBanRepository {
    pool: PgPool,
}

impl PgBanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BAN_COLUMNS: &str = "id, kind, subject_id, subject_name, issued_at, issued_by, \
                           reason, public_reason, revoked_at, revoked_by";

#[async_trait]
impl BanRepository for PgBanRepository {
    async fn active(&self, now: i64) -> Result<Vec<Ban>, DbError> {
        let bans = sqlx::query_as(&format!(
            "SELECT {} FROM bans WHERE revoked_at IS NULL OR revoked_at > $1 ORDER BY id",
            BAN_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(bans)
    }

    async fn history(&self, kind: &str, subject_id: i64) -> Result<Vec<Ban>, DbError> {
        let bans = sqlx::query_as(&format!(
            "SELECT {} FROM bans WHERE kind = $1 AND subject_id = $2 ORDER BY id DESC",
            BAN_COLUMNS
        ))
        .bind(kind)
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bans)
    }

    async fn get(&self, id: i64) -> Result<Option<Ban>, DbError> {
        let ban = sqlx::query_as(&format!(
            "SELECT {} FROM bans WHERE id = $1",
            BAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ban)
    }

    async fn insert(&self, ban: NewBan) -> Result<Ban, DbError> {
        let ban = sqlx::query_as(&format!(
            "INSERT INTO bans \
             (kind, subject_id, subject_name, issued_at, issued_by, reason, public_reason, revoked_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            BAN_COLUMNS
        ))
        .bind(&ban.kind)
        .bind(ban.subject_id)
        .bind(&ban.subject_name)
        .bind(ban.issued_at)
        .bind(&ban.issued_by)
        .bind(&ban.reason)
        .bind(&ban.public_reason)
        .bind(ban.revoked_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(ban)
    }

    async fn update(
        &self,
        id: i64,
        reason: &str,
        public_reason: Option<&str>,
        revoked_at: Option<i64>,
        issued_at: i64,
        issued_by: &str,
    ) -> Result<Ban, DbError> {
        let ban = sqlx::query_as(&format!(
            "UPDATE bans SET reason = $2, public_reason = $3, revoked_at = $4, \
             issued_at = $5, issued_by = $6 WHERE id = $1 RETURNING {}",
            BAN_COLUMNS
        ))
        .bind(id)
        .bind(reason)
        .bind(public_reason)
        .bind(revoked_at)
        .bind(issued_at)
        .bind(issued_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(ban)
    }

    async fn revoke(&self, id: i64, revoked_at: i64, revoked_by: &str) -> Result<Ban, DbError> {
        let ban = sqlx::query_as(&format!(
            "UPDATE bans SET revoked_at = $2, revoked_by = $3 WHERE id = $1 RETURNING {}",
            BAN_COLUMNS
        ))
        .bind(id)
        .bind(revoked_at)
        .bind(revoked_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(ban)
    }
}

/// In-memory repository used when the database layer is disabled.
pub struct MemoryBanRepository {
    bans: Mutex<Vec<Ban>>,
    next_id: AtomicI64,
}

impl MemoryBanRepository {
    pub fn new() -> Self {
        Self {
            bans: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryBanRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BanRepository for MemoryBanRepository {
    async fn active(&self, now: i64) -> Result<Vec<Ban>, DbError> {
        let bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(bans.iter().filter(|b| b.is_active(now)).cloned().collect())
    }

    async fn history(&self, kind: &str, subject_id: i64) -> Result<Vec<Ban>, DbError> {
        let bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Ban> = bans
            .iter()
            .filter(|b| b.kind == kind && b.subject_id == subject_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(matching)
    }

    async fn get(&self, id: i64) -> Result<Option<Ban>, DbError> {
        let bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(bans.iter().find(|b| b.id == id).cloned())
    }

    async fn insert(&self, ban: NewBan) -> Result<Ban, DbError> {
        let stored = Ban {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            kind: ban.kind,
            subject_id: ban.subject_id,
            subject_name: ban.subject_name,
            issued_at: ban.issued_at,
            issued_by: ban.issued_by,
            reason: ban.reason,
            public_reason: ban.public_reason,
            revoked_at: ban.revoked_at,
            revoked_by: None,
        };
        let mut bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        bans.push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: i64,
        reason: &str,
        public_reason: Option<&str>,
        revoked_at: Option<i64>,
        issued_at: i64,
        issued_by: &str,
    ) -> Result<Ban, DbError> {
        let mut bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        let ban = bans
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))?;
        ban.reason = reason.to_string();
        ban.public_reason = public_reason.map(str::to_string);
        ban.revoked_at = revoked_at;
        ban.issued_at = issued_at;
        ban.issued_by = issued_by.to_string();
        Ok(ban.clone())
    }

    async fn revoke(&self, id: i64, revoked_at: i64, revoked_by: &str) -> Result<Ban, DbError> {
        let mut bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        let ban = bans
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))?;
        ban.revoked_at = Some(revoked_at);
        ban.revoked_by = Some(revoked_by.to_string());
        Ok(ban.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(kind: &str, subject_id: i64) -> NewBan {
        NewBan {
            kind: kind.into(),
            subject_id,
            subject_name: None,
            issued_at: 1_700_000_000,
            issued_by: "operator".into(),
            reason: "test".into(),
            public_reason: None,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn memory_insert_assigns_increasing_ids() {
        let repo = MemoryBanRepository::new();
        let a = repo.insert(draft("account", 1)).await.unwrap();
        let b = repo.insert(draft("account", 2)).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn memory_active_excludes_revoked_and_expired() {
        let repo = MemoryBanRepository::new();
        let now = 1_700_000_500;

        repo.insert(draft("account", 1)).await.unwrap();
        let mut expired = draft("account", 2);
        expired.revoked_at = Some(now - 10);
        repo.insert(expired).await.unwrap();
        let mut pending = draft("account", 3);
        pending.revoked_at = Some(now + 600);
        repo.insert(pending).await.unwrap();

        let active = repo.active(now).await.unwrap();
        let ids: Vec<i64> = active.iter().map(|b| b.subject_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn memory_history_is_newest_first_per_subject() {
        let repo = MemoryBanRepository::new();
        let first = repo.insert(draft("account", 7)).await.unwrap();
        repo.insert(draft("character", 7)).await.unwrap();
        let second = repo.insert(draft("account", 7)).await.unwrap();

        let history = repo.history("account", 7).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
    }

    #[tokio::test]
    async fn memory_revoke_records_who_and_when() {
        let repo = MemoryBanRepository::new();
        let ban = repo.insert(draft("account", 1)).await.unwrap();
        let revoked = repo.revoke(ban.id, 1_700_000_100, "operator").await.unwrap();
        assert_eq!(revoked.revoked_at, Some(1_700_000_100));
        assert_eq!(revoked.revoked_by.as_deref(), Some("operator"));
        assert!(!revoked.is_active(1_700_000_200));
    }
}
