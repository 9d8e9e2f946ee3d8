//! Ban cache refresh.
//!
//! A background task rebuilds the cache from storage on an interval;
//! admin write handlers also trigger an immediate refresh so their
//! changes apply without waiting out the interval. On storage errors
//! the task keeps the previous index: stale enforcement beats none.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::db::{BanRepository, DbError};
use crate::moderation::cache::BanCache;

/// One rebuild. Returns the number of active bans loaded.
pub async fn refresh(repo: &dyn BanRepository, cache: &BanCache) -> Result<usize, DbError> {
    let now = chrono::Utc::now().timestamp();
    let active = repo.active(now).await?;
    cache.replace(&active);
    Ok(active.len())
}

/// Refresh loop. Runs until shutdown.
pub async fn run_refresh(
    repo: Arc<dyn BanRepository>,
    cache: Arc<BanCache>,
    interval_secs: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.recv() => {
                tracing::debug!("Ban refresh stopping");
                return;
            }
        }

        match refresh(repo.as_ref(), cache.as_ref()).await {
            Ok(count) => tracing::debug!(active_bans = count, "Ban cache refreshed"),
            Err(e) => tracing::warn!(error = %e, "Ban refresh failed, keeping previous cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryBanRepository, NewBan};

    #[tokio::test]
    async fn refresh_loads_only_active_bans() {
        let repo = MemoryBanRepository::new();
        let now = chrono::Utc::now().timestamp();

        repo.insert(NewBan {
            kind: "account".into(),
            subject_id: 1,
            subject_name: None,
            issued_at: now,
            issued_by: "operator".into(),
            reason: "r".into(),
            public_reason: Some("Banned".into()),
            revoked_at: None,
        })
        .await
        .unwrap();
        repo.insert(NewBan {
            kind: "account".into(),
            subject_id: 2,
            subject_name: None,
            issued_at: now - 100,
            issued_by: "operator".into(),
            reason: "r".into(),
            public_reason: None,
            revoked_at: Some(now - 10),
        })
        .await
        .unwrap();

        let cache = BanCache::new();
        let loaded = refresh(&repo, &cache).await.unwrap();
        assert_eq!(loaded, 1);
        assert!(cache.check("account:1").is_some());
        assert!(cache.check("account:2").is_none());
    }
}
