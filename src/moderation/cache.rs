//! Active-ban cache.
//!
//! Subscribe requests check bans on the hot path, so the check must
//! not touch the database. The cache is a read-optimized index of
//! active subject keys, rebuilt wholesale by the refresh task and
//! swapped in atomically.

use std::collections::HashMap;

use arc_swap::ArcSwap;
use metrics::gauge;

use crate::moderation::types::Ban;

/// What enforcement needs to know about a banned subject. Only the
/// public reason leaves the relay; the internal reason never does.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveBan {
    pub public_reason: Option<String>,
}

pub struct BanCache {
    index: ArcSwap<HashMap<String, ActiveBan>>,
}

impl BanCache {
    pub fn new() -> Self {
        Self {
            index: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Replace the whole index from the current active set.
    pub fn replace(&self, bans: &[Ban]) {
        let index: HashMap<String, ActiveBan> = bans
            .iter()
            .map(|ban| {
                (
                    ban.subject_key(),
                    ActiveBan {
                        public_reason: ban.public_reason.clone(),
                    },
                )
            })
            .collect();
        gauge!("relay_active_bans").set(index.len() as f64);
        self.index.store(std::sync::Arc::new(index));
    }

    pub fn check(&self, subject: &str) -> Option<ActiveBan> {
        self.index.load().get(subject).cloned()
    }

    pub fn len(&self) -> usize {
        self.index.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.load().is_empty()
    }
}

impl Default for BanCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ban(subject_id: i64, public_reason: Option<&str>) -> Ban {
        Ban {
            id: subject_id,
            kind: "account".into(),
            subject_id,
            subject_name: None,
            issued_at: 0,
            issued_by: "operator".into(),
            reason: "internal detail".into(),
            public_reason: public_reason.map(str::to_string),
            revoked_at: None,
            revoked_by: None,
        }
    }

    #[test]
    fn replace_and_check() {
        let cache = BanCache::new();
        assert!(cache.check("account:1").is_none());

        cache.replace(&[ban(1, Some("Rule violation")), ban(2, None)]);
        assert_eq!(
            cache.check("account:1"),
            Some(ActiveBan {
                public_reason: Some("Rule violation".into())
            })
        );
        assert_eq!(cache.check("account:2"), Some(ActiveBan { public_reason: None }));
        assert!(cache.check("account:3").is_none());
    }

    #[test]
    fn replace_drops_lifted_bans() {
        let cache = BanCache::new();
        cache.replace(&[ban(1, None)]);
        assert_eq!(cache.len(), 1);

        cache.replace(&[]);
        assert!(cache.is_empty());
        assert!(cache.check("account:1").is_none());
    }
}
