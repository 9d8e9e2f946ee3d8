//! Ban model.
//!
//! A ban names a subject (`kind` plus numeric id), who issued it and
//! why, and an optional revocation. Temporary bans are bans whose
//! `revoked_at` is set in the future at creation time; a ban is active
//! while `revoked_at` is null or still ahead of the clock. Revoking
//! early just pulls `revoked_at` back to now.

use serde::{Deserialize, Serialize};

/// A stored ban.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ban {
    pub id: i64,
    pub kind: String,
    pub subject_id: i64,
    pub subject_name: Option<String>,
    /// Unix seconds. Refreshed when the ban is edited.
    pub issued_at: i64,
    pub issued_by: String,
    /// Internal reason, shown to operators only.
    pub reason: String,
    /// Reason shown to the banned subject, if any.
    pub public_reason: Option<String>,
    pub revoked_at: Option<i64>,
    pub revoked_by: Option<String>,
}

impl Ban {
    pub fn is_active(&self, now: i64) -> bool {
        match self.revoked_at {
            None => true,
            Some(at) => at > now,
        }
    }

    /// Cache key, matching the `sub` format in subscriber tokens.
    pub fn subject_key(&self) -> String {
        format!("{}:{}", self.kind, self.subject_id)
    }
}

/// Payload for creating a ban.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftBan {
    pub kind: String,
    pub subject_id: i64,
    #[serde(default)]
    pub subject_name: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub public_reason: Option<String>,
    /// Seconds until automatic expiry; permanent when absent.
    #[serde(default)]
    pub duration_secs: Option<i64>,
    pub issued_by: String,
}

/// Payload for editing an active ban.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanUpdate {
    pub reason: String,
    #[serde(default)]
    pub public_reason: Option<String>,
    /// New expiry window from now; permanent when absent.
    #[serde(default)]
    pub duration_secs: Option<i64>,
    pub updated_by: String,
}

/// Validate a subject kind. Same charset rules as topics, minus the
/// `:` separator which delimits kind from id in subject keys.
pub fn validate_kind(kind: &str) -> bool {
    !kind.is_empty()
        && kind.len() <= 32
        && kind
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}
