//! Ban rules.
//!
//! # Responsibilities
//! - Field validation for create and edit payloads
//! - Protected subjects can never be banned
//! - Only active bans can be edited; editing transfers ownership to
//!   the editor
//! - Revoking reports who beat you to it (or that the ban simply
//!   expired) instead of silently succeeding twice
//!
//! The rules sit above `BanRepository`, so the in-memory and Postgres
//! backends enforce identical behavior.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::RelayConfig;
use crate::db::{BanRepository, DbError, NewBan};
use crate::moderation::types::{validate_kind, Ban, BanUpdate, DraftBan};

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("One or more body parameters are missing")]
    MissingField,

    #[error("'{kind}' is not a valid subject kind")]
    InvalidSubject { kind: String },

    #[error("Ban duration must be positive")]
    InvalidDuration,

    #[error("{subject} cannot be banned")]
    Protected { subject: String },

    #[error("Could not find a ban with the ID of {id}")]
    NotFound { id: i64 },

    #[error("Only active bans can be updated")]
    NotActive,

    #[error("Cannot revoke the ban as it has already expired")]
    AlreadyExpired,

    #[error("{by} has already revoked this ban")]
    AlreadyRevoked { by: String },

    #[error(transparent)]
    Storage(#[from] DbError),
}

pub struct BanService {
    repo: Arc<dyn BanRepository>,
    config: Arc<ArcSwap<RelayConfig>>,
}

impl BanService {
    pub fn new(repo: Arc<dyn BanRepository>, config: Arc<ArcSwap<RelayConfig>>) -> Self {
        Self { repo, config }
    }

    pub fn repository(&self) -> &Arc<dyn BanRepository> {
        &self.repo
    }

    pub async fn list_active(&self, now: i64) -> Result<Vec<Ban>, ModerationError> {
        Ok(self.repo.active(now).await?)
    }

    pub async fn history(&self, kind: &str, subject_id: i64) -> Result<Vec<Ban>, ModerationError> {
        if !validate_kind(kind) {
            return Err(ModerationError::InvalidSubject {
                kind: kind.to_string(),
            });
        }
        Ok(self.repo.history(kind, subject_id).await?)
    }

    pub async fn create(&self, draft: DraftBan, now: i64) -> Result<Ban, ModerationError> {
        if draft.reason.trim().is_empty() || draft.issued_by.trim().is_empty() {
            return Err(ModerationError::MissingField);
        }
        if !validate_kind(&draft.kind) {
            return Err(ModerationError::InvalidSubject { kind: draft.kind });
        }

        let subject = format!("{}:{}", draft.kind, draft.subject_id);
        let protected = &self.config.load().moderation.protected_subjects;
        if protected.iter().any(|p| p == &subject) {
            return Err(ModerationError::Protected { subject });
        }

        let revoked_at = expiry_from_duration(draft.duration_secs, now)?;

        let ban = self
            .repo
            .insert(NewBan {
                kind: draft.kind,
                subject_id: draft.subject_id,
                subject_name: draft.subject_name,
                issued_at: now,
                issued_by: draft.issued_by,
                reason: draft.reason,
                public_reason: draft.public_reason,
                revoked_at,
            })
            .await?;

        tracing::info!(
            ban_id = ban.id,
            subject = %ban.subject_key(),
            issued_by = %ban.issued_by,
            temporary = ban.revoked_at.is_some(),
            "Ban created"
        );
        Ok(ban)
    }

    pub async fn update(
        &self,
        id: i64,
        update: BanUpdate,
        now: i64,
    ) -> Result<Ban, ModerationError> {
        if update.reason.trim().is_empty() || update.updated_by.trim().is_empty() {
            return Err(ModerationError::MissingField);
        }

        let existing = self
            .repo
            .get(id)
            .await?
            .ok_or(ModerationError::NotFound { id })?;
        if !existing.is_active(now) {
            return Err(ModerationError::NotActive);
        }

        let revoked_at = expiry_from_duration(update.duration_secs, now)?;

        let ban = self
            .repo
            .update(
                id,
                &update.reason,
                update.public_reason.as_deref(),
                revoked_at,
                now,
                &update.updated_by,
            )
            .await?;

        tracing::info!(ban_id = ban.id, issued_by = %ban.issued_by, "Ban updated");
        Ok(ban)
    }

    pub async fn revoke(
        &self,
        id: i64,
        revoked_by: &str,
        now: i64,
    ) -> Result<Ban, ModerationError> {
        if revoked_by.trim().is_empty() {
            return Err(ModerationError::MissingField);
        }

        let existing = self
            .repo
            .get(id)
            .await?
            .ok_or(ModerationError::NotFound { id })?;
        if !existing.is_active(now) {
            return Err(match existing.revoked_by {
                Some(by) => ModerationError::AlreadyRevoked { by },
                None => ModerationError::AlreadyExpired,
            });
        }

        let ban = self.repo.revoke(id, now, revoked_by).await?;
        tracing::info!(
            ban_id = ban.id,
            subject = %ban.subject_key(),
            revoked_by,
            "Ban revoked"
        );
        Ok(ban)
    }
}

/// Expiry is stored as a future revocation.
fn expiry_from_duration(
    duration_secs: Option<i64>,
    now: i64,
) -> Result<Option<i64>, ModerationError> {
    match duration_secs {
        None => Ok(None),
        Some(d) if d > 0 => Ok(Some(now + d)),
        Some(_) => Err(ModerationError::InvalidDuration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBanRepository;

    const NOW: i64 = 1_700_000_000;

    fn service(protected: &[&str]) -> BanService {
        let mut config = RelayConfig::default();
        config.moderation.protected_subjects =
            protected.iter().map(|s| s.to_string()).collect();
        BanService::new(
            Arc::new(MemoryBanRepository::new()),
            Arc::new(ArcSwap::from_pointee(config)),
        )
    }

    fn draft(subject_id: i64) -> DraftBan {
        DraftBan {
            kind: "account".into(),
            subject_id,
            subject_name: Some("Some Pilot".into()),
            reason: "multiboxing".into(),
            public_reason: Some("Rule violation".into()),
            duration_secs: None,
            issued_by: "operator".into(),
        }
    }

    #[tokio::test]
    async fn create_and_list() {
        let service = service(&[]);
        let ban = service.create(draft(1), NOW).await.unwrap();
        assert_eq!(ban.issued_at, NOW);
        assert!(ban.revoked_at.is_none());

        let active = service.list_active(NOW).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn temporary_ban_expires_on_its_own() {
        let service = service(&[]);
        let mut d = draft(1);
        d.duration_secs = Some(600);
        let ban = service.create(d, NOW).await.unwrap();
        assert_eq!(ban.revoked_at, Some(NOW + 600));
        assert!(ban.is_active(NOW + 599));
        assert!(!ban.is_active(NOW + 600));
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let service = service(&[]);
        let mut d = draft(1);
        d.reason = "   ".into();
        assert!(matches!(
            service.create(d, NOW).await,
            Err(ModerationError::MissingField)
        ));

        let mut d = draft(1);
        d.duration_secs = Some(0);
        assert!(matches!(
            service.create(d, NOW).await,
            Err(ModerationError::InvalidDuration)
        ));
    }

    #[tokio::test]
    async fn protected_subjects_cannot_be_banned() {
        let service = service(&["account:42"]);
        let err = service.create(draft(42), NOW).await.unwrap_err();
        assert_eq!(err.to_string(), "account:42 cannot be banned");
        // Everyone else still can be.
        assert!(service.create(draft(43), NOW).await.is_ok());
    }

    #[tokio::test]
    async fn update_requires_active_ban_and_transfers_ownership() {
        let service = service(&[]);
        let ban = service.create(draft(1), NOW).await.unwrap();

        let updated = service
            .update(
                ban.id,
                BanUpdate {
                    reason: "multiboxing, appealed".into(),
                    public_reason: None,
                    duration_secs: Some(3600),
                    updated_by: "senior".into(),
                },
                NOW + 100,
            )
            .await
            .unwrap();
        assert_eq!(updated.issued_by, "senior");
        assert_eq!(updated.issued_at, NOW + 100);
        assert_eq!(updated.revoked_at, Some(NOW + 100 + 3600));
        assert_eq!(updated.public_reason, None);

        // Once expired it can no longer be edited.
        let err = service
            .update(
                ban.id,
                BanUpdate {
                    reason: "late edit".into(),
                    public_reason: None,
                    duration_secs: None,
                    updated_by: "senior".into(),
                },
                NOW + 100 + 3600,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::NotActive));
    }

    #[tokio::test]
    async fn revoke_guards() {
        let service = service(&[]);

        assert!(matches!(
            service.revoke(999, "operator", NOW).await,
            Err(ModerationError::NotFound { id: 999 })
        ));

        let ban = service.create(draft(1), NOW).await.unwrap();
        let revoked = service.revoke(ban.id, "operator", NOW + 50).await.unwrap();
        assert_eq!(revoked.revoked_at, Some(NOW + 50));

        let err = service.revoke(ban.id, "other", NOW + 60).await.unwrap_err();
        assert_eq!(err.to_string(), "operator has already revoked this ban");

        let mut temp = draft(2);
        temp.duration_secs = Some(10);
        let ban = service.create(temp, NOW).await.unwrap();
        let err = service.revoke(ban.id, "operator", NOW + 11).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot revoke the ban as it has already expired"
        );
    }

    #[tokio::test]
    async fn early_revoke_of_temporary_ban_is_allowed() {
        let service = service(&[]);
        let mut temp = draft(2);
        temp.duration_secs = Some(3600);
        let ban = service.create(temp, NOW).await.unwrap();

        let revoked = service.revoke(ban.id, "operator", NOW + 10).await.unwrap();
        assert_eq!(revoked.revoked_at, Some(NOW + 10));
        assert_eq!(revoked.revoked_by.as_deref(), Some("operator"));
    }

    #[tokio::test]
    async fn history_spans_revoked_bans() {
        let service = service(&[]);
        let ban = service.create(draft(5), NOW).await.unwrap();
        service.revoke(ban.id, "operator", NOW + 1).await.unwrap();
        service.create(draft(5), NOW + 2).await.unwrap();

        let history = service.history("account", 5).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].id > history[1].id);

        assert!(matches!(
            service.history("Account!", 5).await,
            Err(ModerationError::InvalidSubject { .. })
        ));
    }
}
