/// Conflict detection and account-merge workflow
///
/// When an incoming identity partially overlaps an existing account, the
/// overlap is recorded as a pending merge request instead of being
/// silently absorbed. Which side wins each field is the caller's call at
/// resolution time; this service only detects, persists and finalizes.
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::IdentityStore;
use crate::error::{AuthError, Result};
use crate::models::{
    Account, AccountMergeRequest, AuthMethod, MergeConflicts, MergeResolution, MergeSide,
    MergeStatus,
};

/// Profile fields an incoming identity may carry.
#[derive(Debug, Clone, Default)]
pub struct IncomingProfile {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct MergeService {
    store: Arc<dyn IdentityStore>,
}

impl MergeService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Compare each field the incoming identity would set against the
    /// existing account. A conflict needs a non-empty existing value
    /// that differs from the incoming one; an empty existing field is a
    /// fill-in, not a conflict.
    pub fn detect_conflicts(
        existing: &Account,
        incoming_method: AuthMethod,
        incoming_identifier: &str,
        profile: &IncomingProfile,
    ) -> MergeConflicts {
        let mut conflicts = MergeConflicts::default();

        if let Some(current) = existing.identifier(incoming_method) {
            if current != incoming_identifier {
                conflicts.insert(
                    incoming_method.as_str(),
                    current.to_string(),
                    incoming_identifier.to_string(),
                );
            }
        }

        let pairs: [(&str, Option<&str>, Option<&str>); 6] = [
            ("email", existing.email(), profile.email.as_deref()),
            ("phone", existing.phone(), profile.phone.as_deref()),
            (
                "first_name",
                existing.first_name.as_deref(),
                profile.first_name.as_deref(),
            ),
            (
                "last_name",
                existing.last_name.as_deref(),
                profile.last_name.as_deref(),
            ),
            (
                "display_name",
                existing.display_name.as_deref(),
                profile.display_name.as_deref(),
            ),
            (
                "avatar_url",
                existing.avatar_url.as_deref(),
                profile.avatar_url.as_deref(),
            ),
        ];

        for (field, current, incoming) in pairs {
            if let (Some(current), Some(incoming)) = (current, incoming) {
                if !current.is_empty() && !incoming.is_empty() && current != incoming {
                    // Never double-record the contested identifier field
                    if conflicts.get(field).is_none() {
                        conflicts.insert(field, current.to_string(), incoming.to_string());
                    }
                }
            }
        }

        conflicts
    }

    /// Persist a pending merge request for a non-empty conflict set.
    /// Notification of either party is someone else's job.
    pub async fn create_merge_request(
        &self,
        primary_account_id: Uuid,
        secondary_account_id: Option<Uuid>,
        method: AuthMethod,
        conflicts: MergeConflicts,
    ) -> Result<AccountMergeRequest> {
        if conflicts.is_empty() {
            return Err(AuthError::Internal(
                "refusing to create a merge request with no conflicts".to_string(),
            ));
        }

        let request =
            AccountMergeRequest::new(primary_account_id, secondary_account_id, method, conflicts);
        self.store.insert_merge_request(&request).await?;

        info!(
            merge_request_id = %request.id,
            primary_account_id = %primary_account_id,
            method = %method,
            "Merge request created"
        );

        Ok(request)
    }

    /// Apply a caller-supplied resolution to a pending request.
    ///
    /// Terminal states fail loudly: retrying a resolve can never
    /// double-apply. Expiry is observed here, lazily, on access.
    pub async fn resolve_merge(
        &self,
        merge_request_id: Uuid,
        resolution: MergeResolution,
    ) -> Result<Account> {
        let mut request = self
            .store
            .find_merge_request(merge_request_id)
            .await?
            .ok_or(AuthError::MergeRequestNotFound)?;

        match request.status {
            MergeStatus::Pending => {}
            MergeStatus::Expired => return Err(AuthError::MergeExpired),
            MergeStatus::Resolved | MergeStatus::Rejected => {
                return Err(AuthError::MergeAlreadyResolved)
            }
        }

        let now = Utc::now();
        if request.is_expired(now) {
            request.status = MergeStatus::Expired;
            self.store.update_merge_request(&request).await?;
            return Err(AuthError::MergeExpired);
        }

        let mut account = self
            .store
            .find_by_id(request.primary_account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        for (field, side) in &resolution.choices {
            if *side == MergeSide::Secondary {
                if let Some(entry) = request.conflicts.get(field) {
                    apply_field(&mut account, field, entry.secondary.clone());
                }
            }
        }
        account.updated_at = now;
        self.store.update_account(&account).await?;

        request.status = MergeStatus::Resolved;
        request.resolution = Some(resolution);
        request.resolved_at = Some(now);
        self.store.update_merge_request(&request).await?;

        info!(
            merge_request_id = %request.id,
            account_id = %account.id,
            "Merge request resolved"
        );

        Ok(account)
    }
}

fn apply_field(account: &mut Account, field: &str, value: String) {
    match field {
        "first_name" => account.first_name = Some(value),
        "last_name" => account.last_name = Some(value),
        "display_name" => account.display_name = Some(value),
        "avatar_url" => account.avatar_url = Some(value),
        "email" => {
            if let Some(binding) = account
                .bindings
                .iter_mut()
                .find(|b| b.method == AuthMethod::Email)
            {
                binding.identifier = value;
            }
        }
        "phone" => {
            if let Some(binding) = account
                .bindings
                .iter_mut()
                .find(|b| b.method == AuthMethod::Phone)
            {
                binding.identifier = value;
            }
        }
        // Unknown field names in a resolution are ignored, not fatal
        _ => {}
    }
}
