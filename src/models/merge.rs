use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthMethod;

/// Merge requests stay actionable for 24 hours.
pub const MERGE_REQUEST_TTL_HOURS: i64 = 24;

/// Conflicting values for a single account field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub primary: String,
    pub secondary: String,
}

/// Field name -> {primary, secondary} value pair. Pure value object.
///
/// BTreeMap keeps field iteration deterministic for logs and payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflicts(pub BTreeMap<String, ConflictEntry>);

impl MergeConflicts {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, field: &str, primary: String, secondary: String) {
        self.0
            .insert(field.to_string(), ConflictEntry { primary, secondary });
    }

    pub fn get(&self, field: &str) -> Option<&ConflictEntry> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "merge_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Pending,
    Resolved,
    Rejected,
    Expired,
}

/// Which side of a conflict wins a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeSide {
    Primary,
    Secondary,
}

/// Caller-supplied per-field choices. The workflow applies them; it
/// never decides them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeResolution {
    pub choices: BTreeMap<String, MergeSide>,
}

impl MergeResolution {
    pub fn choose(mut self, field: &str, side: MergeSide) -> Self {
        self.choices.insert(field.to_string(), side);
        self
    }
}

/// A detected identity collision awaiting resolution.
///
/// `pending` is the only initial state. `pending -> resolved` happens on
/// an explicit resolve call; `pending -> expired` is observed lazily when
/// the request is read past `expires_at`. Terminal states never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountMergeRequest {
    pub id: Uuid,
    pub primary_account_id: Uuid,
    /// Self-referential until a genuine second account exists.
    pub secondary_account_id: Option<Uuid>,
    pub method: AuthMethod,
    pub conflicts: MergeConflicts,
    pub status: MergeStatus,
    pub resolution: Option<MergeResolution>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccountMergeRequest {
    pub fn new(
        primary_account_id: Uuid,
        secondary_account_id: Option<Uuid>,
        method: AuthMethod,
        conflicts: MergeConflicts,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            primary_account_id,
            secondary_account_id,
            method,
            conflicts,
            status: MergeStatus::Pending,
            resolution: None,
            expires_at: now + Duration::hours(MERGE_REQUEST_TTL_HOURS),
            resolved_at: None,
            created_at: now,
        }
    }

    /// Lazy expiry check; no background sweeper exists.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == MergeStatus::Pending && self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_is_pending_with_24h_window() {
        let req = AccountMergeRequest::new(
            Uuid::new_v4(),
            None,
            AuthMethod::Github,
            MergeConflicts::default(),
        );
        assert_eq!(req.status, MergeStatus::Pending);
        assert!(req.resolution.is_none());
        assert!(!req.is_expired(Utc::now()));
        assert!(req.is_expired(Utc::now() + Duration::hours(MERGE_REQUEST_TTL_HOURS + 1)));
    }

    #[test]
    fn resolved_request_never_reads_as_expired() {
        let mut req = AccountMergeRequest::new(
            Uuid::new_v4(),
            None,
            AuthMethod::Github,
            MergeConflicts::default(),
        );
        req.status = MergeStatus::Resolved;
        assert!(!req.is_expired(Utc::now() + Duration::hours(48)));
    }

    #[test]
    fn conflicts_keep_both_sides() {
        let mut conflicts = MergeConflicts::default();
        conflicts.insert("first_name", "Anna".to_string(), "Ann".to_string());
        let entry = conflicts.get("first_name").unwrap();
        assert_eq!(entry.primary, "Anna");
        assert_eq!(entry.secondary, "Ann");
    }
}
