/// Repository contracts for the accounts service
///
/// Storage engine internals stay behind these traits; the services only
/// assume the conditional semantics spelled out per method. Two
/// implementations ship here: `PgStore` (Postgres via sqlx) and
/// `MemoryStore` (in-process, used by tests and embedders).
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Account, AccountMergeRequest, AuthMethod, CodePurpose, VerificationCode};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Pure lookup by a normalized (method, identifier) pair.
    async fn find_by_identifier(
        &self,
        method: AuthMethod,
        identifier: &str,
    ) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Persist a new account. Fails with `AuthError::UniqueViolation`
    /// when any of its bindings' (method, identifier) is already claimed.
    async fn insert_account(&self, account: &Account) -> Result<()>;

    /// Replace the stored account wholesale. Binding uniqueness is
    /// enforced the same way as on insert.
    async fn update_account(&self, account: &Account) -> Result<()>;

    /// Total number of accounts ever created (bootstrap-role check).
    async fn count_accounts(&self) -> Result<i64>;
}

#[async_trait]
pub trait VerificationCodeStore: Send + Sync {
    /// Persist `code` only if fewer than `max` codes exist for its
    /// (identifier, method) inside the trailing `window`.
    ///
    /// Count and insert are one atomic unit against the store; a
    /// read-then-write race between two issuers must be impossible.
    /// Returns false when the quota is exhausted.
    async fn insert_code_if_quota(
        &self,
        code: &VerificationCode,
        window: Duration,
        max: i64,
    ) -> Result<bool>;

    /// The single matching unused record, or none.
    async fn find_unused_code(
        &self,
        code: &str,
        identifier: &str,
        method: AuthMethod,
        purpose: CodePurpose,
    ) -> Result<Option<VerificationCode>>;

    /// Flip `is_used` false -> true. Returns true only for the call that
    /// performed the transition.
    async fn consume_code(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait MergeRequestStore: Send + Sync {
    async fn insert_merge_request(&self, request: &AccountMergeRequest) -> Result<()>;

    async fn find_merge_request(&self, id: Uuid) -> Result<Option<AccountMergeRequest>>;

    async fn update_merge_request(&self, request: &AccountMergeRequest) -> Result<()>;
}

/// Everything the identity services need from persistence.
pub trait IdentityStore: AccountStore + VerificationCodeStore + MergeRequestStore {}

impl<T> IdentityStore for T where T: AccountStore + VerificationCodeStore + MergeRequestStore {}
