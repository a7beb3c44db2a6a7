/// In-process store
///
/// Backs the test suite and lightweight embeddings. Mirrors the
/// conditional semantics the Postgres store gets from its constraints:
/// identifier-claiming writes and the code-issuance quota each run under
/// a single mutex, so the documented read-then-write races cannot occur.
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::models::{Account, AccountMergeRequest, AuthMethod, CodePurpose, VerificationCode};

use super::{AccountStore, MergeRequestStore, VerificationCodeStore};

#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<Uuid, Account>,
    merge_requests: DashMap<Uuid, AccountMergeRequest>,
    codes: Mutex<Vec<VerificationCode>>,
    /// Serializes writes that claim (method, identifier) pairs. Reads and
    /// per-code operations never take it, so unrelated accounts do not
    /// contend.
    claim_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn identifier_claimed_by_other(&self, account: &Account) -> bool {
        self.accounts.iter().any(|entry| {
            entry.key() != &account.id
                && account.bindings.iter().any(|b| {
                    entry
                        .value()
                        .binding(b.method)
                        .map(|existing| existing.identifier == b.identifier)
                        .unwrap_or(false)
                })
        })
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_identifier(
        &self,
        method: AuthMethod,
        identifier: &str,
    ) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .iter()
            .find(|entry| {
                entry
                    .value()
                    .binding(method)
                    .map(|b| b.identifier == identifier)
                    .unwrap_or(false)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.get(&id).map(|entry| entry.value().clone()))
    }

    async fn insert_account(&self, account: &Account) -> Result<()> {
        let _guard = self.claim_lock.lock().await;
        if self.identifier_claimed_by_other(account) {
            return Err(AuthError::UniqueViolation);
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        let _guard = self.claim_lock.lock().await;
        if !self.accounts.contains_key(&account.id) {
            return Err(AuthError::UserNotFound);
        }
        if self.identifier_claimed_by_other(account) {
            return Err(AuthError::UniqueViolation);
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn count_accounts(&self) -> Result<i64> {
        Ok(self.accounts.len() as i64)
    }
}

#[async_trait]
impl VerificationCodeStore for MemoryStore {
    async fn insert_code_if_quota(
        &self,
        code: &VerificationCode,
        window: Duration,
        max: i64,
    ) -> Result<bool> {
        // Count and insert under one lock: this is the atomic unit the
        // rate limit depends on.
        let mut codes = self.codes.lock().await;
        let cutoff = Utc::now() - window;
        let recent = codes
            .iter()
            .filter(|c| {
                c.identifier == code.identifier && c.method == code.method && c.created_at > cutoff
            })
            .count() as i64;
        if recent >= max {
            return Ok(false);
        }
        codes.push(code.clone());
        Ok(true)
    }

    async fn find_unused_code(
        &self,
        code: &str,
        identifier: &str,
        method: AuthMethod,
        purpose: CodePurpose,
    ) -> Result<Option<VerificationCode>> {
        let codes = self.codes.lock().await;
        Ok(codes
            .iter()
            .find(|c| {
                c.code == code
                    && c.identifier == identifier
                    && c.method == method
                    && c.purpose == purpose
                    && !c.is_used
            })
            .cloned())
    }

    async fn consume_code(&self, id: Uuid) -> Result<bool> {
        let mut codes = self.codes.lock().await;
        match codes.iter_mut().find(|c| c.id == id && !c.is_used) {
            Some(code) => {
                code.is_used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl MergeRequestStore for MemoryStore {
    async fn insert_merge_request(&self, request: &AccountMergeRequest) -> Result<()> {
        self.merge_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn find_merge_request(&self, id: Uuid) -> Result<Option<AccountMergeRequest>> {
        Ok(self
            .merge_requests
            .get(&id)
            .map(|entry| entry.value().clone()))
    }

    async fn update_merge_request(&self, request: &AccountMergeRequest) -> Result<()> {
        if !self.merge_requests.contains_key(&request.id) {
            return Err(AuthError::MergeRequestNotFound);
        }
        self.merge_requests.insert(request.id, request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_identifier_insert_is_rejected() {
        let store = MemoryStore::new();
        let a = Account::new(AuthMethod::Email, "a@x.com".to_string(), true);
        let b = Account::new(AuthMethod::Email, "a@x.com".to_string(), true);
        store.insert_account(&a).await.unwrap();
        assert!(matches!(
            store.insert_account(&b).await,
            Err(AuthError::UniqueViolation)
        ));
    }

    #[tokio::test]
    async fn same_identifier_different_method_is_fine() {
        let store = MemoryStore::new();
        let a = Account::new(AuthMethod::Email, "a@x.com".to_string(), true);
        let b = Account::new(AuthMethod::Github, "a@x.com".to_string(), true);
        store.insert_account(&a).await.unwrap();
        store.insert_account(&b).await.unwrap();
        assert_eq!(store.count_accounts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn quota_insert_is_atomic_under_contention() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let code = VerificationCode::new(
                    format!("{:06}", 100000 + i),
                    "+79001234567".to_string(),
                    AuthMethod::Phone,
                    CodePurpose::Registration,
                    "+79001234567".to_string(),
                );
                store
                    .insert_code_if_quota(&code, Duration::seconds(60), 3)
                    .await
                    .unwrap()
            }));
        }
        let mut issued = 0;
        for handle in handles {
            if handle.await.unwrap() {
                issued += 1;
            }
        }
        // Exactly the quota, never more, regardless of interleaving
        assert_eq!(issued, 3);
    }

    #[tokio::test]
    async fn consume_code_transitions_once() {
        let store = MemoryStore::new();
        let code = VerificationCode::new(
            "123456".to_string(),
            "a@x.com".to_string(),
            AuthMethod::Email,
            CodePurpose::Login,
            "a@x.com".to_string(),
        );
        store
            .insert_code_if_quota(&code, Duration::seconds(60), 3)
            .await
            .unwrap();
        assert!(store.consume_code(code.id).await.unwrap());
        assert!(!store.consume_code(code.id).await.unwrap());
    }
}
