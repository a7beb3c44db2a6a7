/// Identity resolver
///
/// The single source of truth for "does this identity already exist".
/// Normalization happens here, at the boundary, so every caller compares
/// canonical identifiers.
use std::sync::Arc;

use crate::db::IdentityStore;
use crate::error::{AuthError, Result};
use crate::models::{Account, AuthMethod};

#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Look up an account by a (method, identifier) pair. Pure lookup,
    /// no side effects.
    pub async fn find_by_identifier(
        &self,
        method: AuthMethod,
        identifier: &str,
    ) -> Result<Option<Account>> {
        let normalized = self.normalize(method, identifier)?;
        self.store.find_by_identifier(method, &normalized).await
    }

    /// Canonicalize and shape-check an identifier for a method.
    pub fn normalize(&self, method: AuthMethod, identifier: &str) -> Result<String> {
        let normalized = method.normalize(identifier);
        if !method.validate(&normalized) {
            return Err(AuthError::Validation(format!(
                "Malformed identifier for method {method}"
            )));
        }
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AccountStore, MemoryStore};

    #[tokio::test]
    async fn resolution_is_case_insensitive_for_email() {
        let store = Arc::new(MemoryStore::new());
        let account = Account::new(AuthMethod::Email, "user@example.com".to_string(), true);
        store.insert_account(&account).await.unwrap();

        let resolver = IdentityResolver::new(store);
        let found = resolver
            .find_by_identifier(AuthMethod::Email, "User@Example.COM")
            .await
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some(account.id));
    }

    #[tokio::test]
    async fn malformed_identifier_is_rejected_before_lookup() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStore::new()));
        let err = resolver
            .find_by_identifier(AuthMethod::Email, "not-an-email")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStore::new()));
        let found = resolver
            .find_by_identifier(AuthMethod::Phone, "+79001234567")
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
