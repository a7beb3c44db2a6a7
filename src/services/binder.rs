/// Auth-method binder
///
/// Attaches and detaches methods on an existing account. Unbinding the
/// last method would orphan the account, so it is refused outright.
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::IdentityStore;
use crate::error::{AuthError, Result};
use crate::models::{Account, AuthBinding, AuthMethod, CodePurpose};
use crate::services::verification::VerificationService;
use crate::validators::mask_identifier;

#[derive(Clone)]
pub struct AuthMethodBinder {
    store: Arc<dyn IdentityStore>,
    verification: VerificationService,
}

impl AuthMethodBinder {
    pub fn new(store: Arc<dyn IdentityStore>, verification: VerificationService) -> Self {
        Self {
            store,
            verification,
        }
    }

    /// Bind `method` to the account. When a code is supplied it must
    /// validate with purpose `Binding`; a verified code marks the new
    /// binding verified.
    pub async fn bind(
        &self,
        account_id: Uuid,
        method: AuthMethod,
        identifier: &str,
        verification_code: Option<&str>,
    ) -> Result<Account> {
        let mut account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if account.has_method(method) {
            return Err(AuthError::MethodAlreadyBound(method));
        }

        let identifier = method.normalize(identifier);
        if !method.validate(&identifier) {
            return Err(AuthError::Validation(format!(
                "Malformed identifier for method {method}"
            )));
        }

        let verified = match verification_code {
            Some(code) => {
                let ok = self
                    .verification
                    .verify(code, &identifier, method, CodePurpose::Binding)
                    .await?;
                if !ok {
                    return Err(AuthError::InvalidVerificationCode);
                }
                true
            }
            None => false,
        };

        account
            .bindings
            .push(AuthBinding::new(method, identifier.clone(), verified));
        account.updated_at = Utc::now();
        match self.store.update_account(&account).await {
            Ok(()) => {}
            // Identifier claimed by some other account
            Err(AuthError::UniqueViolation) => return Err(AuthError::IdentifierTaken(method)),
            Err(e) => return Err(e),
        }

        info!(
            account_id = %account.id,
            method = %method,
            identifier = %mask_identifier(&identifier),
            verified = verified,
            "Auth method bound"
        );

        Ok(account)
    }

    /// Unbind `method` from the account, clearing its identifier and
    /// verified flag. The last remaining method can never be unbound; a
    /// failed call leaves the account untouched.
    pub async fn unbind(
        &self,
        account_id: Uuid,
        method: AuthMethod,
        verification_code: Option<&str>,
    ) -> Result<Account> {
        let mut account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let binding = account
            .binding(method)
            .ok_or(AuthError::Validation(format!(
                "Method {method} is not bound to this account"
            )))?
            .clone();

        if account.bindings.len() <= 1 {
            return Err(AuthError::LastMethodCannotBeUnbound);
        }

        if let Some(code) = verification_code {
            let ok = self
                .verification
                .verify(code, &binding.identifier, method, CodePurpose::Unbinding)
                .await?;
            if !ok {
                return Err(AuthError::InvalidVerificationCode);
            }
        }

        account.bindings.retain(|b| b.method != method);
        account.updated_at = Utc::now();
        self.store.update_account(&account).await?;

        info!(
            account_id = %account.id,
            method = %method,
            "Auth method unbound"
        );

        Ok(account)
    }
}
