/// Role assignment bridge
///
/// Thin seam to the external RBAC collaborator. The only local policy is
/// the bootstrap path: the very first account in an empty system gets
/// the configured top-level role directly, because no administrator
/// exists yet to grant it.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RbacSettings;
use crate::db::IdentityStore;
use crate::error::Result;
use crate::models::Account;

#[derive(Debug, Clone)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

/// External RBAC collaborator contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RbacProvider: Send + Sync {
    async fn default_role_name(&self) -> Result<String>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;
    async fn assign_role(&self, account_id: Uuid, role_id: Uuid) -> Result<()>;
}

#[derive(Clone)]
pub struct RoleBridge {
    store: Arc<dyn IdentityStore>,
    rbac: Arc<dyn RbacProvider>,
    settings: RbacSettings,
}

impl RoleBridge {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        rbac: Arc<dyn RbacProvider>,
        settings: RbacSettings,
    ) -> Self {
        Self {
            store,
            rbac,
            settings,
        }
    }

    /// Assign the applicable role to a freshly created account.
    ///
    /// The RBAC collaborator failing, like a missing target role, is
    /// logged and swallowed: an account without a role is recoverable,
    /// a failed registration after the account was persisted is not.
    pub async fn assign_initial_role(&self, account: &mut Account) -> Result<()> {
        // The new account is already persisted, so "first ever" means
        // exactly one exists.
        let is_first = self.store.count_accounts().await? <= 1;

        let role_name = if is_first {
            info!(
                account_id = %account.id,
                role = %self.settings.bootstrap_role,
                "Bootstrap: granting top-level role to first account"
            );
            self.settings.bootstrap_role.clone()
        } else {
            match self.rbac.default_role_name().await {
                Ok(name) => name,
                Err(e) => {
                    warn!(
                        account_id = %account.id,
                        error = %e,
                        "RBAC default-role lookup failed; account created without a role"
                    );
                    return Ok(());
                }
            }
        };

        let role = match self.rbac.find_role_by_name(&role_name).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                warn!(
                    account_id = %account.id,
                    role = %role_name,
                    "Target role not found; account created without a role"
                );
                return Ok(());
            }
            Err(e) => {
                warn!(
                    account_id = %account.id,
                    role = %role_name,
                    error = %e,
                    "RBAC role lookup failed; account created without a role"
                );
                return Ok(());
            }
        };

        if let Err(e) = self.rbac.assign_role(account.id, role.id).await {
            warn!(
                account_id = %account.id,
                role = %role.name,
                error = %e,
                "RBAC role assignment failed; account created without a role"
            );
            return Ok(());
        }

        account.role_name = Some(role.name);
        self.store.update_account(account).await?;
        Ok(())
    }
}
