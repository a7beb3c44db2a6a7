/// Multi-factor configuration
///
/// Settings are replaced wholesale on enable/disable; no partial state
/// is ever observable. Backup codes are single-use, stored as SHA-256
/// hex, and returned in the clear exactly once, at setup.
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::db::IdentityStore;
use crate::error::{AuthError, Result};
use crate::models::{AuthMethod, MfaSettings};

const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_LENGTH: usize = 8;

/// Uppercase alphanumerics without the usual lookalikes (0/O, 1/I).
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Result of MFA setup; the plaintext codes exist only in this value
/// (and in its debug output, which never reaches persistent logs).
#[derive(Debug)]
pub struct MfaSetup {
    pub settings: MfaSettings,
    pub backup_codes: Vec<String>,
}

#[derive(Clone)]
pub struct MfaService {
    store: Arc<dyn IdentityStore>,
}

impl MfaService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Enable MFA with the given second-factor methods. Any prior
    /// settings (including unused backup codes) are discarded.
    pub async fn setup(
        &self,
        account_id: Uuid,
        methods: Vec<AuthMethod>,
        required_methods: u32,
    ) -> Result<MfaSetup> {
        if methods.is_empty() {
            return Err(AuthError::Validation(
                "MFA requires at least one second-factor method".to_string(),
            ));
        }
        for method in &methods {
            if !account_has_method(&self.store, account_id, *method).await? {
                return Err(AuthError::Validation(format!(
                    "Method {method} is not bound to this account"
                )));
            }
        }

        let mut account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let backup_codes = generate_backup_codes();
        let settings = MfaSettings {
            enabled: true,
            methods,
            backup_codes: backup_codes.iter().map(|c| hash_backup_code(c)).collect(),
            backup_codes_used: Vec::new(),
            required_methods: required_methods.max(1),
        };

        account.mfa = Some(settings.clone());
        account.updated_at = Utc::now();
        self.store.update_account(&account).await?;

        info!(account_id = %account_id, "MFA enabled");

        Ok(MfaSetup {
            settings,
            backup_codes,
        })
    }

    /// Reset MFA to the zero value.
    pub async fn disable(&self, account_id: Uuid) -> Result<()> {
        let mut account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        account.mfa = Some(MfaSettings::default());
        account.updated_at = Utc::now();
        self.store.update_account(&account).await?;

        info!(account_id = %account_id, "MFA disabled");
        Ok(())
    }

    /// Consume a backup code. Returns `true` only for the call that
    /// spent it; a spent or unknown code is `false`.
    pub async fn consume_backup_code(&self, account_id: Uuid, code: &str) -> Result<bool> {
        let mut account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let Some(mfa) = account.mfa.as_mut() else {
            return Ok(false);
        };
        if !mfa.enabled {
            return Ok(false);
        }

        let hashed = hash_backup_code(&code.trim().to_uppercase());
        if mfa.backup_codes_used.contains(&hashed) || !mfa.backup_codes.contains(&hashed) {
            return Ok(false);
        }

        mfa.backup_codes_used.push(hashed);
        account.updated_at = Utc::now();
        self.store.update_account(&account).await?;

        info!(account_id = %account_id, "Backup code consumed");
        Ok(true)
    }
}

async fn account_has_method(
    store: &Arc<dyn IdentityStore>,
    account_id: Uuid,
    method: AuthMethod,
) -> Result<bool> {
    let account = store
        .find_by_id(account_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    Ok(account.has_method(method))
}

fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            (0..BACKUP_CODE_LENGTH)
                .map(|_| {
                    let idx = rng.gen_range(0..BACKUP_CODE_ALPHABET.len());
                    BACKUP_CODE_ALPHABET[idx] as char
                })
                .collect()
        })
        .collect()
}

fn hash_backup_code(code: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
