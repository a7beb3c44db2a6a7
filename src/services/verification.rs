/// Verification code manager
///
/// Issues, rate-limits, validates and expires the short numeric codes
/// that prove possession of an identifier. Expiry is checked lazily at
/// verification time; nothing sweeps the table in the background.
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{info, warn};

use crate::config::VerificationSettings;
use crate::db::IdentityStore;
use crate::error::{AuthError, Result};
use crate::models::{AuthMethod, CodePurpose, VerificationCode};
use crate::services::delivery::CodeDelivery;
use crate::validators::{self, mask_identifier};

/// Uniform 6-digit numeric space.
const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn IdentityStore>,
    delivery: Arc<dyn CodeDelivery>,
    settings: VerificationSettings,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        delivery: Arc<dyn CodeDelivery>,
        settings: VerificationSettings,
    ) -> Self {
        Self {
            store,
            delivery,
            settings,
        }
    }

    /// Issue a fresh code for (identifier, method, purpose).
    ///
    /// Fails with `RateLimited` when the issuance quota for the
    /// identifier is exhausted; the quota check and the insert are one
    /// atomic store operation. `contact` overrides the delivery
    /// destination for method-agnostic channels.
    pub async fn issue(
        &self,
        identifier: &str,
        method: AuthMethod,
        purpose: CodePurpose,
        contact: Option<&str>,
    ) -> Result<VerificationCode> {
        let identifier = method.normalize(identifier);
        if !method.validate(&identifier) {
            return Err(AuthError::Validation(format!(
                "Malformed identifier for method {method}"
            )));
        }

        let contact = contact.unwrap_or(&identifier).to_string();
        let code = VerificationCode::new(
            generate_code(),
            identifier.clone(),
            method,
            purpose,
            contact.clone(),
        );

        let issued = self
            .store
            .insert_code_if_quota(
                &code,
                Duration::seconds(self.settings.rate_limit_window_secs),
                self.settings.rate_limit_max_codes,
            )
            .await?;

        if !issued {
            warn!(
                identifier = %mask_identifier(&identifier),
                method = %method,
                "Verification code issuance rate limited"
            );
            return Err(AuthError::RateLimited(
                "Too many verification code requests. Please try again later.".to_string(),
            ));
        }

        let payload = format!(
            "Your verification code is: {}. This code expires in 10 minutes.",
            code.code
        );
        let delivered = self
            .delivery
            .deliver(method.delivery_channel(), &contact, &payload)
            .await?;
        if !delivered {
            // The code is already issued and verifiable; the caller's
            // messaging decides how to tell the user it was not sent.
            warn!(
                identifier = %mask_identifier(&identifier),
                method = %method,
                "Delivery transport rejected the verification payload"
            );
        }

        info!(
            identifier = %mask_identifier(&identifier),
            method = %method,
            purpose = %purpose,
            "Verification code issued"
        );

        Ok(code)
    }

    /// Verify and consume a code. Fails closed: absent, expired, used,
    /// or wrong-purpose codes all return `false`. A successful call
    /// consumes the record, so a repeat of the same call returns `false`.
    pub async fn verify(
        &self,
        code: &str,
        identifier: &str,
        method: AuthMethod,
        purpose: CodePurpose,
    ) -> Result<bool> {
        if !validators::validate_code_shape(code) {
            return Ok(false);
        }
        let identifier = method.normalize(identifier);

        let record = match self
            .store
            .find_unused_code(code, &identifier, method, purpose)
            .await?
        {
            Some(record) => record,
            None => {
                warn!(
                    identifier = %mask_identifier(&identifier),
                    purpose = %purpose,
                    "Verification code not found or already used"
                );
                return Ok(false);
            }
        };

        if record.is_expired(Utc::now()) {
            warn!(
                identifier = %mask_identifier(&identifier),
                purpose = %purpose,
                "Verification code expired"
            );
            return Ok(false);
        }

        // The store flips is_used exactly once; a lost race here reads
        // as "already used" and fails closed.
        let consumed = self.store.consume_code(record.id).await?;
        if consumed {
            info!(
                identifier = %mask_identifier(&identifier),
                purpose = %purpose,
                "Verification code accepted"
            );
        }
        Ok(consumed)
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}
