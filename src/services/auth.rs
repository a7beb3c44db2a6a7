/// Registration/login orchestrator
///
/// Composes the resolver, verification manager, merge workflow, binder
/// and role bridge into the fixed decision protocol. Token issuance for
/// a successful login belongs to the controller layer.
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::db::IdentityStore;
use crate::error::{AuthError, Result};
use crate::models::{
    Account, AccountMergeRequest, AuthMethod, CodePurpose, VerificationCode,
};
use crate::providers::ExternalIdentity;
use crate::security::{hash_password, verify_password};
use crate::services::merge::{IncomingProfile, MergeService};
use crate::services::mfa::MfaService;
use crate::services::resolver::IdentityResolver;
use crate::services::roles::RoleBridge;
use crate::services::verification::VerificationService;
use crate::validators::mask_identifier;

/// Outcome of a registration attempt.
#[derive(Debug)]
pub enum RegistrationOutcome {
    /// Account created. Methods that must prove possession carry a
    /// pending verification code; the account is not fully active until
    /// it is confirmed.
    Created {
        account: Account,
        pending_verification: Option<VerificationCode>,
    },
    /// Identifier already registered with nothing to reconcile;
    /// re-registration is idempotent.
    Existing(Account),
    /// The identity overlaps an existing account; resolution is a
    /// separate, explicit step.
    RequiresMerge(AccountMergeRequest),
}

/// Delegated second-factor proof for MFA-gated logins.
#[derive(Debug, Clone)]
pub enum SecondFactor {
    /// Login-purpose code delivered to an MFA-enrolled method.
    Code(String),
    /// Single-use backup code.
    BackupCode(String),
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    resolver: IdentityResolver,
    verification: VerificationService,
    merge: MergeService,
    mfa: MfaService,
    roles: RoleBridge,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        resolver: IdentityResolver,
        verification: VerificationService,
        merge: MergeService,
        mfa: MfaService,
        roles: RoleBridge,
    ) -> Self {
        Self {
            store,
            resolver,
            verification,
            merge,
            mfa,
            roles,
        }
    }

    /// Register an identity.
    ///
    /// 1. Already registered with conflicting profile data: a merge
    ///    request is created and nothing on the account changes.
    /// 2. Already registered, nothing conflicting: idempotent, the
    ///    existing account comes back as-is.
    /// 3. Unknown: the account is created with `method` as primary; a
    ///    possession-proof method additionally gets a registration code.
    pub async fn register(
        &self,
        method: AuthMethod,
        identifier: &str,
        password: Option<&str>,
        profile: IncomingProfile,
    ) -> Result<RegistrationOutcome> {
        let identifier = self.resolver.normalize(method, identifier)?;

        if let Some(existing) = self.store.find_by_identifier(method, &identifier).await? {
            return self
                .reconcile_existing(existing, method, &identifier, &profile)
                .await;
        }

        let mut account = Account::new(method, identifier.clone(), method.is_provider());
        if let Some(password) = password {
            account.password_hash = Some(hash_password(password)?);
        }
        apply_profile(&mut account, &profile);

        match self.store.insert_account(&account).await {
            Ok(()) => {}
            Err(AuthError::UniqueViolation) => {
                // Lost the race: someone registered this identifier
                // between our lookup and insert. Re-resolve and fold
                // into the existing-account path.
                info!(
                    identifier = %mask_identifier(&identifier),
                    method = %method,
                    "Registration race lost; re-resolving"
                );
                let existing = self
                    .store
                    .find_by_identifier(method, &identifier)
                    .await?
                    .ok_or_else(|| {
                        AuthError::Internal(
                            "identifier vanished after unique violation".to_string(),
                        )
                    })?;
                return self
                    .reconcile_existing(existing, method, &identifier, &profile)
                    .await;
            }
            Err(e) => return Err(e),
        }

        self.roles.assign_initial_role(&mut account).await?;

        let pending_verification = if method.requires_possession_proof() {
            Some(
                self.verification
                    .issue(&identifier, method, CodePurpose::Registration, None)
                    .await?,
            )
        } else {
            None
        };

        info!(
            account_id = %account.id,
            method = %method,
            identifier = %mask_identifier(&identifier),
            "Account registered"
        );

        Ok(RegistrationOutcome::Created {
            account,
            pending_verification,
        })
    }

    /// Register or log in through an external identity provider.
    ///
    /// The normalized identity is resolved by provider id first; a miss
    /// falls back to the primary email, where a partial overlap becomes
    /// a merge request and a clean overlap links the provider method to
    /// the existing account.
    pub async fn register_external(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<RegistrationOutcome> {
        let method = AuthMethod::parse(&identity.provider_name).ok_or_else(|| {
            AuthError::Validation(format!("Unknown provider {}", identity.provider_name))
        })?;

        let profile = IncomingProfile {
            email: identity
                .primary_email
                .as_ref()
                .map(|e| AuthMethod::Email.normalize(e)),
            display_name: identity.display_name.clone(),
            avatar_url: identity.avatar_url.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            ..Default::default()
        };

        // Known provider identity: plain login.
        if let Some(mut account) = self
            .store
            .find_by_identifier(method, &identity.provider_id)
            .await?
        {
            account
                .oauth_metadata
                .insert(identity.provider_name.clone(), identity.raw_metadata.clone());
            account.updated_at = Utc::now();
            self.store.update_account(&account).await?;
            return Ok(RegistrationOutcome::Existing(account));
        }

        // Unknown provider id, but the profile email may already have an
        // account. Overlap with differences must not be absorbed quietly.
        if let Some(email) = profile.email.as_deref() {
            if let Some(existing) = self
                .store
                .find_by_identifier(AuthMethod::Email, email)
                .await?
            {
                let conflicts = MergeService::detect_conflicts(
                    &existing,
                    method,
                    &identity.provider_id,
                    &profile,
                );
                if !conflicts.is_empty() {
                    let request = self
                        .merge
                        .create_merge_request(existing.id, None, method, conflicts)
                        .await?;
                    return Ok(RegistrationOutcome::RequiresMerge(request));
                }

                let mut account = existing;
                account.bindings.push(crate::models::AuthBinding::new(
                    method,
                    identity.provider_id.clone(),
                    true,
                ));
                apply_profile(&mut account, &profile);
                account
                    .oauth_metadata
                    .insert(identity.provider_name.clone(), identity.raw_metadata.clone());
                account.updated_at = Utc::now();
                self.store.update_account(&account).await?;

                info!(
                    account_id = %account.id,
                    provider = %identity.provider_name,
                    "Provider identity linked to existing account"
                );
                return Ok(RegistrationOutcome::Existing(account));
            }
        }

        // First sight of this identity anywhere: fresh account.
        let mut outcome = self
            .register(method, &identity.provider_id, None, profile)
            .await?;
        if let RegistrationOutcome::Created { account, .. } = &mut outcome {
            account
                .oauth_metadata
                .insert(identity.provider_name.clone(), identity.raw_metadata.clone());
            self.store.update_account(account).await?;

            if let Some(email) = identity.primary_email.as_ref() {
                let email = AuthMethod::Email.normalize(email);
                account.bindings.push(crate::models::AuthBinding::new(
                    AuthMethod::Email,
                    email,
                    true,
                ));
                // Email claimed elsewhere between lookups: keep the
                // provider-only account rather than failing signup.
                if self.store.update_account(account).await.is_err() {
                    account.bindings.pop();
                }
            }
        }
        Ok(outcome)
    }

    /// Log in with an identifier.
    ///
    /// A supplied verification code must validate with purpose `Login`.
    /// MFA-enabled accounts block until a second factor passes.
    pub async fn login(
        &self,
        method: AuthMethod,
        identifier: &str,
        password: Option<&str>,
        verification_code: Option<&str>,
        second_factor: Option<SecondFactor>,
    ) -> Result<Account> {
        let identifier = self.resolver.normalize(method, identifier)?;

        let mut account = self
            .store
            .find_by_identifier(method, &identifier)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(code) = verification_code {
            let ok = self
                .verification
                .verify(code, &identifier, method, CodePurpose::Login)
                .await?;
            if !ok {
                return Err(AuthError::InvalidVerificationCode);
            }
            // A login code also proves possession, so the binding
            // becomes verified if it was not already.
            if let Some(binding) = account.bindings.iter_mut().find(|b| b.method == method) {
                if !binding.verified {
                    binding.verified = true;
                    account.updated_at = Utc::now();
                    self.store.update_account(&account).await?;
                }
            }
        }

        if let Some(password) = password {
            let hash = account
                .password_hash
                .as_deref()
                .ok_or(AuthError::InvalidCredentials)?;
            if !verify_password(password, hash)? {
                return Err(AuthError::InvalidCredentials);
            }
        }

        if account.mfa_enabled() {
            self.check_second_factor(&account, second_factor).await?;
        }

        info!(
            account_id = %account.id,
            method = %method,
            "Login succeeded"
        );

        Ok(account)
    }

    /// Complete a possession-proof registration by consuming the
    /// registration code and marking the binding verified.
    pub async fn confirm_registration(
        &self,
        method: AuthMethod,
        identifier: &str,
        code: &str,
    ) -> Result<Account> {
        let identifier = self.resolver.normalize(method, identifier)?;

        let ok = self
            .verification
            .verify(code, &identifier, method, CodePurpose::Registration)
            .await?;
        if !ok {
            return Err(AuthError::InvalidVerificationCode);
        }

        let mut account = self
            .store
            .find_by_identifier(method, &identifier)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(binding) = account.bindings.iter_mut().find(|b| b.method == method) {
            binding.verified = true;
        }
        account.updated_at = Utc::now();
        self.store.update_account(&account).await?;

        info!(account_id = %account.id, method = %method, "Registration confirmed");
        Ok(account)
    }

    async fn reconcile_existing(
        &self,
        existing: Account,
        method: AuthMethod,
        identifier: &str,
        profile: &IncomingProfile,
    ) -> Result<RegistrationOutcome> {
        let conflicts = MergeService::detect_conflicts(&existing, method, identifier, profile);
        if conflicts.is_empty() {
            return Ok(RegistrationOutcome::Existing(existing));
        }

        let request = self
            .merge
            .create_merge_request(existing.id, None, method, conflicts)
            .await?;
        Ok(RegistrationOutcome::RequiresMerge(request))
    }

    async fn check_second_factor(
        &self,
        account: &Account,
        second_factor: Option<SecondFactor>,
    ) -> Result<()> {
        let mfa = account
            .mfa
            .as_ref()
            .ok_or(AuthError::TwoFactorRequired)?;

        match second_factor {
            None => Err(AuthError::TwoFactorRequired),
            Some(SecondFactor::BackupCode(code)) => {
                if self.mfa.consume_backup_code(account.id, &code).await? {
                    Ok(())
                } else {
                    Err(AuthError::InvalidVerificationCode)
                }
            }
            Some(SecondFactor::Code(code)) => {
                // The code must match one of the enrolled second-factor
                // methods' bound identifiers.
                for method in &mfa.methods {
                    if let Some(identifier) = account.identifier(*method) {
                        if self
                            .verification
                            .verify(&code, identifier, *method, CodePurpose::Login)
                            .await?
                        {
                            return Ok(());
                        }
                    }
                }
                Err(AuthError::InvalidVerificationCode)
            }
        }
    }
}

fn apply_profile(account: &mut Account, profile: &IncomingProfile) {
    // Fill-in only: existing values are never overwritten here.
    // Overwrites go through the merge workflow.
    if account.first_name.is_none() {
        account.first_name = profile.first_name.clone();
    }
    if account.last_name.is_none() {
        account.last_name = profile.last_name.clone();
    }
    if account.display_name.is_none() {
        account.display_name = profile.display_name.clone();
    }
    if account.avatar_url.is_none() {
        account.avatar_url = profile.avatar_url.clone();
    }
}
