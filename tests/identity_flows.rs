//! End-to-end flows over the in-memory backend.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use accounts_service::config::{RbacSettings, VerificationSettings};
use accounts_service::db::{IdentityStore, MemoryStore};
use accounts_service::providers::ExternalIdentity;
use accounts_service::services::roles::{RbacProvider, Role};
use accounts_service::services::{
    AuthService, IdentityResolver, IncomingProfile, LogDelivery, MergeService, MfaService,
    RoleBridge, SecondFactor, VerificationService,
};
use accounts_service::{
    AuthError, AuthMethod, CodePurpose, MergeResolution, MergeSide, RegistrationOutcome,
};

/// RBAC stand-in: every role lookup succeeds.
struct StaticRbac;

#[async_trait]
impl RbacProvider for StaticRbac {
    async fn default_role_name(&self) -> accounts_service::Result<String> {
        Ok("member".to_string())
    }

    async fn find_role_by_name(&self, name: &str) -> accounts_service::Result<Option<Role>> {
        Ok(Some(Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }))
    }

    async fn assign_role(&self, _account_id: Uuid, _role_id: Uuid) -> accounts_service::Result<()> {
        Ok(())
    }
}

struct Harness {
    store: Arc<dyn IdentityStore>,
    auth: AuthService,
    verification: VerificationService,
    merge: MergeService,
    mfa: MfaService,
}

/// RBAC stand-in whose every call fails.
struct DownRbac;

#[async_trait]
impl RbacProvider for DownRbac {
    async fn default_role_name(&self) -> accounts_service::Result<String> {
        Err(AuthError::Internal("rbac unavailable".to_string()))
    }

    async fn find_role_by_name(&self, _name: &str) -> accounts_service::Result<Option<Role>> {
        Err(AuthError::Internal("rbac unavailable".to_string()))
    }

    async fn assign_role(&self, _account_id: Uuid, _role_id: Uuid) -> accounts_service::Result<()> {
        Err(AuthError::Internal("rbac unavailable".to_string()))
    }
}

fn harness() -> Harness {
    harness_with_rbac(Arc::new(StaticRbac))
}

fn harness_with_rbac(rbac: Arc<dyn RbacProvider>) -> Harness {
    let store: Arc<dyn IdentityStore> = Arc::new(MemoryStore::new());
    let verification = VerificationService::new(
        store.clone(),
        Arc::new(LogDelivery),
        VerificationSettings::default(),
    );
    let merge = MergeService::new(store.clone());
    let mfa = MfaService::new(store.clone());
    let roles = RoleBridge::new(store.clone(), rbac, RbacSettings::default());
    let auth = AuthService::new(
        store.clone(),
        IdentityResolver::new(store.clone()),
        verification.clone(),
        merge.clone(),
        mfa.clone(),
        roles,
    );
    Harness {
        store,
        auth,
        verification,
        merge,
        mfa,
    }
}

fn profile(first_name: &str) -> IncomingProfile {
    IncomingProfile {
        first_name: Some(first_name.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn email_reregistration_is_idempotent() {
    let h = harness();

    let created = h
        .auth
        .register(AuthMethod::Email, "User@Example.com", None, profile("Alice"))
        .await
        .unwrap();
    let account = match created {
        RegistrationOutcome::Created { account, pending_verification } => {
            assert!(pending_verification.is_none());
            account
        }
        other => panic!("expected Created, got {other:?}"),
    };

    // Different case, same identity, same profile.
    let again = h
        .auth
        .register(AuthMethod::Email, "user@example.com", None, profile("Alice"))
        .await
        .unwrap();
    match again {
        RegistrationOutcome::Existing(existing) => assert_eq!(existing.id, account.id),
        other => panic!("expected Existing, got {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_provider_identity_requires_merge() {
    let h = harness();

    let account = match h
        .auth
        .register(AuthMethod::Email, "alice@example.com", None, profile("Alice"))
        .await
        .unwrap()
    {
        RegistrationOutcome::Created { account, .. } => account,
        other => panic!("expected Created, got {other:?}"),
    };

    let identity = ExternalIdentity {
        provider_name: "github".to_string(),
        provider_id: "42".to_string(),
        primary_email: Some("ALICE@example.com".to_string()),
        display_name: Some("alyce".to_string()),
        first_name: Some("Alyce".to_string()),
        last_name: None,
        avatar_url: None,
        raw_metadata: serde_json::json!({"id": 42}),
    };

    let outcome = h.auth.register_external(&identity).await.unwrap();
    let request = match outcome {
        RegistrationOutcome::RequiresMerge(request) => request,
        other => panic!("expected RequiresMerge, got {other:?}"),
    };

    // Same email is agreement, not a conflict; the differing name is.
    assert!(request.conflicts.get("first_name").is_some());
    assert!(request.conflicts.get("email").is_none());
    assert_eq!(request.primary_account_id, account.id);

    // Nothing changed on the account until someone resolves.
    let untouched = h
        .store
        .find_by_id(account.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.first_name.as_deref(), Some("Alice"));
    assert!(!untouched.has_method(AuthMethod::Github));

    // Resolution in favor of the incoming side applies the change.
    let resolution = MergeResolution::default().choose("first_name", MergeSide::Secondary);
    h.merge.resolve_merge(request.id, resolution).await.unwrap();
    let merged = h.store.find_by_id(account.id).await.unwrap().unwrap();
    assert_eq!(merged.first_name.as_deref(), Some("Alyce"));
}

#[tokio::test]
async fn clean_provider_overlap_links_method_to_existing_account() {
    let h = harness();

    let account = match h
        .auth
        .register(AuthMethod::Email, "bob@example.com", None, profile("Bob"))
        .await
        .unwrap()
    {
        RegistrationOutcome::Created { account, .. } => account,
        other => panic!("expected Created, got {other:?}"),
    };

    let identity = ExternalIdentity {
        provider_name: "github".to_string(),
        provider_id: "77".to_string(),
        primary_email: Some("bob@example.com".to_string()),
        display_name: None,
        first_name: Some("Bob".to_string()),
        last_name: None,
        avatar_url: None,
        raw_metadata: serde_json::json!({"id": 77}),
    };

    match h.auth.register_external(&identity).await.unwrap() {
        RegistrationOutcome::Existing(linked) => {
            assert_eq!(linked.id, account.id);
            assert_eq!(linked.identifier(AuthMethod::Github), Some("77"));
            assert!(linked.oauth_metadata.contains_key("github"));
        }
        other => panic!("expected Existing, got {other:?}"),
    }

    // Subsequent exchange resolves straight by provider id.
    match h.auth.register_external(&identity).await.unwrap() {
        RegistrationOutcome::Existing(found) => assert_eq!(found.id, account.id),
        other => panic!("expected Existing, got {other:?}"),
    }
}

#[tokio::test]
async fn first_account_gets_bootstrap_role() {
    let h = harness();

    let first = match h
        .auth
        .register(AuthMethod::Email, "root@example.com", None, profile("Root"))
        .await
        .unwrap()
    {
        RegistrationOutcome::Created { account, .. } => account,
        other => panic!("expected Created, got {other:?}"),
    };
    assert_eq!(first.role_name.as_deref(), Some("super_admin"));

    let second = match h
        .auth
        .register(AuthMethod::Email, "user@example.com", None, profile("User"))
        .await
        .unwrap()
    {
        RegistrationOutcome::Created { account, .. } => account,
        other => panic!("expected Created, got {other:?}"),
    };
    assert_eq!(second.role_name.as_deref(), Some("member"));
}

#[tokio::test]
async fn rbac_outage_does_not_fail_registration() {
    let h = harness_with_rbac(Arc::new(DownRbac));

    // Second account so the bootstrap path is not taken.
    h.auth
        .register(AuthMethod::Email, "first@example.com", None, profile("First"))
        .await
        .unwrap();

    let (account, code) = match h
        .auth
        .register(AuthMethod::Phone, "+79001234567", None, IncomingProfile::default())
        .await
        .unwrap()
    {
        RegistrationOutcome::Created { account, pending_verification } => {
            (account, pending_verification)
        }
        other => panic!("expected Created, got {other:?}"),
    };

    // The account exists without a role, and the possession-proof code
    // was still issued.
    assert!(account.role_name.is_none());
    assert!(code.is_some());
}

#[tokio::test]
async fn phone_registration_requires_possession_proof() {
    let h = harness();

    let (account, code) = match h
        .auth
        .register(AuthMethod::Phone, "+7 900 123-45-67", None, IncomingProfile::default())
        .await
        .unwrap()
    {
        RegistrationOutcome::Created { account, pending_verification } => {
            (account, pending_verification.unwrap())
        }
        other => panic!("expected Created, got {other:?}"),
    };
    assert_eq!(account.identifier(AuthMethod::Phone), Some("+79001234567"));
    assert!(!account.binding(AuthMethod::Phone).unwrap().verified);
    assert_eq!(code.purpose, CodePurpose::Registration);

    let err = h
        .auth
        .confirm_registration(AuthMethod::Phone, "+79001234567", "000000")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidVerificationCode));

    let confirmed = h
        .auth
        .confirm_registration(AuthMethod::Phone, "+79001234567", &code.code)
        .await
        .unwrap();
    assert!(confirmed.binding(AuthMethod::Phone).unwrap().verified);
}

#[tokio::test]
async fn concurrent_registration_converges_on_one_account() {
    let h = harness();
    let auth = h.auth.clone();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let auth = auth.clone();
        handles.push(tokio::spawn(async move {
            auth.register(
                AuthMethod::Email,
                "race@example.com",
                None,
                IncomingProfile::default(),
            )
            .await
        }));
    }

    let mut created = 0;
    let mut ids = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RegistrationOutcome::Created { account, .. } => {
                created += 1;
                ids.push(account.id);
            }
            RegistrationOutcome::Existing(account) => ids.push(account.id),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(created, 1);
    ids.dedup();
    assert_eq!(ids.iter().collect::<std::collections::HashSet<_>>().len(), 1);
}

#[tokio::test]
async fn password_login_verifies_credentials() {
    let h = harness();

    h.auth
        .register(
            AuthMethod::Email,
            "carol@example.com",
            Some("S7r0ng&LongPass!"),
            profile("Carol"),
        )
        .await
        .unwrap();

    let err = h
        .auth
        .login(AuthMethod::Email, "carol@example.com", Some("wrong-password"), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let account = h
        .auth
        .login(
            AuthMethod::Email,
            "Carol@Example.com",
            Some("S7r0ng&LongPass!"),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(account.email(), Some("carol@example.com"));

    let err = h
        .auth
        .login(AuthMethod::Email, "nobody@example.com", Some("S7r0ng&LongPass!"), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound));
}

#[tokio::test]
async fn login_code_must_match_login_purpose() {
    let h = harness();

    h.auth
        .register(AuthMethod::Email, "dave@example.com", None, profile("Dave"))
        .await
        .unwrap();

    let login_code = h
        .verification
        .issue("dave@example.com", AuthMethod::Email, CodePurpose::Login, None)
        .await
        .unwrap();
    let binding_code = h
        .verification
        .issue("dave@example.com", AuthMethod::Email, CodePurpose::Binding, None)
        .await
        .unwrap();

    let err = h
        .auth
        .login(
            AuthMethod::Email,
            "dave@example.com",
            None,
            Some(&binding_code.code),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidVerificationCode));

    let account = h
        .auth
        .login(
            AuthMethod::Email,
            "dave@example.com",
            None,
            Some(&login_code.code),
            None,
        )
        .await
        .unwrap();
    // The login code proved possession of the address.
    assert!(account.binding(AuthMethod::Email).unwrap().verified);
}

#[tokio::test]
async fn mfa_blocks_login_until_second_factor_passes() {
    let h = harness();

    let account = match h
        .auth
        .register(
            AuthMethod::Email,
            "eve@example.com",
            Some("S7r0ng&LongPass!"),
            profile("Eve"),
        )
        .await
        .unwrap()
    {
        RegistrationOutcome::Created { account, .. } => account,
        other => panic!("expected Created, got {other:?}"),
    };

    let setup = h
        .mfa
        .setup(account.id, vec![AuthMethod::Email], 1)
        .await
        .unwrap();
    let backup_code = setup.backup_codes[0].clone();

    let err = h
        .auth
        .login(
            AuthMethod::Email,
            "eve@example.com",
            Some("S7r0ng&LongPass!"),
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TwoFactorRequired));

    let account = h
        .auth
        .login(
            AuthMethod::Email,
            "eve@example.com",
            Some("S7r0ng&LongPass!"),
            None,
            Some(SecondFactor::BackupCode(backup_code.clone())),
        )
        .await
        .unwrap();
    assert!(account.mfa_enabled());

    // Backup codes are single-use.
    let err = h
        .auth
        .login(
            AuthMethod::Email,
            "eve@example.com",
            Some("S7r0ng&LongPass!"),
            None,
            Some(SecondFactor::BackupCode(backup_code)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidVerificationCode));
}

#[tokio::test]
async fn mfa_accepts_login_code_on_enrolled_method() {
    let h = harness();

    let account = match h
        .auth
        .register(
            AuthMethod::Email,
            "frank@example.com",
            Some("S7r0ng&LongPass!"),
            profile("Frank"),
        )
        .await
        .unwrap()
    {
        RegistrationOutcome::Created { account, .. } => account,
        other => panic!("expected Created, got {other:?}"),
    };
    h.mfa
        .setup(account.id, vec![AuthMethod::Email], 1)
        .await
        .unwrap();

    let code = h
        .verification
        .issue("frank@example.com", AuthMethod::Email, CodePurpose::Login, None)
        .await
        .unwrap();

    let logged_in = h
        .auth
        .login(
            AuthMethod::Email,
            "frank@example.com",
            Some("S7r0ng&LongPass!"),
            None,
            Some(SecondFactor::Code(code.code)),
        )
        .await
        .unwrap();
    assert_eq!(logged_in.id, account.id);
}

#[tokio::test]
async fn weak_password_rejected_at_registration() {
    let h = harness();

    let err = h
        .auth
        .register(AuthMethod::Email, "weak@example.com", Some("password1"), profile("W"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::WeakPassword(_)));

    // Nothing was persisted for the failed attempt.
    assert!(h
        .store
        .find_by_identifier(AuthMethod::Email, "weak@example.com")
        .await
        .unwrap()
        .is_none());
}
