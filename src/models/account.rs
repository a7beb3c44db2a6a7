use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthMethod;

/// One bound identity entry on an account.
///
/// An account holds at most one binding per method; the binding set is
/// never empty for a persisted account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthBinding {
    pub method: AuthMethod,
    /// Normalized, method-specific identifier (email, E.164 phone,
    /// provider user id).
    pub identifier: String,
    pub verified: bool,
    pub bound_at: DateTime<Utc>,
}

impl AuthBinding {
    pub fn new(method: AuthMethod, identifier: String, verified: bool) -> Self {
        Self {
            method,
            identifier,
            verified,
            bound_at: Utc::now(),
        }
    }
}

/// Multi-factor configuration, owned exclusively by its account.
///
/// Replaced wholesale on enable/disable; backup codes are stored as
/// SHA-256 hex and moved into `backup_codes_used` on consumption.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MfaSettings {
    pub enabled: bool,
    pub methods: Vec<AuthMethod>,
    pub backup_codes: Vec<String>,
    pub backup_codes_used: Vec<String>,
    pub required_methods: u32,
}

/// Canonical identity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub primary_method: AuthMethod,
    pub bindings: Vec<AuthBinding>,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role_name: Option<String>,
    pub mfa: Option<MfaSettings>,
    /// Provider name -> provider-specific metadata blob.
    pub oauth_metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Build a fresh account around its first binding.
    pub fn new(method: AuthMethod, identifier: String, verified: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            primary_method: method,
            bindings: vec![AuthBinding::new(method, identifier, verified)],
            password_hash: None,
            first_name: None,
            last_name: None,
            display_name: None,
            avatar_url: None,
            role_name: None,
            mfa: None,
            oauth_metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn binding(&self, method: AuthMethod) -> Option<&AuthBinding> {
        self.bindings.iter().find(|b| b.method == method)
    }

    pub fn has_method(&self, method: AuthMethod) -> bool {
        self.binding(method).is_some()
    }

    /// Identifier bound for a method, if any.
    pub fn identifier(&self, method: AuthMethod) -> Option<&str> {
        self.binding(method).map(|b| b.identifier.as_str())
    }

    /// Bound methods in insertion order.
    pub fn available_methods(&self) -> Vec<AuthMethod> {
        self.bindings.iter().map(|b| b.method).collect()
    }

    pub fn email(&self) -> Option<&str> {
        self.identifier(AuthMethod::Email)
    }

    pub fn phone(&self) -> Option<&str> {
        self.identifier(AuthMethod::Phone)
    }

    pub fn mfa_enabled(&self) -> bool {
        self.mfa.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}
