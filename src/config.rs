//! Configuration for the accounts service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! Provider credentials are passed into each adapter at construction
//! time; nothing reads ambient configuration after startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub verification: VerificationSettings,
    pub rbac: RbacSettings,
    pub github: ProviderSettings,
}

impl Settings {
    /// Load settings from environment variables (and .env in development).
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            verification: VerificationSettings::from_env()?,
            rbac: RbacSettings::from_env(),
            github: ProviderSettings::from_env("GITHUB")?,
        })
    }
}

/// Verification-code issuance tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSettings {
    /// Sliding window for the issuance quota, in seconds.
    pub rate_limit_window_secs: i64,
    /// Max codes per (identifier, method) inside the window.
    pub rate_limit_max_codes: i64,
}

impl VerificationSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            rate_limit_window_secs: env::var("VERIFICATION_RATE_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid VERIFICATION_RATE_WINDOW_SECS")?,
            rate_limit_max_codes: env::var("VERIFICATION_RATE_MAX_CODES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid VERIFICATION_RATE_MAX_CODES")?,
        })
    }
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            rate_limit_window_secs: 60,
            rate_limit_max_codes: 3,
        }
    }
}

/// Role names consumed by the role-assignment bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacSettings {
    /// Role granted to the very first account in an empty system.
    pub bootstrap_role: String,
}

impl RbacSettings {
    fn from_env() -> Self {
        Self {
            bootstrap_role: env::var("RBAC_BOOTSTRAP_ROLE")
                .unwrap_or_else(|_| "super_admin".to_string()),
        }
    }
}

impl Default for RbacSettings {
    fn default() -> Self {
        Self {
            bootstrap_role: "super_admin".to_string(),
        }
    }
}

/// Credentials and tuning for one external identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Upper bound on any single provider HTTP call, in seconds.
    pub http_timeout_secs: u64,
}

impl ProviderSettings {
    fn from_env(prefix: &str) -> Result<Self> {
        Ok(Self {
            client_id: env::var(format!("{prefix}_CLIENT_ID")).unwrap_or_default(),
            client_secret: env::var(format!("{prefix}_CLIENT_SECRET")).unwrap_or_default(),
            redirect_uri: env::var(format!("{prefix}_REDIRECT_URI")).unwrap_or_default(),
            http_timeout_secs: env::var(format!("{prefix}_HTTP_TIMEOUT_SECS"))
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .with_context(|| format!("Invalid {prefix}_HTTP_TIMEOUT_SECS"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_defaults_match_quota() {
        let settings = VerificationSettings::default();
        assert_eq!(settings.rate_limit_window_secs, 60);
        assert_eq!(settings.rate_limit_max_codes, 3);
    }

    #[test]
    fn bootstrap_role_defaults_to_super_admin() {
        assert_eq!(RbacSettings::default().bootstrap_role, "super_admin");
    }
}
