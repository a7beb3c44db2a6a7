/// External identity providers
///
/// Adapters turn a provider-specific exchange into one normalized
/// `ExternalIdentity` shape so the rest of the service never touches
/// provider payloads directly.
pub mod github;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

pub use github::GithubProvider;

/// Provider-agnostic identity, the only shape adapters may hand out.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    /// Lowercase provider name, matching an `AuthMethod` variant.
    pub provider_name: String,
    /// Stable user id in the provider's namespace.
    pub provider_id: String,
    pub primary_email: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Raw provider profile, stored verbatim on the account.
    pub raw_metadata: serde_json::Value,
}

/// One email entry as providers report them.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEmail {
    pub email: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub primary: bool,
}

/// Pick the account email from a provider's list.
///
/// The entry the provider marks primary wins, preferring a verified one.
/// Only when nothing is marked does the tie-break apply: the first
/// verified entry in provider order, otherwise the first listed.
pub fn select_primary_email(emails: &[ProviderEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.primary))
        .or_else(|| emails.iter().find(|e| e.verified))
        .or_else(|| emails.first())
        .map(|e| e.email.clone())
}

/// An adapter exchanges an authorization code for a normalized identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(email: &str, verified: bool) -> ProviderEmail {
        ProviderEmail {
            email: email.to_string(),
            verified,
            primary: false,
        }
    }

    fn primary(email: &str, verified: bool) -> ProviderEmail {
        ProviderEmail {
            email: email.to_string(),
            verified,
            primary: true,
        }
    }

    #[test]
    fn marked_primary_beats_earlier_verified_entries() {
        let emails = vec![
            entry("noise@x.com", true),
            primary("the-primary@x.com", true),
        ];
        assert_eq!(
            select_primary_email(&emails),
            Some("the-primary@x.com".to_string())
        );
    }

    #[test]
    fn unverified_primary_still_wins_over_the_tie_break() {
        let emails = vec![entry("verified@x.com", true), primary("primary@x.com", false)];
        assert_eq!(
            select_primary_email(&emails),
            Some("primary@x.com".to_string())
        );
    }

    #[test]
    fn first_verified_email_wins_when_none_is_marked() {
        let emails = vec![
            entry("unverified@x.com", false),
            entry("verified@x.com", true),
            entry("second-verified@x.com", true),
        ];
        assert_eq!(
            select_primary_email(&emails),
            Some("verified@x.com".to_string())
        );
    }

    #[test]
    fn falls_back_to_first_listed_when_none_verified() {
        let emails = vec![entry("a@x.com", false), entry("b@x.com", false)];
        assert_eq!(select_primary_email(&emails), Some("a@x.com".to_string()));
    }

    #[test]
    fn empty_list_yields_none() {
        assert_eq!(select_primary_email(&[]), None);
    }
}
