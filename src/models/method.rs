use serde::{Deserialize, Serialize};

use crate::validators;

/// Channel a verification payload is delivered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    Sms,
    Messenger,
}

/// A distinct way of proving identity.
///
/// This is the single capability surface for per-method behavior
/// (normalization, identifier validation, possession proof). Call sites
/// never switch on the method themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "auth_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Email address + password.
    Email,
    /// Phone number verified through a messenger bot or SMS.
    Phone,
    /// GitHub OAuth.
    Github,
    /// Google OAuth.
    Google,
    /// Federated national ID provider.
    NationalId,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Email => "email",
            AuthMethod::Phone => "phone",
            AuthMethod::Github => "github",
            AuthMethod::Google => "google",
            AuthMethod::NationalId => "national_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email" => Some(AuthMethod::Email),
            "phone" => Some(AuthMethod::Phone),
            "github" => Some(AuthMethod::Github),
            "google" => Some(AuthMethod::Google),
            "national_id" => Some(AuthMethod::NationalId),
            _ => None,
        }
    }

    /// Canonicalize an identifier before any lookup or store write.
    ///
    /// Two records differing only by email case must resolve to the same
    /// account, so normalization happens once, at this boundary.
    pub fn normalize(&self, identifier: &str) -> String {
        match self {
            AuthMethod::Email => identifier.trim().to_lowercase(),
            AuthMethod::Phone => {
                // Strip visual separators commonly pasted with phone numbers
                let mut out = String::with_capacity(identifier.len());
                for c in identifier.trim().chars() {
                    match c {
                        ' ' | '-' | '(' | ')' => {}
                        _ => out.push(c),
                    }
                }
                out
            }
            // Provider-assigned ids are opaque and compared verbatim
            _ => identifier.trim().to_string(),
        }
    }

    /// Shape check for a normalized identifier.
    pub fn validate(&self, identifier: &str) -> bool {
        match self {
            AuthMethod::Email => validators::validate_email(identifier),
            AuthMethod::Phone => validators::validate_e164(identifier),
            _ => !identifier.is_empty(),
        }
    }

    /// Whether registration must prove possession of the identifier
    /// before the account is fully active.
    pub fn requires_possession_proof(&self) -> bool {
        matches!(self, AuthMethod::Phone)
    }

    /// True for methods backed by an external identity provider.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            AuthMethod::Github | AuthMethod::Google | AuthMethod::NationalId
        )
    }

    /// Default channel for delivering verification codes for this method.
    pub fn delivery_channel(&self) -> DeliveryChannel {
        match self {
            AuthMethod::Email => DeliveryChannel::Email,
            AuthMethod::Phone => DeliveryChannel::Sms,
            _ => DeliveryChannel::Email,
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_lowercases() {
        assert_eq!(AuthMethod::Email.normalize("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn phone_normalization_strips_separators() {
        assert_eq!(
            AuthMethod::Phone.normalize("+7 (900) 123-45-67"),
            "+79001234567"
        );
    }

    #[test]
    fn provider_ids_compared_verbatim() {
        assert_eq!(AuthMethod::Github.normalize(" 12345 "), "12345");
    }

    #[test]
    fn only_phone_requires_possession_proof() {
        assert!(AuthMethod::Phone.requires_possession_proof());
        assert!(!AuthMethod::Email.requires_possession_proof());
        assert!(!AuthMethod::Github.requires_possession_proof());
    }

    #[test]
    fn parse_round_trips() {
        for m in [
            AuthMethod::Email,
            AuthMethod::Phone,
            AuthMethod::Github,
            AuthMethod::Google,
            AuthMethod::NationalId,
        ] {
            assert_eq!(AuthMethod::parse(m.as_str()), Some(m));
        }
        assert_eq!(AuthMethod::parse("carrier-pigeon"), None);
    }
}
