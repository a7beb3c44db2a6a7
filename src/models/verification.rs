use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthMethod;

/// Code lifetime. Issued-at + 10 minutes.
pub const CODE_TTL_MINUTES: i64 = 10;

/// What a code proves. Codes never validate across purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "code_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    Registration,
    Login,
    Binding,
    Unbinding,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::Registration => "registration",
            CodePurpose::Login => "login",
            CodePurpose::Binding => "binding",
            CodePurpose::Unbinding => "unbinding",
        }
    }
}

impl std::fmt::Display for CodePurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral proof-of-possession record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCode {
    pub id: Uuid,
    /// 6-digit numeric string.
    pub code: String,
    /// Normalized identifier the code was issued for.
    pub identifier: String,
    pub method: AuthMethod,
    pub purpose: CodePurpose,
    /// Delivery destination; may differ from `identifier` for
    /// method-agnostic channels (e.g. a messenger chat id).
    pub contact: String,
    pub is_used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn new(
        code: String,
        identifier: String,
        method: AuthMethod,
        purpose: CodePurpose,
        contact: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            identifier,
            method,
            purpose,
            contact,
            is_used: false,
            expires_at: now + Duration::minutes(CODE_TTL_MINUTES),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_code_is_unused_and_unexpired() {
        let code = VerificationCode::new(
            "123456".to_string(),
            "+79001234567".to_string(),
            AuthMethod::Phone,
            CodePurpose::Registration,
            "+79001234567".to_string(),
        );
        assert!(!code.is_used);
        assert!(!code.is_expired(Utc::now()));
        assert!(code.is_expired(Utc::now() + Duration::minutes(CODE_TTL_MINUTES + 1)));
    }
}
