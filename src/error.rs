use thiserror::Error;

use crate::models::AuthMethod;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,

    #[error("Merge request not found")]
    MergeRequestNotFound,

    #[error("Auth method {0} is already bound to this account")]
    MethodAlreadyBound(AuthMethod),

    #[error("Identifier already registered for method {0}")]
    IdentifierTaken(AuthMethod),

    /// Store-level unique-index violation. Registration treats this as
    /// "someone else just created it" and re-resolves.
    #[error("Unique constraint violated")]
    UniqueViolation,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid verification code")]
    InvalidVerificationCode,

    #[error("Second factor required")]
    TwoFactorRequired,

    #[error("Last auth method cannot be unbound")]
    LastMethodCannotBeUnbound,

    #[error("Merge request already resolved")]
    MergeAlreadyResolved,

    #[error("Merge request expired")]
    MergeExpired,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Provider {provider} exchange failed: {message}")]
    ProviderExchangeFailed { provider: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable kind for the wire boundary.
    ///
    /// Controllers map these to their own status codes; internal detail
    /// (Database/Internal messages) never crosses this surface.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::UserNotFound | AuthError::MergeRequestNotFound => "not_found",
            AuthError::MethodAlreadyBound(_)
            | AuthError::IdentifierTaken(_)
            | AuthError::UniqueViolation => "conflict",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidVerificationCode => "invalid_verification_code",
            AuthError::TwoFactorRequired => "two_factor_required",
            AuthError::LastMethodCannotBeUnbound => "invariant_violation",
            AuthError::MergeAlreadyResolved => "already_resolved",
            AuthError::MergeExpired => "expired",
            AuthError::RateLimited(_) => "rate_limited",
            AuthError::ProviderExchangeFailed { .. } => "provider_exchange_failed",
            AuthError::Validation(_) | AuthError::WeakPassword(_) => "invalid_input",
            AuthError::Database(_) | AuthError::Internal(_) => "internal",
        }
    }

    /// User-facing message. Opaque for internal failures.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

// Conversions from external error types
impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AuthError::UniqueViolation;
            }
        }
        tracing::error!("Database error: {}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::ProviderExchangeFailed {
            provider: "unknown".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal(err.to_string())
    }
}
