//! Input validation utilities for the accounts service.

use once_cell::sync::Lazy;
use regex::Regex;

// Compile regex patterns once at startup. These patterns are hardcoded,
// so expect() here can only fire on a source bug.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

static CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{6}$").expect("hardcoded code regex is invalid - fix source code")
});

/// Validate email format (RFC 5322 simplified)
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Validate E.164 phone number format (+ followed by 7-15 digits)
pub fn validate_e164(phone: &str) -> bool {
    if !phone.starts_with('+') {
        return false;
    }
    let digits = &phone[1..];
    digits.len() >= 7 && digits.len() <= 15 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Validate verification code shape (exactly 6 ASCII digits)
pub fn validate_code_shape(code: &str) -> bool {
    CODE_REGEX.is_match(code)
}

/// Mask an identifier for logging, keeping the last 4 characters
pub fn mask_identifier(identifier: &str) -> String {
    if identifier.len() <= 4 {
        return "****".to_string();
    }
    let visible: String = identifier
        .chars()
        .skip(identifier.chars().count().saturating_sub(4))
        .collect();
    format!("****{}", visible)
}
