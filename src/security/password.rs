/// Password hashing and verification using Argon2id
use crate::error::{AuthError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use zxcvbn::zxcvbn;

/// Hash a password using Argon2id with a random per-password salt.
///
/// Enforces strength (composition rules + zxcvbn score >= 3) before
/// hashing. Returns a PHC-formatted string safe for storage.
pub fn hash_password(password: &str) -> Result<String> {
    validate_password_strength(password)?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against its PHC-formatted hash.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AuthError::Internal(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

/// Composition rules plus a zxcvbn entropy gate (score >= 3).
fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let checks: [(bool, &str); 4] = [
        (
            password.chars().any(|c| c.is_ascii_uppercase()),
            "Password must contain at least one uppercase letter",
        ),
        (
            password.chars().any(|c| c.is_ascii_lowercase()),
            "Password must contain at least one lowercase letter",
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Password must contain at least one digit",
        ),
        (
            password.chars().any(|c| !c.is_alphanumeric()),
            "Password must contain at least one special character",
        ),
    ];
    for (passed, message) in checks {
        if !passed {
            return Err(AuthError::WeakPassword(message.to_string()));
        }
    }

    let entropy = zxcvbn(password, &[])
        .map_err(|e| AuthError::Internal(format!("Password entropy calculation failed: {}", e)))?;
    if entropy.score() < 3 {
        return Err(AuthError::WeakPassword(
            "Password is too guessable. Please use a stronger password.".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_round_trip() {
        let password = "Tr1cky-Passphrase!";
        let hash = hash_password(password).expect("should hash password");
        assert!(verify_password(password, &hash).expect("should verify"));
        assert!(!verify_password("Wrong-Passphrase9!", &hash).expect("should verify"));
    }

    #[test]
    fn test_weak_passwords_rejected() {
        for weak in ["Short1!", "lowercase123!", "NoDigitsHere!", "NoSpecial123A"] {
            assert!(
                matches!(hash_password(weak), Err(AuthError::WeakPassword(_))),
                "{weak} should be rejected"
            );
        }
    }

    #[test]
    fn test_salts_differ_per_hash() {
        let password = "Tr1cky-Passphrase!";
        let hash1 = hash_password(password).expect("should hash");
        let hash2 = hash_password(password).expect("should hash");
        assert_ne!(hash1, hash2);
    }
}
