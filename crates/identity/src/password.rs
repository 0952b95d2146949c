//! Password hashing, password policy and opaque secret generation.
//!
//! Uses Argon2id for password hashing and SHA-256 for stored token digests.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::config::PasswordConfig;
use crate::error::{FieldError, IdentityError, ValidationErrors};

/// Hash a password using Argon2id.
///
/// Returns the PHC-formatted hash string suitable for storage.
pub fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| IdentityError::Internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random opaque secret: 32 bytes, URL-safe base64 without padding.
pub fn generate_random_token() -> Result<String, IdentityError> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)
        .map_err(|e| IdentityError::Internal(format!("failed to generate random bytes: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest under which an opaque token is stored.
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Check a candidate password against the configured policy, collecting every violation.
pub fn validate_password(policy: &PasswordConfig, password: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if password.chars().count() < policy.required_length {
        errors.push(FieldError::new(
            "PasswordTooShort",
            format!(
                "Passwords must be at least {} characters.",
                policy.required_length
            ),
        ));
    }
    if policy.require_non_alphanumeric && password.chars().all(|c| c.is_alphanumeric()) {
        errors.push(FieldError::new(
            "PasswordRequiresNonAlphanumeric",
            "Passwords must have at least one non alphanumeric character.",
        ));
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new(
            "PasswordRequiresDigit",
            "Passwords must have at least one digit ('0'-'9').",
        ));
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        errors.push(FieldError::new(
            "PasswordRequiresLower",
            "Passwords must have at least one lowercase ('a'-'z').",
        ));
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        errors.push(FieldError::new(
            "PasswordRequiresUpper",
            "Passwords must have at least one uppercase ('A'-'Z').",
        ));
    }
    errors
}
