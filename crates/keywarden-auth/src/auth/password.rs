//! Password hashing and verification using argon2id.

use std::sync::LazyLock;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Hash of a throwaway password, checked when a login names an unknown user
/// so both failure paths pay for one argon2 verification.
static DECOY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("keywarden-decoy-password").ok());

/// Hash a password using argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored argon2 PHC string.
///
/// A mismatch is `Ok(false)`; only an unparseable stored hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Burn one verification against the decoy hash. Always fails.
pub fn verify_decoy(password: &str) {
    if let Some(hash) = DECOY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("mysecret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("mysecret", &hash).unwrap());
        assert!(!verify_password("wrongpassword", &hash).unwrap());
    }

    #[test]
    fn same_password_gets_fresh_salt() {
        let h1 = hash_password("password1").unwrap();
        let h2 = hash_password("password1").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn corrupt_stored_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn decoy_hash_is_available() {
        assert!(DECOY_HASH.is_some());
        verify_decoy("whatever");
    }
}
