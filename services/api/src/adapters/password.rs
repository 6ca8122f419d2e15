//! services/api/src/adapters/password.rs
//!
//! Argon2 implementation of the `PasswordService` port.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use consult_chat_core::ports::{PasswordService, PortError, PortResult};

#[derive(Clone, Default)]
pub struct Argon2PasswordAdapter {
    argon2: Argon2<'static>,
}

impl Argon2PasswordAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordService for Argon2PasswordAdapter {
    fn hash_password(&self, password: &str) -> PortResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PortError::Unexpected(format!("Failed to hash password: {}", e)))
    }

    fn verify_password(&self, password: &str, password_hash: &str) -> PortResult<bool> {
        let parsed_hash = PasswordHash::new(password_hash)
            .map_err(|e| PortError::Unexpected(format!("Failed to parse password hash: {}", e)))?;
        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let adapter = Argon2PasswordAdapter::new();
        let first = adapter.hash_password("hunter22").unwrap();
        let second = adapter.hash_password("hunter22").unwrap();

        assert_ne!(first, second);
        assert!(!first.contains("hunter22"));
        assert!(adapter.verify_password("hunter22", &first).unwrap());
        assert!(!adapter.verify_password("hunter23", &first).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let adapter = Argon2PasswordAdapter::new();
        assert!(adapter.verify_password("x", "plaintext").is_err());
    }
}
