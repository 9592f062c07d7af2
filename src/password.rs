//! Password hashing with Argon2id.

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Hashes and verifies passwords. Cheap to clone.
#[derive(Clone)]
pub struct Passwords {
    params: Params,
}

impl Default for Passwords {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Passwords {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Minimal cost parameters. Only for tests.
    pub fn insecure_fast() -> Self {
        // m = 8 KiB, t = 1, p = 1 are the smallest values argon2 accepts.
        Self::new(Params::new(8, 1, 1, None).unwrap_or_default())
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Returns false on mismatch. Parameters are read from the stored hash.
    pub fn verify(&self, plain: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}
