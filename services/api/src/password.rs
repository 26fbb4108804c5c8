//! Password hashing with Argon2

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(password_hash::Error),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(password_hash::Error),

    #[error("stored password hash is not valid UTF-8")]
    Encoding,
}

/// A user's password, held only as its PHC-formatted Argon2 hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Password {
    hash: Option<Vec<u8>>,
}

impl Password {
    /// Wrap a hash loaded from storage.
    pub fn from_hash(hash: Vec<u8>) -> Self {
        Self { hash: Some(hash) }
    }

    pub fn hash(&self) -> Option<&[u8]> {
        self.hash.as_deref()
    }

    /// Hash `plaintext` with a fresh salt and keep the result.
    pub fn set(&mut self, plaintext: &str) -> Result<(), PasswordError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(PasswordError::Hash)?
            .to_string();

        self.hash = Some(hash.into_bytes());
        Ok(())
    }

    /// Compare `plaintext` against the stored hash.
    ///
    /// A mismatch is `Ok(false)`; only a missing or unreadable hash is an error.
    pub fn matches(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let Some(hash) = self.hash.as_deref() else {
            return Ok(false);
        };
        let hash = std::str::from_utf8(hash).map_err(|_| PasswordError::Encoding)?;
        let parsed = PasswordHash::new(hash).map_err(PasswordError::MalformedHash)?;

        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::MalformedHash(e)),
        }
    }
}
