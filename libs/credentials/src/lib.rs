use argon2::{
    Argon2,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("password does not match")]
    Mismatch,
    #[error("failed to hash password: {0}")]
    Hash(password_hash::Error),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(password_hash::Error),
}

/// Hashes `plain` with argon2 and a fresh random salt. The result is a PHC
/// string, so parameters and salt travel with the hash.
pub fn hash_password(plain: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(CredentialError::Hash)?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> Result<(), CredentialError> {
    let parsed =
        PasswordHash::new(hash).map_err(CredentialError::MalformedHash)?;
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .map_err(|e| match e {
            password_hash::Error::Password => CredentialError::Mismatch,
            other => CredentialError::MalformedHash(other),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("abc123").unwrap();
        assert_ne!(hash, "abc123");
        assert!(hash.starts_with("$argon2"));
        verify_password("abc123", &hash).unwrap();
    }

    #[test]
    fn test_wrong_password_is_mismatch() {
        let hash = hash_password("abc123").unwrap();
        assert!(matches!(
            verify_password("abc124", &hash),
            Err(CredentialError::Mismatch)
        ));
    }

    #[test]
    fn test_salt_differs_per_hash() {
        let first = hash_password("abc123").unwrap();
        let second = hash_password("abc123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_malformed_hash() {
        assert!(matches!(
            verify_password("abc123", "not-a-phc-string"),
            Err(CredentialError::MalformedHash(_))
        ));
    }
}
