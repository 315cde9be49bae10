use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &Password) -> Result<String, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored PHC hash
pub fn verify_password(password: &Password, password_hash: &str) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = Password::new("harbour-tours-2026".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&password, &hash).is_ok());
        assert!(verify_password(&Password::new("wrong".to_string()), &hash).is_err());
    }

    #[test]
    fn test_salted_hashes_differ() {
        let password = Password::new("harbour-tours-2026".to_string());
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_debug_hides_password() {
        let password = Password::new("secret".to_string());
        assert_eq!(format!("{:?}", password), "Password(***)");
    }

    #[test]
    fn test_malformed_hash() {
        let password = Password::new("secret".to_string());
        assert!(verify_password(&password, "not-a-hash").is_err());
    }
}
