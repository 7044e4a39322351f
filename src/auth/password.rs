use argon2::{
    password_hash::{Error as HashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

lazy_static! {
    /// Verified against when the login id is unknown, so both failure paths
    /// cost one Argon2 verification.
    static ref DUMMY_HASH: String =
        hash_password("dummy-password-for-timing").unwrap_or_default();
}

fn hasher() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

/// Argon2id PHC string with a fresh salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            anyhow::anyhow!("password hashing failed: {e}")
        })
}

/// `Ok(false)` for a wrong password. Errors only when `stored` is unusable.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {e}"))?;
    match hasher().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, "password verification failed");
            Err(anyhow::anyhow!("password verification failed: {e}"))
        }
    }
}

/// Login check. With no stored hash the dummy is verified and the answer is
/// still `false`; an unreadable stored hash is a mismatch.
pub fn password_matches(plain: &str, stored: Option<&str>) -> bool {
    let hash = stored.unwrap_or(DUMMY_HASH.as_str());
    let ok = verify_password(plain, hash).unwrap_or(false);
    ok && stored.is_some()
}
