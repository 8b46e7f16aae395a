// web-server/src/utils/token.rs
use rand::{thread_rng, Rng};
use rand::distributions::Alphanumeric;
use sha2::{Sha256, Digest};

/// Length of locally generated nonces (~96 bits of entropy)
pub const FALLBACK_NONCE_LEN: usize = 17;
/// Length of nonces derived from a cosmic seed
pub const SEED_NONCE_LEN: usize = 32;

/// Generate a cryptographically secure random alphanumeric token of specified length
pub fn generate_secure_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Nonce used when the cosmic randomness service is unavailable
pub fn generate_fallback_nonce() -> String {
    generate_secure_token(FALLBACK_NONCE_LEN)
}

/// Hash a string using SHA-256
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Turn seed data of any shape into an alphanumeric nonce
pub fn nonce_from_seed(seed_data: &str) -> String {
    let mut digest = hash_string(seed_data);
    digest.truncate(SEED_NONCE_LEN);
    digest
}
