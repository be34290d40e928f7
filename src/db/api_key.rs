use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// NEVER CHANGE THE PREFIX OF EXISTING KEYS!!! Doing so will implicitly
/// revoke all the keys, disrupting production users.
pub const API_KEY_PREFIX: &str = "creg_";
const SECRET_BYTES: usize = 32;

/// A fresh plaintext API key: the prefix followed by 32 hex encoded random bytes.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", API_KEY_PREFIX, hex::encode(bytes))
}

/// The stored form of an API key. Only this hash is ever persisted.
pub fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}
