use chrono::{NaiveDateTime, SubsecRound, Utc};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Hex encoded SHA-256 digest of the given content.
pub fn compute_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// The current UTC time, truncated to the microsecond precision both database
/// backends store.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

pub fn load_env() {
    // Try to load variables from `.env` first
    if let Err(e) = dotenvy::dotenv() {
        tracing::error!("Could not load .env: {}", e);
    }

    // Then load `.env.local`, potentially overwriting values from `.env`
    if let Err(e) = dotenvy::from_path_override(Path::new(".env.local")) {
        tracing::error!("Could not load .env.local: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_compute_hash() {
        assert_eq!(
            compute_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(compute_hash(b"0xabc"), compute_hash(b"0xabc"));
        assert_ne!(compute_hash(b"0xabc"), compute_hash(b"0xabd"));
        assert_eq!(compute_hash(b"0xabc").len(), 64);
    }

    #[test]
    #[serial]
    fn test_load_env() {
        // Save the current directory
        let original_dir = env::current_dir().unwrap();

        // Create a temporary directory
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        let local_env_path = dir.path().join(".env.local");
        env::set_current_dir(&dir).unwrap();

        // No env files exist
        load_env();
        assert!(env::var("REGISTRY_TEST_VAR").is_err());

        // Only .env file exists
        fs::write(&env_path, "REGISTRY_TEST_VAR=from_env\n").unwrap();
        load_env();
        assert_eq!(env::var("REGISTRY_TEST_VAR").unwrap(), "from_env");

        // Both .env and .env.local files exist
        fs::write(&local_env_path, "REGISTRY_TEST_VAR=from_env_local\n").unwrap();
        load_env();
        assert_eq!(env::var("REGISTRY_TEST_VAR").unwrap(), "from_env_local");

        // Cleanup
        env::remove_var("REGISTRY_TEST_VAR");
        env::set_current_dir(&original_dir).unwrap();
    }
}
