//! Pseudonymization of sensitive identifiers (MACs, SSIDs) before they leave the device.

use log::warn;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

const SALT_LENGTH: usize = 16;
const PLACEHOLDER_SALT: &str = "changemepleeease";

pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// Lowercase hex SHA-256 of `value` followed by `salt`.
pub fn salted_hash(value: &str, salt: &str) -> String {
    if salt.is_empty() || salt == PLACEHOLDER_SALT {
        warn!("sensitive data salt is empty or a placeholder");
    }

    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salt_is_alphanumeric() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_LENGTH);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hash_matches_sha256_of_concatenation() {
        // sha256("abc")
        assert_eq!(
            salted_hash("ab", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn different_salts_give_different_hashes() {
        let mac = "AA:BB:CC:DD:EE:FF";
        assert_ne!(salted_hash(mac, "salt-one"), salted_hash(mac, "salt-two"));
        assert_eq!(salted_hash(mac, "salt-one").len(), 64);
    }
}
