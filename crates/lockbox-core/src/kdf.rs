//! Passphrase key derivation
//!
//! - Argon2id turns the master passphrase into the 32-byte vault key
//! - The verifier is SHA-256 over the derived key, stored to check future
//!   unlock attempts without revealing the key

use argon2::{Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{VaultError, VaultResult};

/// Size of the vault key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the Argon2 salt in bytes
pub const SALT_SIZE: usize = 16;

/// Size of the verifier hash in bytes
pub const VERIFIER_SIZE: usize = 32;

/// The in-memory vault key. Wrapped in `Secret` so it is zeroized on drop
/// and never appears in debug output.
pub type SecretKey = Secret<[u8; KEY_SIZE]>;

/// Argon2id work factors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Iteration count
    pub iterations: u32,
    /// Lane count
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // Interactive-use parameters: 64 MiB, 3 passes, 4 lanes
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Not for production vaults.
    pub fn insecure_test_params() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Master key record - one per installation.
///
/// Holds everything needed to check an unlock attempt and re-derive the
/// vault key: the salt, the KDF work factors, and a one-way verifier of the
/// derived key. Replaced wholesale on passphrase change, never partially
/// updated. The verifier cannot be inverted to the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MasterKeyRecord {
    pub salt: [u8; SALT_SIZE],
    pub verifier: [u8; VERIFIER_SIZE],
    pub kdf: KdfParams,
}

/// Derive the vault key from a passphrase and salt using Argon2id.
///
/// Pure and deterministic: same inputs always yield the same key. The work
/// factor is fixed by `params`, so the cost of a guess is bounded at
/// configuration time.
pub fn derive_key(
    passphrase: &str,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> VaultResult<SecretKey> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut output = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut output)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    let key = Secret::new(output);
    output.zeroize();
    Ok(key)
}

/// Compute the verifier: SHA-256 over the derived key material.
///
/// One-way in both directions that matter - it reveals neither the key nor
/// the passphrase, and checking it costs a full KDF run per guess.
pub fn make_verifier(key: &SecretKey) -> [u8; VERIFIER_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(key.expose_secret());
    hasher.finalize().into()
}

/// Create a fresh master key record from a passphrase.
///
/// Generates a new random salt, derives the key, and computes the verifier.
/// Used on first passphrase set and on explicit passphrase change.
pub fn set_passphrase(
    passphrase: &str,
    params: &KdfParams,
) -> VaultResult<(MasterKeyRecord, SecretKey)> {
    let salt = generate_salt();
    let key = derive_key(passphrase, &salt, params)?;
    let verifier = make_verifier(&key);

    Ok((
        MasterKeyRecord {
            salt,
            verifier,
            kdf: *params,
        },
        key,
    ))
}

/// Check a derived key against a stored verifier in constant time.
pub fn check_verifier(key: &SecretKey, expected: &[u8; VERIFIER_SIZE]) -> bool {
    constant_time_eq(&make_verifier(key), expected)
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> KdfParams {
        KdfParams::insecure_test_params()
    }

    #[test]
    fn derivation_is_deterministic() {
        let salt = generate_salt();
        let k1 = derive_key("correct-horse", &salt, &params()).unwrap();
        let k2 = derive_key("correct-horse", &salt, &params()).unwrap();
        assert_eq!(k1.expose_secret(), k2.expose_secret());
    }

    #[test]
    fn different_salts_yield_different_keys() {
        let k1 = derive_key("correct-horse", &generate_salt(), &params()).unwrap();
        let k2 = derive_key("correct-horse", &generate_salt(), &params()).unwrap();
        assert_ne!(k1.expose_secret(), k2.expose_secret());
    }

    #[test]
    fn verifier_differs_from_key_material() {
        let salt = generate_salt();
        let key = derive_key("pw", &salt, &params()).unwrap();
        let verifier = make_verifier(&key);
        assert_ne!(&verifier, key.expose_secret());
    }

    #[test]
    fn set_passphrase_uses_fresh_salts() {
        let (r1, _) = set_passphrase("pw", &params()).unwrap();
        let (r2, _) = set_passphrase("pw", &params()).unwrap();
        assert_ne!(r1.salt, r2.salt);
        assert_ne!(r1.verifier, r2.verifier);
    }

    #[test]
    fn verifier_check_accepts_matching_key_only() {
        let (record, key) = set_passphrase("right", &params()).unwrap();
        assert!(check_verifier(&key, &record.verifier));

        let wrong = derive_key("wrong", &record.salt, &record.kdf).unwrap();
        assert!(!check_verifier(&wrong, &record.verifier));
    }

    #[test]
    fn master_record_roundtrips_through_json() {
        let (record, _) = set_passphrase("pw", &params()).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: MasterKeyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
