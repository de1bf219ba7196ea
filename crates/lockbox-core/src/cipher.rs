//! Field-level authenticated encryption
//!
//! AES-256-GCM over individual string fields. Each blob is self-describing:
//!
//! ```text
//! [ nonce (12 bytes) | ciphertext + tag ]
//! ```
//!
//! so no external state is needed to decrypt it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::kdf::SecretKey;

/// Size of the AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// An opaque, self-contained ciphertext blob.
///
/// Serialized as base64 so it survives JSON record bodies and the backup
/// envelope without blowing up in size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CipherBlob(#[serde(with = "base64_bytes")] Vec<u8>);

impl CipherBlob {
    /// Wrap raw wire bytes (nonce || ciphertext || tag)
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt a string field under the vault key.
///
/// A fresh random nonce is generated per call, so encrypting the same
/// plaintext twice yields different blobs.
pub fn encrypt(key: &SecretKey, plaintext: &str) -> VaultResult<CipherBlob> {
    let cipher =
        Aes256Gcm::new_from_slice(key.expose_secret()).map_err(|_| VaultError::Authentication)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| VaultError::Authentication)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(CipherBlob(out))
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Fails with [`VaultError::Authentication`] when the tag does not verify -
/// wrong key, truncated blob, or tampered ciphertext. Never returns garbage.
pub fn decrypt(key: &SecretKey, blob: &CipherBlob) -> VaultResult<String> {
    let data = blob.as_bytes();
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(VaultError::Authentication);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher =
        Aes256Gcm::new_from_slice(key.expose_secret()).map_err(|_| VaultError::Authentication)?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultError::Authentication)?;

    String::from_utf8(plaintext).map_err(|_| VaultError::Authentication)
}

/// Serde helper: bytes as standard base64 strings
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{derive_key, generate_salt, KdfParams};

    fn key(passphrase: &str) -> SecretKey {
        derive_key(
            passphrase,
            &generate_salt(),
            &KdfParams::insecure_test_params(),
        )
        .unwrap()
    }

    #[test]
    fn roundtrip() {
        let k = key("pw");
        let blob = encrypt(&k, "hunter2").unwrap();
        assert_eq!(decrypt(&k, &blob).unwrap(), "hunter2");
    }

    #[test]
    fn ciphertext_is_nondeterministic() {
        let k = key("pw");
        let a = encrypt(&k, "same plaintext").unwrap();
        let b = encrypt(&k, "same plaintext").unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&k, &a).unwrap(), decrypt(&k, &b).unwrap());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let blob = encrypt(&key("one"), "secret").unwrap();
        let result = decrypt(&key("two"), &blob);
        assert!(matches!(result, Err(VaultError::Authentication)));
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let k = key("pw");
        let blob = encrypt(&k, "secret").unwrap();

        let mut bytes = blob.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let result = decrypt(&k, &CipherBlob::from_bytes(bytes));
        assert!(matches!(result, Err(VaultError::Authentication)));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let k = key("pw");
        let result = decrypt(&k, &CipherBlob::from_bytes(vec![0u8; NONCE_SIZE]));
        assert!(matches!(result, Err(VaultError::Authentication)));
    }

    #[test]
    fn blob_roundtrips_through_json_as_base64() {
        let k = key("pw");
        let blob = encrypt(&k, "secret").unwrap();

        let json = serde_json::to_string(&blob).unwrap();
        assert!(json.starts_with('"'));

        let back: CipherBlob = serde_json::from_str(&json).unwrap();
        assert_eq!(decrypt(&k, &back).unwrap(), "secret");
    }
}
