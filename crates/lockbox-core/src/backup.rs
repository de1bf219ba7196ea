//! Encrypted backup codec
//!
//! Serializes the full logical vault snapshot into one passphrase-encrypted,
//! authenticated envelope and restores it atomically. Envelope wire shape:
//!
//! ```text
//! { "version": 1, "salt": base64, "kdf": {...}, "iv": base64, "ciphertext": base64 }
//! ```
//!
//! A reader rejects versions it does not recognize before attempting any
//! decryption.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cipher::{self, CipherBlob, NONCE_SIZE};
use crate::error::{VaultError, VaultResult};
use crate::kdf::{self, KdfParams, SecretKey, SALT_SIZE};
use crate::models::{RecordBody, VaultSnapshot};

/// Envelope format version written by this build
pub const BACKUP_VERSION: u32 = 1;

/// One backup file: everything needed to restore except the passphrase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupEnvelope {
    pub version: u32,
    #[serde(with = "crate::cipher::base64_bytes")]
    pub salt: Vec<u8>,
    pub kdf: KdfParams,
    #[serde(with = "crate::cipher::base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "crate::cipher::base64_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Build an envelope from the vault contents.
///
/// The backup key is derived independently from the supplied passphrase
/// with a fresh salt. Credential secrets are re-decrypted under the live
/// key and re-encrypted under the backup key, then the whole snapshot is
/// wrapped once more in an authenticated blob.
pub fn create_backup(
    snapshot: &VaultSnapshot,
    live_key: &SecretKey,
    passphrase: &str,
    params: &KdfParams,
) -> VaultResult<BackupEnvelope> {
    let salt = kdf::generate_salt();
    let backup_key = kdf::derive_key(passphrase, &salt, params)?;

    let staged = reencrypt_snapshot(snapshot, live_key, &backup_key)?;
    let payload = serde_json::to_string(&staged)?;
    let blob = cipher::encrypt(&backup_key, &payload)?;

    let (iv, ciphertext) = blob.as_bytes().split_at(NONCE_SIZE);
    info!(
        records = snapshot.records.len(),
        tags = snapshot.tags.len(),
        "backup envelope created"
    );

    Ok(BackupEnvelope {
        version: BACKUP_VERSION,
        salt: salt.to_vec(),
        kdf: *params,
        iv: iv.to_vec(),
        ciphertext: ciphertext.to_vec(),
    })
}

/// Decrypt an envelope and return the snapshot with secrets re-encrypted
/// under the live vault key, ready for atomic import.
///
/// Fails closed: an unrecognized version is rejected before decryption, a
/// failed envelope authentication surfaces as
/// [`VaultError::InvalidBackupPassphrase`], and a failed inner field blob
/// (corruption past the envelope) as [`VaultError::Authentication`]. The
/// caller's live data is untouched in every failure case.
pub fn open_backup(
    envelope: &BackupEnvelope,
    passphrase: &str,
    live_key: &SecretKey,
) -> VaultResult<VaultSnapshot> {
    if envelope.version != BACKUP_VERSION {
        return Err(VaultError::UnsupportedBackupVersion(envelope.version));
    }

    let salt: [u8; SALT_SIZE] = envelope
        .salt
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::Config("malformed backup envelope: bad salt".into()))?;
    let backup_key = kdf::derive_key(passphrase, &salt, &envelope.kdf)?;

    let mut wire = Vec::with_capacity(envelope.iv.len() + envelope.ciphertext.len());
    wire.extend_from_slice(&envelope.iv);
    wire.extend_from_slice(&envelope.ciphertext);

    let payload = cipher::decrypt(&backup_key, &CipherBlob::from_bytes(wire))
        .map_err(|_| VaultError::InvalidBackupPassphrase)?;
    let staged: VaultSnapshot = serde_json::from_str(&payload)?;

    let restored = reencrypt_snapshot(&staged, &backup_key, live_key)?;
    info!(records = restored.records.len(), "backup envelope opened");
    Ok(restored)
}

/// Re-encrypt every credential secret field from one key to another,
/// leaving everything else untouched. Fresh nonces throughout.
pub(crate) fn reencrypt_snapshot(
    snapshot: &VaultSnapshot,
    from: &SecretKey,
    to: &SecretKey,
) -> VaultResult<VaultSnapshot> {
    let mut staged = snapshot.clone();
    for record in &mut staged.records {
        if let RecordBody::Credential {
            username,
            password,
            url,
        } = &mut record.body
        {
            *username = cipher::encrypt(to, &cipher::decrypt(from, username)?)?;
            *password = cipher::encrypt(to, &cipher::decrypt(from, password)?)?;
            if let Some(url) = url {
                *url = cipher::encrypt(to, &cipher::decrypt(from, url)?)?;
            }
        }
    }
    Ok(staged)
}
