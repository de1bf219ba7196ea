//! Error types for vault operations

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Vault is locked - unlock with master passphrase first")]
    Locked,

    #[error("Wrong master passphrase")]
    WrongPassphrase,

    #[error("Authentication failed - wrong key or tampered ciphertext")]
    Authentication,

    #[error("Unsupported backup version: {0}")]
    UnsupportedBackupVersion(u32),

    #[error("Backup passphrase is invalid or the backup is corrupted")]
    InvalidBackupPassphrase,

    #[error("Too many failed unlock attempts - locked out for {0} seconds")]
    LockedOut(u64),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("Tag not found: {0}")]
    TagNotFound(Uuid),

    #[error("Patch does not apply to this record kind: {0}")]
    Patch(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sled::Error> for VaultError {
    fn from(e: sled::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}

impl From<sqlx::Error> for VaultError {
    fn from(e: sqlx::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
