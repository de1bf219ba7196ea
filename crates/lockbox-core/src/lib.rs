//! Lockbox core - local-first personal vault
//!
//! This crate provides:
//! - Argon2id master-key derivation with a one-way unlock verifier
//! - AES-256-GCM field-level encryption of credential secrets
//! - Ciphertext-at-rest record storage over a pluggable backend
//!   (embedded key-value or SQLite)
//! - Passphrase-encrypted backup/restore as one authenticated envelope
//! - An owner-scoped, in-memory search index purged on lock

pub mod backup;
pub mod cipher;
pub mod config;
pub mod error;
pub mod kdf;
pub mod keystate;
pub mod models;
pub mod search;
pub mod selection;
pub mod store;
pub mod vault;

pub use backup::{BackupEnvelope, BACKUP_VERSION};
pub use config::{StorageEngine, VaultConfig};
pub use error::{VaultError, VaultResult};
pub use kdf::{KdfParams, MasterKeyRecord, SecretKey};
pub use keystate::{LockState, VaultKeyState};
pub use models::*;
pub use search::{SearchIndex, SearchIndexRecord};
pub use selection::Selection;
pub use store::{CredentialSecrets, KvBackend, RecordStore, SqliteBackend, StorageBackend};
pub use vault::{open_backend, Vault};
