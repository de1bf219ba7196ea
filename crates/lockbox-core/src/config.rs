//! Vault configuration (non-sensitive, stored in plaintext TOML)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{VaultError, VaultResult};
use crate::kdf::KdfParams;

/// Config file name inside the vault directory
const CONFIG_FILE: &str = "config.toml";

/// Which persistence engine backs the record store.
///
/// Selected explicitly at startup; callers never probe the runtime
/// environment to discover which engine is active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    /// Embedded key-value store (sled)
    #[default]
    Kv,
    /// Relational store (SQLite)
    Sqlite,
}

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Storage engine for records and tags
    pub storage_engine: StorageEngine,

    /// Key derivation work factors
    pub kdf: KdfParams,

    /// Auto-lock after this many seconds of inactivity
    pub auto_lock_timeout_seconds: u64,

    /// Maximum unlock attempts before lockout
    pub max_unlock_attempts: u32,

    /// Lockout duration in seconds
    pub lockout_duration_seconds: u64,

    /// Search index rebuild debounce window in milliseconds
    pub search_debounce_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            storage_engine: StorageEngine::default(),
            kdf: KdfParams::default(),
            auto_lock_timeout_seconds: 300, // 5 minutes
            max_unlock_attempts: 5,
            lockout_duration_seconds: 300,
            search_debounce_ms: 200,
        }
    }
}

/// Get the config file path
pub fn config_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(CONFIG_FILE)
}

/// Load vault configuration, falling back to defaults when absent
pub async fn load_config(base_dir: &Path) -> VaultResult<VaultConfig> {
    let config_path = config_file_path(base_dir);

    if !config_path.exists() {
        return Ok(VaultConfig::default());
    }

    let content = fs::read_to_string(&config_path).await?;
    let config: VaultConfig =
        toml::from_str(&content).map_err(|e| VaultError::Config(e.to_string()))?;

    Ok(config)
}

/// Save vault configuration
pub async fn save_config(base_dir: &Path, config: &VaultConfig) -> VaultResult<()> {
    fs::create_dir_all(base_dir).await?;

    let config_path = config_file_path(base_dir);
    let content =
        toml::to_string_pretty(config).map_err(|e| VaultError::Config(e.to_string()))?;

    fs::write(&config_path, content).await?;

    Ok(())
}
