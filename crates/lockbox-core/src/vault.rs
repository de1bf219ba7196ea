//! Vault composition root
//!
//! One explicit context object owning the key state machine, the record
//! store, and the search index - no process-wide globals, so tests build
//! isolated instances. This is the boundary the UI consumes: unlock/lock,
//! record and tag CRUD, search, backup and restore.
//!
//! Wiring rules enforced here:
//! - every mutation schedules a debounced index refresh
//! - `lock()` purges the index synchronously and cancels pending refreshes
//! - `change_passphrase` and `restore_backup` take `&mut self`, so no
//!   other mutation can interleave with their re-encryption pass

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backup::{self, BackupEnvelope};
use crate::cipher;
use crate::config::{StorageEngine, VaultConfig};
use crate::error::{VaultError, VaultResult};
use crate::kdf::{self, SecretKey};
use crate::keystate::{LockState, VaultKeyState};
use crate::models::{
    ImportReport, ImportRow, RecordBody, RecordDraft, RecordKind, RecordPatch, StoreSnapshot,
    Tag, VaultRecord,
};
use crate::search::{SearchIndex, SearchIndexRecord};
use crate::store::{CredentialSecrets, KvBackend, RecordStore, SqliteBackend, StorageBackend};

/// Open the configured storage backend under `base_dir`
pub async fn open_backend(
    engine: StorageEngine,
    base_dir: &Path,
) -> VaultResult<Box<dyn StorageBackend>> {
    tokio::fs::create_dir_all(base_dir).await?;
    match engine {
        StorageEngine::Kv => Ok(Box::new(KvBackend::open(&base_dir.join("records.kv"))?)),
        StorageEngine::Sqlite => Ok(Box::new(
            SqliteBackend::open(&base_dir.join("records.db")).await?,
        )),
    }
}

/// The vault: key lifecycle + ciphertext store + owner-scoped search
pub struct Vault {
    config: VaultConfig,
    keystate: Arc<RwLock<VaultKeyState>>,
    store: Arc<RecordStore>,
    index: Arc<RwLock<SearchIndex>>,
    /// Generation counter for debounced refreshes; a bump supersedes every
    /// pending rebuild
    refresh_gen: Arc<AtomicU64>,
    owner_id: Uuid,
}

impl Vault {
    /// Assemble a vault over an already-opened backend
    pub async fn open(config: VaultConfig, backend: Box<dyn StorageBackend>) -> VaultResult<Self> {
        let store = RecordStore::new(backend);
        let master = store.master().await?;
        let owner_id = store.owner_id().await?;
        let keystate = VaultKeyState::new(master, &config);

        Ok(Self {
            config,
            keystate: Arc::new(RwLock::new(keystate)),
            store: Arc::new(store),
            index: Arc::new(RwLock::new(SearchIndex::new())),
            refresh_gen: Arc::new(AtomicU64::new(0)),
            owner_id,
        })
    }

    /// Convenience: open the configured backend under `base_dir` and
    /// assemble the vault over it
    pub async fn open_at(config: VaultConfig, base_dir: &Path) -> VaultResult<Self> {
        let backend = open_backend(config.storage_engine, base_dir).await?;
        Self::open(config, backend).await
    }

    // ── Key lifecycle ───────────────────────────────────────────────────

    /// First-run passphrase set. Fails if a master record already exists.
    pub async fn initialize(&self, passphrase: &str) -> VaultResult<()> {
        let mut keystate = self.keystate.write().await;
        let master = keystate.set_passphrase(passphrase, &self.config.kdf)?;
        self.store.put_master(&master).await?;
        drop(keystate);

        self.rebuild_index_now().await
    }

    /// Attempt to unlock. `true` on success (and the index is rebuilt from
    /// the decrypted record set before returning), `false` on mismatch -
    /// never an error, for any number of consecutive attempts.
    pub async fn unlock(&self, passphrase: &str) -> VaultResult<bool> {
        let accepted = self.keystate.write().await.unlock(passphrase)?;
        if accepted {
            self.rebuild_index_now().await?;
        }
        Ok(accepted)
    }

    /// Lock the vault: drop the key, cancel pending index refreshes, and
    /// purge the index synchronously before returning.
    pub async fn lock(&self) {
        self.refresh_gen.fetch_add(1, Ordering::SeqCst);
        self.keystate.write().await.lock();
        self.index.write().await.purge();
    }

    pub async fn is_unlocked(&self) -> bool {
        self.keystate.read().await.is_unlocked()
    }

    pub async fn state(&self) -> LockState {
        self.keystate.read().await.state()
    }

    pub async fn is_locked_out(&self) -> bool {
        self.keystate.read().await.is_locked_out()
    }

    /// Record activity (resets the auto-lock timer)
    pub async fn touch(&self) {
        self.keystate.write().await.touch();
    }

    /// Whether the inactivity window has elapsed; the shell calls
    /// [`lock`](Self::lock) when it decides to act on this
    pub async fn should_auto_lock(&self) -> bool {
        self.keystate.read().await.should_auto_lock()
    }

    /// Re-encrypt every secret field under a key derived from `new` and
    /// replace the master key record, all-or-nothing. Exclusive: holds
    /// `&mut self` and the key-state write lock for the whole pass, so no
    /// other mutation can interleave and a mixed-key vault is impossible.
    pub async fn change_passphrase(&mut self, old: &str, new: &str) -> VaultResult<()> {
        let mut keystate = self.keystate.write().await;

        let master = keystate
            .master()
            .cloned()
            .ok_or_else(|| VaultError::Config("no passphrase set".into()))?;
        let old_key = kdf::derive_key(old, &master.salt, &master.kdf)?;
        if !kdf::check_verifier(&old_key, &master.verifier) {
            return Err(VaultError::WrongPassphrase);
        }

        let (new_master, new_key) = kdf::set_passphrase(new, &self.config.kdf)?;

        // Stage the fully re-encrypted contents in memory, then commit the
        // records and the replacement master record as one unit
        let contents = self.store.export_snapshot().await?;
        let staged = {
            let live_key = keystate.key()?;
            backup::reencrypt_snapshot(&contents, live_key, &new_key)?
        };
        self.store
            .replace_all(&StoreSnapshot {
                master: new_master.clone(),
                contents: staged,
            })
            .await?;

        keystate.install(new_master, new_key);
        info!("master passphrase changed");
        Ok(())
    }

    // ── Records ─────────────────────────────────────────────────────────

    pub async fn add(&self, draft: RecordDraft) -> VaultResult<VaultRecord> {
        let keystate = self.keystate.read().await;
        let record = self.store.add(draft, Some(keystate.key()?)).await?;
        drop(keystate);
        self.request_refresh();
        Ok(record)
    }

    pub async fn update(&self, id: Uuid, patch: RecordPatch) -> VaultResult<VaultRecord> {
        let keystate = self.keystate.read().await;
        let record = self.store.update(id, patch, Some(keystate.key()?)).await?;
        drop(keystate);
        self.request_refresh();
        Ok(record)
    }

    pub async fn update_many(
        &self,
        patches: Vec<(Uuid, RecordPatch)>,
    ) -> VaultResult<Vec<VaultRecord>> {
        let keystate = self.keystate.read().await;
        let records = self
            .store
            .update_many(patches, Some(keystate.key()?))
            .await?;
        drop(keystate);
        self.request_refresh();
        Ok(records)
    }

    pub async fn remove(&self, id: Uuid) -> VaultResult<()> {
        self.keystate.read().await.key()?;
        self.store.remove(id).await?;
        self.request_refresh();
        Ok(())
    }

    pub async fn remove_many(&self, ids: &[Uuid]) -> VaultResult<()> {
        self.keystate.read().await.key()?;
        self.store.remove_many(ids).await?;
        self.request_refresh();
        Ok(())
    }

    pub async fn duplicate(&self, id: Uuid) -> VaultResult<VaultRecord> {
        let keystate = self.keystate.read().await;
        let record = self.store.duplicate(id, Some(keystate.key()?)).await?;
        drop(keystate);
        self.request_refresh();
        Ok(record)
    }

    pub async fn get(&self, id: Uuid) -> VaultResult<Option<VaultRecord>> {
        self.store.get(id).await
    }

    pub async fn list(&self, kind: Option<RecordKind>) -> VaultResult<Vec<VaultRecord>> {
        self.store.list(kind).await
    }

    /// Decrypt a credential's secret fields. Fails with
    /// [`VaultError::Locked`] once the key is gone, including for calls
    /// that were in flight when [`lock`](Self::lock) ran.
    pub async fn read_credential(&self, id: Uuid) -> VaultResult<CredentialSecrets> {
        let keystate = self.keystate.read().await;
        self.store.read_credential(id, keystate.key()?).await
    }

    pub async fn bulk_import(
        &self,
        rows: &[ImportRow],
        dry_run: bool,
    ) -> VaultResult<ImportReport> {
        let keystate = self.keystate.read().await;
        let report = self
            .store
            .bulk_import(rows, dry_run, Some(keystate.key()?))
            .await?;
        drop(keystate);
        if !dry_run {
            self.request_refresh();
        }
        Ok(report)
    }

    // ── Tags ────────────────────────────────────────────────────────────

    pub async fn add_tag(&self, tag: Tag) -> VaultResult<Tag> {
        self.keystate.read().await.key()?;
        let tag = self.store.add_tag(tag).await?;
        self.request_refresh();
        Ok(tag)
    }

    pub async fn update_tag(&self, tag: Tag) -> VaultResult<Tag> {
        self.keystate.read().await.key()?;
        let tag = self.store.update_tag(tag).await?;
        self.request_refresh();
        Ok(tag)
    }

    pub async fn list_tags(&self) -> VaultResult<Vec<Tag>> {
        self.store.list_tags().await
    }

    pub async fn remove_tag_everywhere(&self, tag_id: Uuid) -> VaultResult<()> {
        self.keystate.read().await.key()?;
        self.store.remove_tag_everywhere(tag_id).await?;
        self.request_refresh();
        Ok(())
    }

    // ── Search ──────────────────────────────────────────────────────────

    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchIndexRecord> {
        self.index.read().await.search(query, limit)
    }

    /// Schedule a debounced index rebuild. Bursts of mutations inside the
    /// configured window coalesce into one rebuild; a lock or a newer
    /// request supersedes a pending one.
    pub fn request_refresh(&self) {
        let generation = self.refresh_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let refresh_gen = Arc::clone(&self.refresh_gen);
        let keystate = Arc::clone(&self.keystate);
        let store = Arc::clone(&self.store);
        let index = Arc::clone(&self.index);
        let owner_id = self.owner_id;
        let window = Duration::from_millis(self.config.search_debounce_ms);

        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if refresh_gen.load(Ordering::SeqCst) != generation {
                return; // superseded by a newer mutation or a lock
            }

            let entries = {
                let keystate = keystate.read().await;
                let key = match keystate.key() {
                    Ok(key) => key,
                    Err(_) => return, // locked while we were waiting
                };
                match build_index_entries(&store, owner_id, key).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!("index refresh failed: {e}");
                        return;
                    }
                }
            };

            // Final generation check under the index lock: lock() bumps the
            // generation before purging, so a stale rebuild can never
            // resurrect plaintext after a purge
            let mut index = index.write().await;
            if refresh_gen.load(Ordering::SeqCst) == generation {
                index.apply(owner_id, entries);
            }
        });
    }

    /// Rebuild the index synchronously from the decrypted record set.
    /// Used on unlock and after restore.
    async fn rebuild_index_now(&self) -> VaultResult<()> {
        // Supersede any pending debounced rebuild
        self.refresh_gen.fetch_add(1, Ordering::SeqCst);

        let keystate = self.keystate.read().await;
        let entries = build_index_entries(&self.store, self.owner_id, keystate.key()?).await?;
        drop(keystate);

        self.index.write().await.set_owner(self.owner_id, entries);
        Ok(())
    }

    // ── Backup / restore ────────────────────────────────────────────────

    /// Export the whole vault as one passphrase-encrypted envelope. The
    /// backup passphrase is independent of the master passphrase.
    pub async fn create_backup(&self, passphrase: &str) -> VaultResult<BackupEnvelope> {
        let keystate = self.keystate.read().await;
        let live_key = keystate.key()?;
        let snapshot = self.store.export_snapshot().await?;
        backup::create_backup(&snapshot, live_key, passphrase, &self.config.kdf)
    }

    /// Atomically replace the vault contents from an envelope.
    ///
    /// Fails closed without touching live data on an unknown version or a
    /// failed authentication. Exclusive for the same reason as
    /// [`change_passphrase`](Self::change_passphrase).
    pub async fn restore_backup(
        &mut self,
        passphrase: &str,
        envelope: &BackupEnvelope,
    ) -> VaultResult<()> {
        {
            let keystate = self.keystate.write().await;
            let live_key = keystate.key()?;

            let contents = backup::open_backup(envelope, passphrase, live_key)?;
            let master = keystate
                .master()
                .cloned()
                .ok_or_else(|| VaultError::Config("no passphrase set".into()))?;

            self.store
                .replace_all(&StoreSnapshot { master, contents })
                .await?;
        }

        info!("vault restored from backup");
        self.rebuild_index_now().await
    }
}

/// Build the searchable view of every record: decrypted titles, subtitles,
/// and keywords, tag names included
async fn build_index_entries(
    store: &RecordStore,
    owner_id: Uuid,
    key: &SecretKey,
) -> VaultResult<Vec<SearchIndexRecord>> {
    let tags = store.list_tags().await?;
    let tag_names: std::collections::HashMap<Uuid, String> =
        tags.into_iter().map(|t| (t.id, t.name)).collect();

    let records = store.list(None).await?;
    let mut entries = Vec::with_capacity(records.len());

    for record in records {
        let mut keywords: Vec<String> = record
            .tags
            .iter()
            .filter_map(|id| tag_names.get(id).cloned())
            .collect();

        let subtitle = match &record.body {
            RecordBody::Site { url, notes } => {
                if !notes.is_empty() {
                    keywords.push(notes.clone());
                }
                Some(url.clone())
            }
            RecordBody::Credential { username, url, .. } => {
                if let Some(url) = url {
                    keywords.push(cipher::decrypt(key, url)?);
                }
                Some(cipher::decrypt(key, username)?)
            }
            RecordBody::Document { attachment, notes } => {
                if !notes.is_empty() {
                    keywords.push(notes.clone());
                }
                attachment.as_ref().map(|a| {
                    keywords.push(a.mime.clone());
                    a.name.clone()
                })
            }
        };

        entries.push(SearchIndexRecord {
            owner_id,
            kind: record.kind(),
            ref_id: record.id,
            title: record.title,
            subtitle,
            keywords,
            updated_at: record.updated_at,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tempfile::TempDir;

    use super::*;
    use crate::kdf::KdfParams;
    use crate::models::SecretPatch;

    fn test_config() -> VaultConfig {
        VaultConfig {
            kdf: KdfParams::insecure_test_params(),
            search_debounce_ms: 10,
            max_unlock_attempts: 100,
            ..VaultConfig::default()
        }
    }

    async fn vault() -> (Vault, TempDir) {
        let dir = TempDir::new().unwrap();
        let vault = Vault::open_at(test_config(), dir.path()).await.unwrap();
        (vault, dir)
    }

    fn bank_draft() -> RecordDraft {
        RecordDraft::Credential {
            title: "Bank".into(),
            username: "alice".into(),
            password: "p@ss".into(),
            url: None,
            tags: BTreeSet::new(),
        }
    }

    async fn settle_refresh() {
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    #[tokio::test]
    async fn set_passphrase_add_lock_unlock_read_back() {
        let (vault, _dir) = vault().await;

        vault.initialize("correct-horse").await.unwrap();
        let record = vault.add(bank_draft()).await.unwrap();

        vault.lock().await;
        assert!(!vault.is_unlocked().await);

        assert!(vault.unlock("correct-horse").await.unwrap());
        let secrets = vault.read_credential(record.id).await.unwrap();
        assert_eq!(secrets.username, "alice");
        assert_eq!(secrets.password, "p@ss");
    }

    #[tokio::test]
    async fn wrong_passphrase_keeps_vault_locked_and_unreadable() {
        let (vault, _dir) = vault().await;
        vault.initialize("correct-horse").await.unwrap();
        let record = vault.add(bank_draft()).await.unwrap();
        vault.lock().await;

        assert!(!vault.unlock("wrong").await.unwrap());
        assert!(!vault.is_unlocked().await);

        let result = vault.read_credential(record.id).await;
        assert!(matches!(result, Err(VaultError::Locked)));
    }

    #[tokio::test]
    async fn repeated_wrong_attempts_then_correct_succeeds() {
        let (vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();
        vault.lock().await;

        for _ in 0..5 {
            assert!(!vault.unlock("nope").await.unwrap());
        }
        assert!(vault.unlock("pw").await.unwrap());
    }

    #[tokio::test]
    async fn lock_purges_search_index() {
        let (vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();
        vault.add(bank_draft()).await.unwrap();
        settle_refresh().await;

        assert_eq!(vault.search("bank", 10).await.len(), 1);
        assert_eq!(vault.search("alice", 10).await.len(), 1);

        vault.lock().await;

        // No previously-indexed plaintext is reachable
        assert!(vault.search("bank", 10).await.is_empty());
        assert!(vault.search("alice", 10).await.is_empty());
        assert!(vault.search("", 10).await.is_empty());
    }

    #[tokio::test]
    async fn pending_refresh_cannot_resurrect_plaintext_after_lock() {
        let (vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();
        vault.add(bank_draft()).await.unwrap();

        // Lock before the debounce window elapses
        vault.lock().await;
        settle_refresh().await;

        assert!(vault.search("bank", 10).await.is_empty());
        assert!(vault.search("", 10).await.is_empty());
    }

    #[tokio::test]
    async fn unlock_rebuilds_index_from_decrypted_records() {
        let (vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();
        vault.add(bank_draft()).await.unwrap();
        vault.lock().await;
        assert!(vault.unlock("pw").await.unwrap());

        // Rebuilt synchronously on unlock, no mutation needed
        assert_eq!(vault.search("alice", 10).await.len(), 1);
    }

    #[tokio::test]
    async fn mutation_burst_coalesces_into_fresh_index() {
        let (vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();

        for i in 0..5 {
            vault
                .add(RecordDraft::Site {
                    title: format!("site-{i}"),
                    url: "https://example.com".into(),
                    notes: String::new(),
                    tags: BTreeSet::new(),
                })
                .await
                .unwrap();
        }
        settle_refresh().await;

        assert_eq!(vault.search("site", 10).await.len(), 5);
    }

    #[tokio::test]
    async fn mutations_while_locked_fail() {
        let (vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();
        let record = vault.add(bank_draft()).await.unwrap();
        vault.lock().await;

        assert!(matches!(
            vault.add(bank_draft()).await,
            Err(VaultError::Locked)
        ));
        assert!(matches!(
            vault.remove(record.id).await,
            Err(VaultError::Locked)
        ));
        let patch = RecordPatch {
            secrets: SecretPatch {
                password: Some("x".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            vault.update(record.id, patch).await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn change_passphrase_requires_the_old_one() {
        let (mut vault, _dir) = vault().await;
        vault.initialize("original").await.unwrap();
        vault.add(bank_draft()).await.unwrap();

        let result = vault.change_passphrase("not-original", "next").await;
        assert!(matches!(result, Err(VaultError::WrongPassphrase)));

        // Still fully usable under the old passphrase
        vault.lock().await;
        assert!(vault.unlock("original").await.unwrap());
    }

    #[tokio::test]
    async fn change_passphrase_reencrypts_and_swaps_master() {
        let (mut vault, _dir) = vault().await;
        vault.initialize("original").await.unwrap();
        let record = vault.add(bank_draft()).await.unwrap();

        vault.change_passphrase("original", "next").await.unwrap();

        // Secrets readable immediately under the new key
        let secrets = vault.read_credential(record.id).await.unwrap();
        assert_eq!(secrets.password, "p@ss");

        vault.lock().await;
        assert!(!vault.unlock("original").await.unwrap());
        assert!(vault.unlock("next").await.unwrap());
        let secrets = vault.read_credential(record.id).await.unwrap();
        assert_eq!(secrets.username, "alice");
    }

    #[tokio::test]
    async fn backup_roundtrip_reproduces_vault_state() {
        let (mut vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();

        let tag = vault.add_tag(Tag::new("money", "#116633")).await.unwrap();
        let record = vault.add(bank_draft()).await.unwrap();
        let patch = RecordPatch {
            tags: Some([tag.id].into_iter().collect()),
            ..Default::default()
        };
        vault.update(record.id, patch).await.unwrap();

        let envelope = vault.create_backup("backup-pw").await.unwrap();

        // Diverge the live vault, then restore
        vault.remove(record.id).await.unwrap();
        vault
            .add(RecordDraft::Site {
                title: "stray".into(),
                url: "https://stray".into(),
                notes: String::new(),
                tags: BTreeSet::new(),
            })
            .await
            .unwrap();

        vault.restore_backup("backup-pw", &envelope).await.unwrap();

        let records = vault.list(None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record.id);
        assert_eq!(records[0].title, "Bank");
        assert!(records[0].tags.contains(&tag.id));

        let secrets = vault.read_credential(record.id).await.unwrap();
        assert_eq!(secrets.username, "alice");
        assert_eq!(secrets.password, "p@ss");

        // Index reflects the restored contents
        assert_eq!(vault.search("bank", 10).await.len(), 1);
        assert!(vault.search("stray", 10).await.is_empty());
    }

    #[tokio::test]
    async fn tampered_backup_leaves_live_vault_unchanged() {
        let (mut vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();
        let record = vault.add(bank_draft()).await.unwrap();

        let mut envelope = vault.create_backup("backup-pw").await.unwrap();
        let middle = envelope.ciphertext.len() / 2;
        envelope.ciphertext[middle] ^= 0x01;

        let result = vault.restore_backup("backup-pw", &envelope).await;
        assert!(matches!(result, Err(VaultError::InvalidBackupPassphrase)));

        // Live data untouched
        let secrets = vault.read_credential(record.id).await.unwrap();
        assert_eq!(secrets.password, "p@ss");
        assert_eq!(vault.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_backup_version_is_refused() {
        let (mut vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();
        vault.add(bank_draft()).await.unwrap();

        let mut envelope = vault.create_backup("backup-pw").await.unwrap();
        envelope.version = 2;

        let result = vault.restore_backup("backup-pw", &envelope).await;
        assert!(matches!(
            result,
            Err(VaultError::UnsupportedBackupVersion(2))
        ));
        assert_eq!(vault.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn order_survives_backup_and_restore() {
        let (mut vault, _dir) = vault().await;
        vault.initialize("pw").await.unwrap();

        let mut max_order = 0;
        for i in 0..3 {
            let record = vault
                .add(RecordDraft::Site {
                    title: format!("site-{i}"),
                    url: String::new(),
                    notes: String::new(),
                    tags: BTreeSet::new(),
                })
                .await
                .unwrap();
            max_order = record.order;
        }

        let envelope = vault.create_backup("backup-pw").await.unwrap();
        vault.restore_backup("backup-pw", &envelope).await.unwrap();

        let next = vault
            .add(RecordDraft::Site {
                title: "after-restore".into(),
                url: String::new(),
                notes: String::new(),
                tags: BTreeSet::new(),
            })
            .await
            .unwrap();
        assert!(next.order > max_order);
    }

    #[tokio::test]
    async fn vault_reopens_locked_with_persisted_master() {
        let dir = TempDir::new().unwrap();
        {
            let vault = Vault::open_at(test_config(), dir.path()).await.unwrap();
            vault.initialize("pw").await.unwrap();
            vault.add(bank_draft()).await.unwrap();
        }

        let vault = Vault::open_at(test_config(), dir.path()).await.unwrap();
        assert_eq!(vault.state().await, LockState::Locked);
        assert!(vault.unlock("pw").await.unwrap());
        assert_eq!(vault.list(None).await.unwrap().len(), 1);
    }
}
