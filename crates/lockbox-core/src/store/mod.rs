//! Persistent record storage - ciphertext at rest
//!
//! The store owns record/tag CRUD, bulk import, duplication, and the
//! snapshot paths used by passphrase change and backup restore. Secret
//! fields arrive as plaintext and are encrypted with the live vault key
//! before anything touches the backend; the backend only ever sees
//! ciphertext blobs inside serialized bodies.

pub mod backend;
pub mod kv;
pub mod sqlite;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::cipher::{self, CipherBlob};
use crate::error::{VaultError, VaultResult};
use crate::kdf::{MasterKeyRecord, SecretKey};
use crate::models::{
    ImportReport, ImportRow, ImportRowError, RecordBody, RecordDraft, RecordKind, RecordPatch,
    StoreSnapshot, Tag, VaultRecord, VaultSnapshot,
};

pub use backend::StorageBackend;
pub use kv::KvBackend;
pub use sqlite::SqliteBackend;

/// Title suffix for duplicated records
const COPY_SUFFIX: &str = " (copy)";

/// Decrypted view of a credential's secret fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSecrets {
    pub username: String,
    pub password: String,
    pub url: Option<String>,
}

/// Record store over a pluggable backend
pub struct RecordStore {
    backend: Box<dyn StorageBackend>,
}

impl RecordStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    // ── Records ─────────────────────────────────────────────────────────

    /// Create a record from a draft. Assigns id, timestamps, and the next
    /// per-kind order value; encrypts credential secret fields with the
    /// live key before persistence.
    pub async fn add(
        &self,
        draft: RecordDraft,
        key: Option<&SecretKey>,
    ) -> VaultResult<VaultRecord> {
        let order = self.backend.next_order(draft.kind()).await?;
        let now = Utc::now();

        let (title, tags, body) = match draft {
            RecordDraft::Site {
                title,
                url,
                notes,
                tags,
            } => (title, tags, RecordBody::Site { url, notes }),
            RecordDraft::Credential {
                title,
                username,
                password,
                url,
                tags,
            } => {
                let key = key.ok_or(VaultError::Locked)?;
                let body = RecordBody::Credential {
                    username: cipher::encrypt(key, &username)?,
                    password: cipher::encrypt(key, &password)?,
                    url: url.map(|u| cipher::encrypt(key, &u)).transpose()?,
                };
                (title, tags, body)
            }
            RecordDraft::Document {
                title,
                attachment,
                notes,
                tags,
            } => (title, tags, RecordBody::Document { attachment, notes }),
        };

        let record = VaultRecord {
            id: Uuid::new_v4(),
            title,
            tags,
            created_at: now,
            updated_at: now,
            order,
            body,
        };

        self.backend.put(&record).await?;
        debug!(id = %record.id, kind = %record.kind(), "record added");
        Ok(record)
    }

    /// Apply a partial update. Only fields present in the patch are
    /// rewritten; secret fields are re-encrypted only when they change.
    /// Last writer wins on concurrent edits to the same id.
    pub async fn update(
        &self,
        id: Uuid,
        patch: RecordPatch,
        key: Option<&SecretKey>,
    ) -> VaultResult<VaultRecord> {
        let mut record = self
            .backend
            .get(id)
            .await?
            .ok_or(VaultError::RecordNotFound(id))?;

        if let Some(title) = patch.title {
            record.title = title;
        }
        if let Some(tags) = patch.tags {
            record.tags = tags;
        }

        match &mut record.body {
            RecordBody::Site { url, notes } => {
                if !patch.secrets.is_empty() {
                    return Err(VaultError::Patch("secret fields on a site record".into()));
                }
                if patch.attachment.is_some() {
                    return Err(VaultError::Patch("attachment on a site record".into()));
                }
                if let Some(new_url) = patch.url {
                    *url = new_url;
                }
                if let Some(new_notes) = patch.notes {
                    *notes = new_notes;
                }
            }
            RecordBody::Credential {
                username,
                password,
                url,
            } => {
                if patch.url.is_some() || patch.notes.is_some() || patch.attachment.is_some() {
                    return Err(VaultError::Patch(
                        "plaintext fields on a credential record".into(),
                    ));
                }
                if !patch.secrets.is_empty() {
                    let key = key.ok_or(VaultError::Locked)?;
                    if let Some(new_username) = patch.secrets.username {
                        *username = cipher::encrypt(key, &new_username)?;
                    }
                    if let Some(new_password) = patch.secrets.password {
                        *password = cipher::encrypt(key, &new_password)?;
                    }
                    if let Some(new_url) = patch.secrets.url {
                        *url = new_url.map(|u| cipher::encrypt(key, &u)).transpose()?;
                    }
                }
            }
            RecordBody::Document { attachment, notes } => {
                if !patch.secrets.is_empty() {
                    return Err(VaultError::Patch(
                        "secret fields on a document record".into(),
                    ));
                }
                if patch.url.is_some() {
                    return Err(VaultError::Patch("url on a document record".into()));
                }
                if let Some(new_attachment) = patch.attachment {
                    *attachment = new_attachment;
                }
                if let Some(new_notes) = patch.notes {
                    *notes = new_notes;
                }
            }
        }

        record.updated_at = Utc::now();
        self.backend.put(&record).await?;
        Ok(record)
    }

    /// Apply several patches; each record follows the same rules as
    /// [`update`](Self::update)
    pub async fn update_many(
        &self,
        patches: Vec<(Uuid, RecordPatch)>,
        key: Option<&SecretKey>,
    ) -> VaultResult<Vec<VaultRecord>> {
        let mut updated = Vec::with_capacity(patches.len());
        for (id, patch) in patches {
            updated.push(self.update(id, patch, key).await?);
        }
        Ok(updated)
    }

    pub async fn remove(&self, id: Uuid) -> VaultResult<()> {
        if self.backend.get(id).await?.is_none() {
            return Err(VaultError::RecordNotFound(id));
        }
        self.backend.delete(id).await
    }

    pub async fn remove_many(&self, ids: &[Uuid]) -> VaultResult<()> {
        self.backend.bulk_delete(ids).await
    }

    pub async fn get(&self, id: Uuid) -> VaultResult<Option<VaultRecord>> {
        self.backend.get(id).await
    }

    /// Records of one kind (or all), ordered by `order`
    pub async fn list(&self, kind: Option<RecordKind>) -> VaultResult<Vec<VaultRecord>> {
        self.backend.query_by_kind(kind).await
    }

    /// Clone a record under a new id with a "copy" title suffix.
    ///
    /// Tags are preserved. Credential secrets are decrypted and
    /// re-encrypted under fresh nonces - never a byte-copy of the original
    /// ciphertext, so duplicates cannot be correlated by blob.
    pub async fn duplicate(
        &self,
        id: Uuid,
        key: Option<&SecretKey>,
    ) -> VaultResult<VaultRecord> {
        let original = self
            .backend
            .get(id)
            .await?
            .ok_or(VaultError::RecordNotFound(id))?;

        let body = match &original.body {
            RecordBody::Credential {
                username,
                password,
                url,
            } => {
                let key = key.ok_or(VaultError::Locked)?;
                RecordBody::Credential {
                    username: reencrypt(key, username)?,
                    password: reencrypt(key, password)?,
                    url: url.as_ref().map(|u| reencrypt(key, u)).transpose()?,
                }
            }
            other => other.clone(),
        };

        let now = Utc::now();
        let copy = VaultRecord {
            id: Uuid::new_v4(),
            title: format!("{}{COPY_SUFFIX}", original.title),
            tags: original.tags.clone(),
            created_at: now,
            updated_at: now,
            order: self.backend.next_order(original.kind()).await?,
            body,
        };

        self.backend.put(&copy).await?;
        Ok(copy)
    }

    /// Decrypt a credential's secret fields
    pub async fn read_credential(
        &self,
        id: Uuid,
        key: &SecretKey,
    ) -> VaultResult<CredentialSecrets> {
        let record = self
            .backend
            .get(id)
            .await?
            .ok_or(VaultError::RecordNotFound(id))?;

        match &record.body {
            RecordBody::Credential {
                username,
                password,
                url,
            } => Ok(CredentialSecrets {
                username: cipher::decrypt(key, username)?,
                password: cipher::decrypt(key, password)?,
                url: url.as_ref().map(|u| cipher::decrypt(key, u)).transpose()?,
            }),
            _ => Err(VaultError::Patch(format!(
                "record {id} is not a credential"
            ))),
        }
    }

    // ── Bulk import ─────────────────────────────────────────────────────

    /// Validate and map external rows into typed records.
    ///
    /// With `dry_run` set, rows are validated and mapped but nothing is
    /// persisted - zero observable side effects on the store.
    pub async fn bulk_import(
        &self,
        rows: &[ImportRow],
        dry_run: bool,
        key: Option<&SecretKey>,
    ) -> VaultResult<ImportReport> {
        let mut report = ImportReport::default();

        for (index, row) in rows.iter().enumerate() {
            match draft_from_row(row) {
                Ok(draft) => {
                    if draft.kind() == RecordKind::Credential && key.is_none() {
                        return Err(VaultError::Locked);
                    }
                    if dry_run {
                        report.imported.push(Uuid::new_v4());
                    } else {
                        let record = self.add(draft, key).await?;
                        report.imported.push(record.id);
                    }
                }
                Err(message) => report.errors.push(ImportRowError {
                    row: index,
                    message,
                }),
            }
        }

        debug!(
            imported = report.imported.len(),
            rejected = report.errors.len(),
            dry_run,
            "bulk import finished"
        );
        Ok(report)
    }

    // ── Tags ────────────────────────────────────────────────────────────

    pub async fn add_tag(&self, tag: Tag) -> VaultResult<Tag> {
        self.backend.put_tag(&tag).await?;
        Ok(tag)
    }

    pub async fn update_tag(&self, tag: Tag) -> VaultResult<Tag> {
        if self.backend.get_tag(tag.id).await?.is_none() {
            return Err(VaultError::TagNotFound(tag.id));
        }
        self.backend.put_tag(&tag).await?;
        Ok(tag)
    }

    pub async fn list_tags(&self) -> VaultResult<Vec<Tag>> {
        self.backend.list_tags().await
    }

    /// Delete a tag and strip it from every record's tag set as one atomic
    /// unit - a dangling tag reference can never be observed.
    pub async fn remove_tag_everywhere(&self, tag_id: Uuid) -> VaultResult<()> {
        if self.backend.get_tag(tag_id).await?.is_none() {
            return Err(VaultError::TagNotFound(tag_id));
        }

        let now = Utc::now();
        let mut updated: Vec<VaultRecord> = self
            .backend
            .query_by_kind(None)
            .await?
            .into_iter()
            .filter(|r| r.tags.contains(&tag_id))
            .collect();
        for record in &mut updated {
            record.tags.remove(&tag_id);
            record.updated_at = now;
        }

        self.backend.remove_tag_with_records(tag_id, &updated).await
    }

    // ── Snapshots and meta ──────────────────────────────────────────────

    /// The full logical vault contents (records still ciphertext)
    pub async fn export_snapshot(&self) -> VaultResult<VaultSnapshot> {
        Ok(VaultSnapshot {
            records: self.backend.query_by_kind(None).await?,
            tags: self.backend.list_tags().await?,
            counters: self.backend.order_counters().await?,
        })
    }

    /// Atomically replace the whole store. Terminal step of passphrase
    /// change and backup restore.
    pub async fn replace_all(&self, snapshot: &StoreSnapshot) -> VaultResult<()> {
        self.backend.replace_all(snapshot).await
    }

    pub async fn master(&self) -> VaultResult<Option<MasterKeyRecord>> {
        self.backend.master().await
    }

    pub async fn put_master(&self, master: &MasterKeyRecord) -> VaultResult<()> {
        self.backend.put_master(master).await
    }

    pub async fn owner_id(&self) -> VaultResult<Uuid> {
        self.backend.owner_id().await
    }
}

fn reencrypt(key: &SecretKey, blob: &CipherBlob) -> VaultResult<CipherBlob> {
    cipher::encrypt(key, &cipher::decrypt(key, blob)?)
}

fn draft_from_row(row: &ImportRow) -> Result<RecordDraft, String> {
    let kind = RecordKind::parse(&row.kind).ok_or_else(|| format!("unknown kind {:?}", row.kind))?;

    if row.title.trim().is_empty() {
        return Err("title must not be empty".into());
    }

    match kind {
        RecordKind::Site => Ok(RecordDraft::Site {
            title: row.title.clone(),
            url: row.url.clone().unwrap_or_default(),
            notes: row.notes.clone().unwrap_or_default(),
            tags: Default::default(),
        }),
        RecordKind::Credential => {
            let username = row
                .username
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or("credential row needs a username")?;
            let password = row
                .password
                .clone()
                .filter(|p| !p.is_empty())
                .ok_or("credential row needs a password")?;
            Ok(RecordDraft::Credential {
                title: row.title.clone(),
                username,
                password,
                url: row.url.clone(),
                tags: Default::default(),
            })
        }
        RecordKind::Document => Ok(RecordDraft::Document {
            title: row.title.clone(),
            attachment: None,
            notes: row.notes.clone().unwrap_or_default(),
            tags: Default::default(),
        }),
    }
}


#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;
    use crate::kdf::{derive_key, generate_salt, KdfParams};
    use crate::models::{ImportRow, RecordDraft, RecordPatch, SecretPatch};

    fn test_key() -> SecretKey {
        derive_key("pw", &generate_salt(), &KdfParams::insecure_test_params()).unwrap()
    }

    async fn store() -> (RecordStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = KvBackend::open(&dir.path().join("kv")).unwrap();
        (RecordStore::new(Box::new(backend)), dir)
    }

    fn credential_draft(title: &str) -> RecordDraft {
        RecordDraft::Credential {
            title: title.into(),
            username: "alice".into(),
            password: "p@ss".into(),
            url: None,
            tags: BTreeSet::new(),
        }
    }

    fn site_draft(title: &str) -> RecordDraft {
        RecordDraft::Site {
            title: title.into(),
            url: "https://example.com".into(),
            notes: String::new(),
            tags: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn add_encrypts_credential_fields() {
        let (store, _dir) = store().await;
        let key = test_key();

        let record = store
            .add(credential_draft("Bank"), Some(&key))
            .await
            .unwrap();

        // Nothing plaintext in the persisted body
        let raw = serde_json::to_string(&record).unwrap();
        assert!(!raw.contains("alice"));
        assert!(!raw.contains("p@ss"));

        let secrets = store.read_credential(record.id, &key).await.unwrap();
        assert_eq!(secrets.username, "alice");
        assert_eq!(secrets.password, "p@ss");
    }

    #[tokio::test]
    async fn add_credential_without_key_fails_locked() {
        let (store, _dir) = store().await;
        let result = store.add(credential_draft("Bank"), None).await;
        assert!(matches!(result, Err(VaultError::Locked)));
    }

    #[tokio::test]
    async fn order_is_monotonic_per_kind_even_after_deletion() {
        let (store, _dir) = store().await;
        let key = test_key();

        let mut orders = Vec::new();
        for i in 0..4 {
            let record = store.add(site_draft(&format!("site-{i}")), None).await.unwrap();
            orders.push((record.id, record.order));
        }

        // Delete the record holding the highest order
        let (last_id, max_order) = *orders.last().unwrap();
        store.remove(last_id).await.unwrap();

        let next = store.add(site_draft("late"), None).await.unwrap();
        assert!(next.order > max_order);

        // Other kinds count independently
        let cred = store.add(credential_draft("Bank"), Some(&key)).await.unwrap();
        assert_eq!(cred.order, 1);
    }

    #[tokio::test]
    async fn update_reencrypts_only_changed_fields() {
        let (store, _dir) = store().await;
        let key = test_key();

        let record = store.add(credential_draft("Bank"), Some(&key)).await.unwrap();
        let original_blobs = match &record.body {
            RecordBody::Credential {
                username, password, ..
            } => (username.clone(), password.clone()),
            _ => unreachable!(),
        };

        let patch = RecordPatch {
            secrets: SecretPatch {
                password: Some("n3w".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let updated = store.update(record.id, patch, Some(&key)).await.unwrap();

        match &updated.body {
            RecordBody::Credential {
                username, password, ..
            } => {
                assert_eq!(username, &original_blobs.0);
                assert_ne!(password, &original_blobs.1);
            }
            _ => unreachable!(),
        }

        let secrets = store.read_credential(record.id, &key).await.unwrap();
        assert_eq!(secrets.username, "alice");
        assert_eq!(secrets.password, "n3w");
    }

    #[tokio::test]
    async fn secret_patch_on_site_record_is_rejected() {
        let (store, _dir) = store().await;
        let record = store.add(site_draft("wiki"), None).await.unwrap();

        let patch = RecordPatch {
            secrets: SecretPatch {
                password: Some("nope".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = store.update(record.id, patch, Some(&test_key())).await;
        assert!(matches!(result, Err(VaultError::Patch(_))));
    }

    #[tokio::test]
    async fn duplicate_reencrypts_under_fresh_nonces() {
        let (store, _dir) = store().await;
        let key = test_key();

        let original = store.add(credential_draft("Bank"), Some(&key)).await.unwrap();
        let copy = store.duplicate(original.id, Some(&key)).await.unwrap();

        assert_eq!(copy.title, "Bank (copy)");
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.tags, original.tags);
        assert!(copy.order > original.order);

        // Fresh ciphertext, same plaintext
        match (&original.body, &copy.body) {
            (
                RecordBody::Credential {
                    password: original_pw,
                    ..
                },
                RecordBody::Credential { password: copy_pw, .. },
            ) => assert_ne!(original_pw, copy_pw),
            _ => unreachable!(),
        }
        let secrets = store.read_credential(copy.id, &key).await.unwrap();
        assert_eq!(secrets.password, "p@ss");
    }

    #[tokio::test]
    async fn bulk_import_dry_run_has_no_side_effects() {
        let (store, _dir) = store().await;
        let key = test_key();

        let rows = vec![
            ImportRow {
                kind: "credential".into(),
                title: "Mail".into(),
                username: Some("bob".into()),
                password: Some("secret".into()),
                ..Default::default()
            },
            ImportRow {
                kind: "site".into(),
                title: "Wiki".into(),
                url: Some("https://wiki".into()),
                ..Default::default()
            },
            ImportRow {
                kind: "credential".into(),
                title: "Broken".into(),
                // no username/password
                ..Default::default()
            },
        ];

        let report = store.bulk_import(&rows, true, Some(&key)).await.unwrap();
        assert_eq!(report.imported.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row, 2);
        assert!(store.list(None).await.unwrap().is_empty());

        let report = store.bulk_import(&rows, false, Some(&key)).await.unwrap();
        assert_eq!(report.imported.len(), 2);
        assert_eq!(store.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn remove_tag_everywhere_strips_all_references() {
        let (store, _dir) = store().await;

        let tag = store.add_tag(Tag::new("work", "#00ff00")).await.unwrap();
        let other = store.add_tag(Tag::new("home", "#0000ff")).await.unwrap();

        let mut tagged_ids = Vec::new();
        for i in 0..3 {
            let record = store.add(site_draft(&format!("site-{i}")), None).await.unwrap();
            let patch = RecordPatch {
                tags: Some([tag.id, other.id].into_iter().collect()),
                ..Default::default()
            };
            store.update(record.id, patch, None).await.unwrap();
            tagged_ids.push(record.id);
        }

        store.remove_tag_everywhere(tag.id).await.unwrap();

        assert_eq!(store.list_tags().await.unwrap().len(), 1);
        for id in tagged_ids {
            let record = store.get(id).await.unwrap().unwrap();
            assert!(!record.tags.contains(&tag.id));
            assert!(record.tags.contains(&other.id));
        }
    }

    #[tokio::test]
    async fn remove_missing_record_reports_not_found() {
        let (store, _dir) = store().await;
        let result = store.remove(Uuid::new_v4()).await;
        assert!(matches!(result, Err(VaultError::RecordNotFound(_))));
    }
}
