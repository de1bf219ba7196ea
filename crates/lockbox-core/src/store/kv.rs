//! Embedded key-value backend (sled)
//!
//! Trees:
//! - `items` - record id -> serialized record body
//! - `tags`  - tag id -> serialized tag
//! - `meta`  - master key record, owner id, per-kind order counters
//!
//! Multi-tree transactions back the atomic paths (`replace_all`,
//! `remove_tag_with_records`).

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use sled::{Batch, Transactional};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::kdf::MasterKeyRecord;
use crate::models::{RecordKind, StoreSnapshot, Tag, VaultRecord};
use crate::store::backend::StorageBackend;

const MASTER_KEY: &[u8] = b"master";
const OWNER_KEY: &[u8] = b"owner";

fn order_key(kind: RecordKind) -> Vec<u8> {
    format!("order:{kind}").into_bytes()
}

/// sled-backed store
pub struct KvBackend {
    items: sled::Tree,
    tags: sled::Tree,
    meta: sled::Tree,
    // Keeps the database handle alive for the trees above
    _db: sled::Db,
}

impl KvBackend {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> VaultResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            items: db.open_tree("items")?,
            tags: db.open_tree("tags")?,
            meta: db.open_tree("meta")?,
            _db: db,
        })
    }

    fn decode_record(bytes: &[u8]) -> VaultResult<VaultRecord> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn all_records(&self) -> VaultResult<Vec<VaultRecord>> {
        let mut records = Vec::new();
        for entry in self.items.iter() {
            let (_, value) = entry?;
            records.push(Self::decode_record(&value)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl StorageBackend for KvBackend {
    async fn get(&self, id: Uuid) -> VaultResult<Option<VaultRecord>> {
        match self.items.get(id.as_bytes().as_slice())? {
            Some(value) => Ok(Some(Self::decode_record(&value)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &VaultRecord) -> VaultResult<()> {
        let value = serde_json::to_vec(record)?;
        self.items.insert(record.id.as_bytes().as_slice(), value)?;
        Ok(())
    }

    async fn bulk_put(&self, records: &[VaultRecord]) -> VaultResult<()> {
        let mut batch = Batch::default();
        for record in records {
            batch.insert(record.id.as_bytes().as_slice(), serde_json::to_vec(record)?);
        }
        self.items.apply_batch(batch)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> VaultResult<()> {
        self.items.remove(id.as_bytes().as_slice())?;
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[Uuid]) -> VaultResult<()> {
        let mut batch = Batch::default();
        for id in ids {
            batch.remove(id.as_bytes().as_slice());
        }
        self.items.apply_batch(batch)?;
        Ok(())
    }

    async fn query_by_kind(&self, kind: Option<RecordKind>) -> VaultResult<Vec<VaultRecord>> {
        let mut records = self.all_records()?;
        if let Some(kind) = kind {
            records.retain(|r| r.kind() == kind);
        }
        records.sort_by_key(|r| r.order);
        Ok(records)
    }

    async fn get_tag(&self, id: Uuid) -> VaultResult<Option<Tag>> {
        match self.tags.get(id.as_bytes().as_slice())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn put_tag(&self, tag: &Tag) -> VaultResult<()> {
        let value = serde_json::to_vec(tag)?;
        self.tags.insert(tag.id.as_bytes().as_slice(), value)?;
        Ok(())
    }

    async fn list_tags(&self) -> VaultResult<Vec<Tag>> {
        let mut tags = Vec::new();
        for entry in self.tags.iter() {
            let (_, value) = entry?;
            tags.push(serde_json::from_slice::<Tag>(&value)?);
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn remove_tag_with_records(
        &self,
        tag_id: Uuid,
        updated: &[VaultRecord],
    ) -> VaultResult<()> {
        let mut item_batch = Batch::default();
        for record in updated {
            item_batch.insert(record.id.as_bytes().as_slice(), serde_json::to_vec(record)?);
        }
        let mut tag_batch = Batch::default();
        tag_batch.remove(tag_id.as_bytes().as_slice());

        (&self.items, &self.tags)
            .transaction(|(items, tags)| {
                items.apply_batch(&item_batch)?;
                tags.apply_batch(&tag_batch)?;
                Ok::<(), sled::transaction::ConflictableTransactionError<()>>(())
            })
            .map_err(|e| VaultError::Storage(format!("{e:?}")))?;
        Ok(())
    }

    async fn master(&self) -> VaultResult<Option<MasterKeyRecord>> {
        match self.meta.get(MASTER_KEY)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn put_master(&self, master: &MasterKeyRecord) -> VaultResult<()> {
        let value = serde_json::to_vec(master)?;
        self.meta.insert(MASTER_KEY, value)?;
        Ok(())
    }

    async fn next_order(&self, kind: RecordKind) -> VaultResult<u64> {
        let key = order_key(kind);
        let current = match self.meta.get(&key)? {
            Some(value) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&value);
                u64::from_be_bytes(buf)
            }
            None => 0,
        };
        let next = current + 1;
        self.meta.insert(key, next.to_be_bytes().to_vec())?;
        Ok(next)
    }

    async fn order_counters(&self) -> VaultResult<BTreeMap<RecordKind, u64>> {
        let mut counters = BTreeMap::new();
        for kind in [RecordKind::Site, RecordKind::Credential, RecordKind::Document] {
            if let Some(value) = self.meta.get(order_key(kind))? {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&value);
                counters.insert(kind, u64::from_be_bytes(buf));
            }
        }
        Ok(counters)
    }

    async fn replace_all(&self, snapshot: &StoreSnapshot) -> VaultResult<()> {
        // Stage every key outside the transaction (single-writer store),
        // then commit as one multi-tree unit.
        let mut item_batch = Batch::default();
        for entry in self.items.iter() {
            let (key, _) = entry?;
            item_batch.remove(key);
        }
        for record in &snapshot.contents.records {
            item_batch.insert(record.id.as_bytes().as_slice(), serde_json::to_vec(record)?);
        }

        let mut tag_batch = Batch::default();
        for entry in self.tags.iter() {
            let (key, _) = entry?;
            tag_batch.remove(key);
        }
        for tag in &snapshot.contents.tags {
            tag_batch.insert(tag.id.as_bytes().as_slice(), serde_json::to_vec(tag)?);
        }

        let mut meta_batch = Batch::default();
        for kind in [RecordKind::Site, RecordKind::Credential, RecordKind::Document] {
            meta_batch.remove(order_key(kind));
        }
        for (kind, counter) in &snapshot.contents.counters {
            meta_batch.insert(order_key(*kind), counter.to_be_bytes().to_vec());
        }
        meta_batch.insert(MASTER_KEY, serde_json::to_vec(&snapshot.master)?);

        (&self.items, &self.tags, &self.meta)
            .transaction(|(items, tags, meta)| {
                items.apply_batch(&item_batch)?;
                tags.apply_batch(&tag_batch)?;
                meta.apply_batch(&meta_batch)?;
                Ok::<(), sled::transaction::ConflictableTransactionError<()>>(())
            })
            .map_err(|e| VaultError::Storage(format!("{e:?}")))?;
        Ok(())
    }

    async fn owner_id(&self) -> VaultResult<Uuid> {
        if let Some(value) = self.meta.get(OWNER_KEY)? {
            return Uuid::from_slice(&value)
                .map_err(|e| VaultError::Storage(format!("corrupt owner id: {e}")));
        }
        let owner = Uuid::new_v4();
        self.meta.insert(OWNER_KEY, owner.as_bytes().as_slice())?;
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend_tests;
    use tempfile::TempDir;

    #[tokio::test]
    async fn kv_backend_contract() {
        let dir = TempDir::new().unwrap();
        let backend = KvBackend::open(&dir.path().join("kv")).unwrap();
        backend_tests::exercise_backend(&backend).await;
    }

    #[tokio::test]
    async fn owner_id_is_stable_across_reads() {
        let dir = TempDir::new().unwrap();
        let backend = KvBackend::open(&dir.path().join("kv")).unwrap();

        let first = backend.owner_id().await.unwrap();
        let second = backend.owner_id().await.unwrap();
        assert_eq!(first, second);
    }
}
