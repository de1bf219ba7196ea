//! The pluggable persistence interface
//!
//! One logical schema - an `items` table and a `tags` table plus a small
//! meta area - regardless of the physical engine. Implementations are
//! selected by explicit [`StorageEngine`](crate::config::StorageEngine)
//! configuration at startup; callers never learn which one is active.

use std::collections::BTreeMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::VaultResult;
use crate::kdf::MasterKeyRecord;
use crate::models::{RecordKind, StoreSnapshot, Tag, VaultRecord};

/// Persistence operations required by the record store.
///
/// Records are opaque to the backend: ciphertext fields arrive already
/// encrypted inside the serialized body. The backend's own invariants are
/// durability and the atomicity of [`replace_all`](Self::replace_all) and
/// [`remove_tag_with_records`](Self::remove_tag_with_records).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, id: Uuid) -> VaultResult<Option<VaultRecord>>;

    async fn put(&self, record: &VaultRecord) -> VaultResult<()>;

    async fn bulk_put(&self, records: &[VaultRecord]) -> VaultResult<()>;

    async fn delete(&self, id: Uuid) -> VaultResult<()>;

    async fn bulk_delete(&self, ids: &[Uuid]) -> VaultResult<()>;

    /// All records of one kind (or all kinds), ordered by `order`
    async fn query_by_kind(&self, kind: Option<RecordKind>) -> VaultResult<Vec<VaultRecord>>;

    async fn get_tag(&self, id: Uuid) -> VaultResult<Option<Tag>>;

    async fn put_tag(&self, tag: &Tag) -> VaultResult<()>;

    async fn list_tags(&self) -> VaultResult<Vec<Tag>>;

    /// Persist the tag-stripped records and delete the tag row as one
    /// atomic unit, so a dangling tag reference can never be observed.
    async fn remove_tag_with_records(
        &self,
        tag_id: Uuid,
        updated: &[VaultRecord],
    ) -> VaultResult<()>;

    async fn master(&self) -> VaultResult<Option<MasterKeyRecord>>;

    async fn put_master(&self, master: &MasterKeyRecord) -> VaultResult<()>;

    /// Advance and return the per-kind order counter. Values are never
    /// reused, even after deletion.
    async fn next_order(&self, kind: RecordKind) -> VaultResult<u64>;

    /// Current per-kind order counters (kinds that never allocated are
    /// absent)
    async fn order_counters(&self) -> VaultResult<BTreeMap<RecordKind, u64>>;

    /// Replace the entire store contents - records, tags, counters, and
    /// master key record - in one atomic commit. The terminal step of
    /// passphrase change and backup restore.
    async fn replace_all(&self, snapshot: &StoreSnapshot) -> VaultResult<()>;

    /// Installation-scoped owner id, minted on first access
    async fn owner_id(&self) -> VaultResult<Uuid>;
}
