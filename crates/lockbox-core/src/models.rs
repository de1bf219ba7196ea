//! Data models for vault records, tags, and snapshots

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cipher::CipherBlob;
use crate::kdf::MasterKeyRecord;

/// Record kinds. Doubles as the storage query key.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum RecordKind {
    Site,
    Credential,
    Document,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Site => "site",
            RecordKind::Credential => "credential",
            RecordKind::Document => "document",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "site" => Some(RecordKind::Site),
            "credential" => Some(RecordKind::Credential),
            "document" => Some(RecordKind::Document),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant-specific record payload.
///
/// Credential secret fields are ciphertext blobs, never plaintext, at rest.
/// Exhaustive matching at every boundary makes it impossible to, say,
/// encrypt a Document's non-existent password field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum RecordBody {
    Site {
        url: String,
        notes: String,
    },
    Credential {
        username: CipherBlob,
        password: CipherBlob,
        url: Option<CipherBlob>,
    },
    Document {
        attachment: Option<NoteAttachment>,
        notes: String,
    },
}

impl RecordBody {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBody::Site { .. } => RecordKind::Site,
            RecordBody::Credential { .. } => RecordKind::Credential,
            RecordBody::Document { .. } => RecordKind::Document,
        }
    }
}

/// A vault record: common fields plus the tagged variant payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VaultRecord {
    pub id: Uuid,
    pub title: String,
    pub tags: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic per kind, never reused even after deletion
    pub order: u64,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl VaultRecord {
    pub fn kind(&self) -> RecordKind {
        self.body.kind()
    }
}

/// Organizational tag, many-to-many with records via each record's tag set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub parent_id: Option<Uuid>,
}

impl Tag {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color: color.into(),
            parent_id: None,
        }
    }
}

/// Metadata for an attachment stored by the companion note store.
///
/// The core never reads or writes the attachment bytes; the collaborator
/// calls back with exactly this shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteAttachment {
    pub rel_path: String,
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub sha256: String,
}

/// Input for creating a record. Secret fields arrive as plaintext and are
/// encrypted by the store before persistence.
#[derive(Debug, Clone)]
pub enum RecordDraft {
    Site {
        title: String,
        url: String,
        notes: String,
        tags: BTreeSet<Uuid>,
    },
    Credential {
        title: String,
        username: String,
        password: String,
        url: Option<String>,
        tags: BTreeSet<Uuid>,
    },
    Document {
        title: String,
        attachment: Option<NoteAttachment>,
        notes: String,
        tags: BTreeSet<Uuid>,
    },
}

impl RecordDraft {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordDraft::Site { .. } => RecordKind::Site,
            RecordDraft::Credential { .. } => RecordKind::Credential,
            RecordDraft::Document { .. } => RecordKind::Document,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            RecordDraft::Site { title, .. }
            | RecordDraft::Credential { title, .. }
            | RecordDraft::Document { title, .. } => title,
        }
    }
}

/// Partial update for a record. Only fields that are present are re-written;
/// secret fields are re-encrypted only when they actually change.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub tags: Option<BTreeSet<Uuid>>,
    /// Site and Document notes
    pub notes: Option<String>,
    /// Site plaintext URL
    pub url: Option<String>,
    /// Document attachment metadata (`Some(None)` clears it)
    pub attachment: Option<Option<NoteAttachment>>,
    /// Credential secret fields, plaintext in
    pub secrets: SecretPatch,
}

/// Plaintext updates to a credential's secret fields
#[derive(Debug, Clone, Default)]
pub struct SecretPatch {
    pub username: Option<String>,
    pub password: Option<String>,
    /// `Some(None)` clears the stored URL
    pub url: Option<Option<String>>,
}

impl SecretPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.url.is_none()
    }
}

/// One external row offered to bulk import. All fields arrive as loose
/// strings; validation happens in the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportRow {
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Result of a bulk import run
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Ids of records that were (or, in a dry run, would be) created
    pub imported: Vec<Uuid>,
    pub errors: Vec<ImportRowError>,
}

/// A rejected import row with its position in the input
#[derive(Debug, Clone)]
pub struct ImportRowError {
    pub row: usize,
    pub message: String,
}

/// Full logical vault contents: what a backup captures and a restore
/// replaces. Attachment metadata travels inside Document records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VaultSnapshot {
    pub records: Vec<VaultRecord>,
    pub tags: Vec<Tag>,
    /// Per-kind order counters, preserved so order stays monotonic across
    /// backup and restore
    pub counters: BTreeMap<RecordKind, u64>,
}

/// A store-level snapshot: vault contents plus the master key record.
/// The unit of atomic replacement for passphrase change and restore.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub master: MasterKeyRecord,
    pub contents: VaultSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_parses_its_own_display() {
        for kind in [RecordKind::Site, RecordKind::Credential, RecordKind::Document] {
            assert_eq!(RecordKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RecordKind::parse("note"), None);
    }

    #[test]
    fn record_body_tags_by_kind_in_json() {
        let record = VaultRecord {
            id: Uuid::new_v4(),
            title: "Home wiki".into(),
            tags: BTreeSet::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            order: 1,
            body: RecordBody::Site {
                url: "https://wiki.home".into(),
                notes: String::new(),
            },
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "site");
        assert_eq!(json["data"]["url"], "https://wiki.home");

        let back: VaultRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn snapshot_counters_serialize_with_string_keys() {
        let mut counters = BTreeMap::new();
        counters.insert(RecordKind::Credential, 7u64);

        let snapshot = VaultSnapshot {
            records: Vec::new(),
            tags: Vec::new(),
            counters,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["counters"]["Credential"], 7);
    }
}
