//! Relational backend (SQLite via sqlx)
//!
//! Same logical schema as the key-value backend:
//! `items(id PK, kind, body, sort_order)`, `tags(id PK, name, color,
//! parent_id)`, and a `meta(key PK, value)` table for the master key
//! record, owner id, and order counters. Record bodies (ciphertext fields
//! included) are stored as JSON text. WAL journal mode and foreign keys
//! are configured at connection time.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::kdf::MasterKeyRecord;
use crate::models::{RecordKind, StoreSnapshot, Tag, VaultRecord};
use crate::store::backend::StorageBackend;

const MASTER_KEY: &str = "master";
const OWNER_KEY: &str = "owner";

fn order_key(kind: RecordKind) -> String {
    format!("order:{kind}")
}

/// SQLite-backed store
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (or create) the database at `path` and ensure the schema
    pub async fn open(path: &Path) -> VaultResult<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        // Single connection: the vault is a single-writer store
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        for statement in [
            "CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                sort_order INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                parent_id TEXT
            )",
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ] {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> VaultResult<VaultRecord> {
        let body: String = row.try_get("body")?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, id: Uuid) -> VaultResult<Option<VaultRecord>> {
        let row = sqlx::query("SELECT body FROM items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn put(&self, record: &VaultRecord) -> VaultResult<()> {
        let body = serde_json::to_string(record)?;
        sqlx::query(
            "INSERT INTO items (id, kind, body, sort_order) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 kind = excluded.kind,
                 body = excluded.body,
                 sort_order = excluded.sort_order",
        )
        .bind(record.id.to_string())
        .bind(record.kind().as_str())
        .bind(body)
        .bind(record.order as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bulk_put(&self, records: &[VaultRecord]) -> VaultResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let body = serde_json::to_string(record)?;
            sqlx::query(
                "INSERT INTO items (id, kind, body, sort_order) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     kind = excluded.kind,
                     body = excluded.body,
                     sort_order = excluded.sort_order",
            )
            .bind(record.id.to_string())
            .bind(record.kind().as_str())
            .bind(body)
            .bind(record.order as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> VaultResult<()> {
        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[Uuid]) -> VaultResult<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM items WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query_by_kind(&self, kind: Option<RecordKind>) -> VaultResult<Vec<VaultRecord>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query("SELECT body FROM items WHERE kind = ? ORDER BY sort_order")
                    .bind(kind.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT body FROM items ORDER BY sort_order")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn get_tag(&self, id: Uuid) -> VaultResult<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, color, parent_id FROM tags WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| tag_from_row(&row)).transpose()
    }

    async fn put_tag(&self, tag: &Tag) -> VaultResult<()> {
        sqlx::query(
            "INSERT INTO tags (id, name, color, parent_id) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 color = excluded.color,
                 parent_id = excluded.parent_id",
        )
        .bind(tag.id.to_string())
        .bind(&tag.name)
        .bind(&tag.color)
        .bind(tag.parent_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tags(&self) -> VaultResult<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name, color, parent_id FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(tag_from_row).collect()
    }

    async fn remove_tag_with_records(
        &self,
        tag_id: Uuid,
        updated: &[VaultRecord],
    ) -> VaultResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in updated {
            let body = serde_json::to_string(record)?;
            sqlx::query("UPDATE items SET body = ? WHERE id = ?")
                .bind(body)
                .bind(record.id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(tag_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn master(&self) -> VaultResult<Option<MasterKeyRecord>> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?")
            .bind(MASTER_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&value)?))
            }
            None => Ok(None),
        }
    }

    async fn put_master(&self, master: &MasterKeyRecord) -> VaultResult<()> {
        let value = serde_json::to_string(master)?;
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(MASTER_KEY)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn next_order(&self, kind: RecordKind) -> VaultResult<u64> {
        let key = order_key(kind);
        let mut tx = self.pool.begin().await?;

        let current: u64 = match sqlx::query("SELECT value FROM meta WHERE key = ?")
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(row) => {
                let value: String = row.try_get("value")?;
                value
                    .parse()
                    .map_err(|_| VaultError::Storage(format!("corrupt order counter {key}")))?
            }
            None => 0,
        };

        let next = current + 1;
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(&key)
        .bind(next.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(next)
    }

    async fn order_counters(&self) -> VaultResult<BTreeMap<RecordKind, u64>> {
        let rows = sqlx::query("SELECT key, value FROM meta WHERE key LIKE 'order:%'")
            .fetch_all(&self.pool)
            .await?;

        let mut counters = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("key")?;
            let value: String = row.try_get("value")?;
            let kind = key
                .strip_prefix("order:")
                .and_then(RecordKind::parse)
                .ok_or_else(|| VaultError::Storage(format!("corrupt order counter key {key}")))?;
            let counter = value
                .parse()
                .map_err(|_| VaultError::Storage(format!("corrupt order counter {key}")))?;
            counters.insert(kind, counter);
        }
        Ok(counters)
    }

    async fn replace_all(&self, snapshot: &StoreSnapshot) -> VaultResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM items").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM tags").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM meta WHERE key LIKE 'order:%'")
            .execute(&mut *tx)
            .await?;

        for record in &snapshot.contents.records {
            let body = serde_json::to_string(record)?;
            sqlx::query("INSERT INTO items (id, kind, body, sort_order) VALUES (?, ?, ?, ?)")
                .bind(record.id.to_string())
                .bind(record.kind().as_str())
                .bind(body)
                .bind(record.order as i64)
                .execute(&mut *tx)
                .await?;
        }

        for tag in &snapshot.contents.tags {
            sqlx::query("INSERT INTO tags (id, name, color, parent_id) VALUES (?, ?, ?, ?)")
                .bind(tag.id.to_string())
                .bind(&tag.name)
                .bind(&tag.color)
                .bind(tag.parent_id.map(|id| id.to_string()))
                .execute(&mut *tx)
                .await?;
        }

        for (kind, counter) in &snapshot.contents.counters {
            sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
                .bind(order_key(*kind))
                .bind(counter.to_string())
                .execute(&mut *tx)
                .await?;
        }

        let master = serde_json::to_string(&snapshot.master)?;
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(MASTER_KEY)
        .bind(master)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn owner_id(&self) -> VaultResult<Uuid> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?")
            .bind(OWNER_KEY)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            let value: String = row.try_get("value")?;
            return value
                .parse()
                .map_err(|e| VaultError::Storage(format!("corrupt owner id: {e}")));
        }

        let owner = Uuid::new_v4();
        sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
            .bind(OWNER_KEY)
            .bind(owner.to_string())
            .execute(&self.pool)
            .await?;
        Ok(owner)
    }
}

fn tag_from_row(row: &sqlx::sqlite::SqliteRow) -> VaultResult<Tag> {
    let id: String = row.try_get("id")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    Ok(Tag {
        id: id
            .parse()
            .map_err(|e| VaultError::Storage(format!("corrupt tag id: {e}")))?,
        name: row.try_get("name")?,
        color: row.try_get("color")?,
        parent_id: parent_id
            .map(|p| p.parse())
            .transpose()
            .map_err(|e| VaultError::Storage(format!("corrupt tag parent id: {e}")))?,
    })
}
