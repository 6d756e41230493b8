//! Relational adapter backed by SQLite.
//!
//! `add` persists the record and its vector inside one transaction, so a
//! failure leaves nothing behind. Listing orders by `created_at` descending
//! (newest first), with `id` descending as the tie key so the order stays
//! total when two records share a timestamp.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::types::{derive_content, MemoryRecord, Message};
use crate::storage::{vector_from_bytes, vector_to_bytes, Candidate, RecordStore};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    content TEXT NOT NULL,
    messages TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_user ON records(user_id);

CREATE TABLE IF NOT EXISTS record_vectors (
    record_id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL
);
"#;

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` with schema initialized.
    pub fn open(path: impl AsRef<Path>, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(format!("create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for better concurrent read behavior
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;

        tracing::info!(path = %path.display(), "sqlite store ready");
        Ok(Self {
            conn: Mutex::new(conn),
            provider,
        })
    }

    /// Open an in-memory database for testing.
    #[cfg(test)]
    pub fn open_in_memory(provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            provider,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MemoryError::Storage(format!("connection lock poisoned: {e}")))
    }
}

impl RecordStore for SqliteStore {
    fn add(&self, messages: &[Message], user_id: &str) -> Result<String> {
        let content = derive_content(messages);
        let id = uuid::Uuid::now_v7().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        let messages_json = serde_json::to_string(messages)?;

        // Embed before touching storage: a provider fault must leave nothing
        // persisted.
        let vector = self
            .provider
            .embed(&content)
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO records (id, user_id, content, messages, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, user_id, content, messages_json, created_at],
        )?;
        tx.execute(
            "INSERT INTO record_vectors (record_id, embedding) VALUES (?1, ?2)",
            params![id, vector_to_bytes(&vector)],
        )?;
        tx.commit()?;

        tracing::debug!(%id, %user_id, "record stored");
        Ok(id)
    }

    fn list(
        &self,
        user_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<MemoryRecord>, usize)> {
        let conn = self.lock()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let total = total as usize;

        let offset = (page - 1) * page_size;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, content, messages, created_at FROM records \
             WHERE user_id = ?1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt
            .query_map(
                params![user_id, page_size as i64, offset as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, user_id, content, messages_json, created_at) in rows {
            records.push(MemoryRecord {
                id,
                user_id,
                messages: serde_json::from_str(&messages_json)?,
                content,
                created_at,
            });
        }

        Ok((records, total))
    }

    fn fetch_all_with_vectors(&self, user_id: &str) -> Result<Vec<Candidate>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.user_id, r.content, r.messages, r.created_at, v.embedding \
             FROM records r \
             LEFT JOIN record_vectors v ON v.record_id = r.id \
             WHERE r.user_id = ?1",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<Vec<u8>>>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut candidates = Vec::with_capacity(rows.len());
        for (id, user_id, content, messages_json, created_at, embedding) in rows {
            let Some(bytes) = embedding else {
                tracing::warn!(%id, "record has no vector, excluded from search");
                continue;
            };
            candidates.push(Candidate {
                record: MemoryRecord {
                    id,
                    user_id,
                    messages: serde_json::from_str(&messages_json)?,
                    content,
                    created_at,
                },
                vector: vector_from_bytes(&bytes),
            });
        }

        Ok(candidates)
    }
}

impl SqliteStore {
    /// Fetch one record by id, primarily for diagnostics and tests.
    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, user_id, content, messages, created_at FROM records WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, user_id, content, messages_json, created_at)) => Ok(Some(MemoryRecord {
                id,
                user_id,
                messages: serde_json::from_str(&messages_json)?,
                content,
                created_at,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic provider: a fixed-direction 8-dim vector derived from
    /// the text's bytes.
    struct StubProvider;

    impl EmbeddingProvider for StubProvider {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let mut v = vec![0.0f32; 8];
            for (i, b) in text.bytes().enumerate() {
                v[i % 8] += b as f32;
            }
            Ok(v)
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    /// Provider that always fails, for the no-partial-write contract.
    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("model unavailable")
        }
    }

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory(Arc::new(StubProvider)).unwrap()
    }

    fn msg(content: &str) -> Vec<Message> {
        vec![Message::new("user", content)]
    }

    #[test]
    fn add_persists_record_and_vector() {
        let store = test_store();
        let id = store.add(&msg("use list comprehensions"), "u1").unwrap();

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.content, "use list comprehensions");
        assert_eq!(record.messages, msg("use list comprehensions"));

        let candidates = store.fetch_all_with_vectors("u1").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].record.id, id);
        assert_eq!(candidates[0].vector.len(), 8);
    }

    #[test]
    fn add_derives_content_from_all_messages() {
        let store = test_store();
        let messages = vec![
            Message::new("user", "first"),
            Message::new("assistant", "second"),
        ];
        let id = store.add(&messages, "u1").unwrap();
        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.content, "first\nsecond");
        assert_eq!(record.messages, messages);
    }

    #[test]
    fn embedding_fault_persists_nothing() {
        let store = SqliteStore::open_in_memory(Arc::new(FailingProvider)).unwrap();
        let err = store.add(&msg("anything"), "u1").unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(_)));

        let (records, total) = store.list("u1", 1, 10).unwrap();
        assert!(records.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn list_orders_newest_first() {
        let store = test_store();
        let first = store.add(&msg("oldest"), "u1").unwrap();
        let second = store.add(&msg("middle"), "u1").unwrap();
        let third = store.add(&msg("newest"), "u1").unwrap();

        let (records, total) = store.list("u1", 1, 10).unwrap();
        assert_eq!(total, 3);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![third.as_str(), second.as_str(), first.as_str()]);
    }

    #[test]
    fn list_slices_pages() {
        let store = test_store();
        for i in 0..5 {
            store.add(&msg(&format!("record {i}")), "u1").unwrap();
        }

        let (page1, total) = store.list("u1", 1, 2).unwrap();
        let (page2, _) = store.list("u1", 2, 2).unwrap();
        let (page3, _) = store.list("u1", 3, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert_eq!(page3.len(), 1);

        let (page4, _) = store.list("u1", 4, 2).unwrap();
        assert!(page4.is_empty());
    }

    #[test]
    fn list_is_scoped_to_user() {
        let store = test_store();
        store.add(&msg("mine"), "u1").unwrap();
        store.add(&msg("theirs"), "u2").unwrap();

        let (records, total) = store.list("u1", 1, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].content, "mine");
    }

    #[test]
    fn fetch_all_is_scoped_to_user() {
        let store = test_store();
        store.add(&msg("mine"), "u1").unwrap();
        store.add(&msg("theirs"), "u2").unwrap();

        let candidates = store.fetch_all_with_vectors("u1").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].record.content, "mine");
    }

    #[test]
    fn fetch_all_empty_user_returns_empty() {
        let store = test_store();
        assert!(store.fetch_all_with_vectors("nobody").unwrap().is_empty());
    }

    #[test]
    fn vectorless_record_is_excluded_from_candidates() {
        let store = test_store();
        let id = store.add(&msg("will lose its vector"), "u1").unwrap();
        store.add(&msg("intact"), "u1").unwrap();

        store
            .lock()
            .unwrap()
            .execute("DELETE FROM record_vectors WHERE record_id = ?1", params![id])
            .unwrap();

        let candidates = store.fetch_all_with_vectors("u1").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].record.content, "intact");

        // Still visible to list — only search loses it.
        let (_, total) = store.list("u1", 1, 10).unwrap();
        assert_eq!(total, 2);
    }
}
