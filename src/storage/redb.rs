//! Key-value adapter backed by redb.
//!
//! Mirrors the layout a single-key-per-value store forces: a record value, a
//! vector value, and a per-user id-index entry, each written in its own
//! commit. There is no cross-commit atomicity — a crash between commits can
//! leave an orphaned record (stored but unindexed, invisible to every read)
//! or a vectorless record (indexed but unsearchable until repaired). The
//! write order puts the record first and the index last so each partial
//! state is the most recoverable one.
//!
//! Listing orders by lexicographic record id, the index table's native key
//! order. With UUID v7 ids that coincides with creation order ascending —
//! a materially different contract from the relational adapter's
//! newest-first. Callers must not assume the two backends order alike.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::types::{derive_content, MemoryRecord, Message};
use crate::storage::{vector_from_bytes, vector_to_bytes, Candidate, RecordStore};

const RECORDS: TableDefinition<'static, (&'static str, &'static str), &'static [u8]> =
    TableDefinition::new("records");
const VECTORS: TableDefinition<'static, (&'static str, &'static str), &'static [u8]> =
    TableDefinition::new("vectors");
const USER_INDEX: TableDefinition<'static, (&'static str, &'static str), ()> =
    TableDefinition::new("user_index");

/// Upper bound for a per-user key range scan; record ids are ASCII.
const ID_RANGE_END: &str = "\u{7f}";

/// redb-backed record store.
pub struct RedbStore {
    db: Database,
    provider: Arc<dyn EmbeddingProvider>,
}

impl RedbStore {
    /// Open (or create) the database at `path` with all tables created.
    pub fn open(path: impl AsRef<Path>, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(format!("create {}: {e}", parent.display())))?;
        }

        let db = Database::create(path)?;

        // Create all tables up front so read transactions never race table
        // creation.
        let txn = db.begin_write()?;
        {
            txn.open_table(RECORDS)?;
            txn.open_table(VECTORS)?;
            txn.open_table(USER_INDEX)?;
        }
        txn.commit()?;

        tracing::info!(path = %path.display(), "redb store ready");
        Ok(Self { db, provider })
    }

    /// All record ids for `user_id`, in lexicographic (key) order.
    fn user_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(USER_INDEX)?;

        let mut ids = Vec::new();
        for entry in index.range((user_id, "")..(user_id, ID_RANGE_END))? {
            let (key, _) = entry?;
            ids.push(key.value().1.to_string());
        }
        Ok(ids)
    }
}

impl RecordStore for RedbStore {
    fn add(&self, messages: &[Message], user_id: &str) -> Result<String> {
        let content = derive_content(messages);
        let id = uuid::Uuid::now_v7().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        let record = MemoryRecord {
            id: id.clone(),
            user_id: user_id.to_string(),
            messages: messages.to_vec(),
            content: content.clone(),
            created_at,
        };
        let record_json = serde_json::to_vec(&record)?;

        // Embed before the first write: a provider fault must leave nothing
        // persisted.
        let vector = self
            .provider
            .embed(&content)
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        // Three independent commits. A crash after the first leaves an
        // orphaned record; after the second, an unindexed record+vector;
        // only the third makes the record visible.
        let txn = self.db.begin_write()?;
        {
            let mut records = txn.open_table(RECORDS)?;
            records.insert((user_id, id.as_str()), record_json.as_slice())?;
        }
        txn.commit()?;

        let txn = self.db.begin_write()?;
        {
            let mut vectors = txn.open_table(VECTORS)?;
            vectors.insert((user_id, id.as_str()), vector_to_bytes(&vector).as_slice())?;
        }
        txn.commit()?;

        let txn = self.db.begin_write()?;
        {
            let mut index = txn.open_table(USER_INDEX)?;
            index.insert((user_id, id.as_str()), ())?;
        }
        txn.commit()?;

        tracing::debug!(%id, %user_id, "record stored");
        Ok(id)
    }

    fn list(
        &self,
        user_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<MemoryRecord>, usize)> {
        let ids = self.user_ids(user_id)?;
        let total = ids.len();

        let start = (page - 1) * page_size;
        let page_ids = ids.iter().skip(start).take(page_size);

        let txn = self.db.begin_read()?;
        let records_table = txn.open_table(RECORDS)?;

        let mut records = Vec::new();
        for id in page_ids {
            match records_table.get((user_id, id.as_str()))? {
                Some(value) => records.push(serde_json::from_slice(value.value())?),
                None => {
                    tracing::warn!(%id, "indexed record missing from store, skipped");
                }
            }
        }

        Ok((records, total))
    }

    fn fetch_all_with_vectors(&self, user_id: &str) -> Result<Vec<Candidate>> {
        let ids = self.user_ids(user_id)?;

        let txn = self.db.begin_read()?;
        let records_table = txn.open_table(RECORDS)?;
        let vectors_table = txn.open_table(VECTORS)?;

        let mut candidates = Vec::with_capacity(ids.len());
        for id in &ids {
            let key = (user_id, id.as_str());
            let Some(record_value) = records_table.get(key)? else {
                tracing::warn!(%id, "indexed record missing from store, skipped");
                continue;
            };
            let Some(vector_value) = vectors_table.get(key)? else {
                tracing::warn!(%id, "record has no vector, excluded from search");
                continue;
            };
            candidates.push(Candidate {
                record: serde_json::from_slice(record_value.value())?,
                vector: vector_from_bytes(vector_value.value()),
            });
        }

        Ok(candidates)
    }
}
