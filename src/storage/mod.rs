//! Persistence adapters.
//!
//! [`RecordStore`] is the contract both substrates implement; the facade
//! depends on this trait alone, never on a concrete backend. Business logic
//! goes through the trait — no direct database calls elsewhere.
//!
//! The two implementations differ in ways the contract deliberately exposes
//! rather than papers over:
//!
//! - **Durability of `add`**: [`sqlite::SqliteStore`] writes record and
//!   vector in one transaction; [`redb::RedbStore`] makes three independent
//!   commits and can be left partially written by a crash.
//! - **Ordering of `list`**: SQLite orders by creation time, newest first;
//!   redb orders by lexicographic record id. Both orders are stable and
//!   total within a call, but callers must not assume they are equivalent.

pub mod redb;
pub mod sqlite;

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::types::{MemoryRecord, Message};

/// A (record, vector) pair considered during a search call.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: MemoryRecord,
    pub vector: Vec<f32>,
}

/// Contract every persistence backend satisfies.
///
/// Input validation happens in the facade before any adapter call; adapters
/// may assume non-empty `messages` and 1-based `page` inputs.
pub trait RecordStore: Send + Sync {
    /// Derive content from `messages`, embed it, and persist the new record
    /// with its vector. Returns the generated record id.
    fn add(&self, messages: &[Message], user_id: &str) -> Result<String>;

    /// Return the records on `page` (1-indexed, `page_size` per page) in this
    /// backend's ordering, plus the user's total record count.
    fn list(&self, user_id: &str, page: usize, page_size: usize)
        -> Result<(Vec<MemoryRecord>, usize)>;

    /// Every record for the user together with its vector, in no particular
    /// order. Records missing their vector are skipped with a warning.
    fn fetch_all_with_vectors(&self, user_id: &str) -> Result<Vec<Candidate>>;
}

/// Construct the adapter selected by `config.backend`, injecting the shared
/// embedding provider.
pub fn create_store(
    config: &StorageConfig,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<Box<dyn RecordStore>> {
    match config.backend.as_str() {
        "sqlite" => {
            let path = crate::config::expand_tilde(&config.sqlite_path);
            Ok(Box::new(sqlite::SqliteStore::open(path, provider)?))
        }
        "redb" => {
            let path = crate::config::expand_tilde(&config.redb_path);
            Ok(Box::new(redb::RedbStore::open(path, provider)?))
        }
        other => Err(MemoryError::Validation(format!(
            "unknown storage backend: {other}. Supported: sqlite, redb"
        ))),
    }
}

/// Encode a vector as little-endian f32 bytes for storage.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for x in vector {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

/// Decode a stored vector. Trailing bytes that do not form a full f32 are
/// ignored.
pub fn vector_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
