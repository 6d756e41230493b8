//! Fault taxonomy for the memory store.
//!
//! Every public operation either fully succeeds or returns exactly one of
//! these faults. Nothing is retried or suppressed internally.

/// Errors surfaced by the memory store and its adapters.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Malformed input, rejected before any I/O.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The embedding provider failed. For `add` this means nothing was
    /// persisted; for `search` nothing was read.
    #[error("embedding provider failed: {0}")]
    Embedding(String),

    /// The persistence substrate rejected a read or write.
    #[error("storage fault: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("record encoding: {e}"))
    }
}

impl From<redb::DatabaseError> for MemoryError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TransactionError> for MemoryError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TableError> for MemoryError {
    fn from(e: redb::TableError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for MemoryError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for MemoryError {
    fn from(e: redb::CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}
