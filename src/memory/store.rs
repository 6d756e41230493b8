//! The public facade over an adapter and an embedding provider.
//!
//! [`MemoryStore`] exposes the three operations — `add`, `get_all`,
//! `search` — and normalizes their result shape so callers cannot tell
//! which backend served them. All input validation happens here, before
//! any I/O.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::paginate::paginate;
use crate::memory::rank::rank;
use crate::memory::types::{ListResponse, MemoryEnvelope, MemoryRecord, Message, SearchResponse};
use crate::storage::RecordStore;

/// Facade composing a storage adapter with the shared embedding provider.
pub struct MemoryStore {
    store: Box<dyn RecordStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl MemoryStore {
    pub fn new(store: Box<dyn RecordStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Store a new memory derived from `messages`. Returns the record id.
    pub fn add(&self, messages: &[Message], user_id: &str) -> Result<String> {
        if messages.is_empty() {
            return Err(MemoryError::Validation(
                "messages must not be empty".into(),
            ));
        }

        let id = self.store.add(messages, user_id)?;
        tracing::debug!(%user_id, %id, "memory added");
        Ok(id)
    }

    /// List the user's memories, one page at a time, in the backend's
    /// ordering.
    pub fn get_all(&self, user_id: &str, page: usize, page_size: usize) -> Result<ListResponse> {
        if page == 0 {
            return Err(MemoryError::Validation("page must be >= 1".into()));
        }
        if page_size == 0 {
            return Err(MemoryError::Validation("page_size must be >= 1".into()));
        }

        let (records, total) = self.store.list(user_id, page, page_size)?;
        Ok(ListResponse {
            results: envelope(records),
            pagination: paginate(total, page, page_size),
        })
    }

    /// Rank the user's memories by similarity to `query` and return at most
    /// `limit` of them, most similar first.
    pub fn search(&self, query: &str, user_id: &str, limit: usize) -> Result<SearchResponse> {
        if limit == 0 {
            return Err(MemoryError::Validation("limit must be >= 1".into()));
        }

        // One embedding per search, shared across every candidate comparison.
        let query_vector = self
            .provider
            .embed(query)
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        let candidates = self.store.fetch_all_with_vectors(user_id)?;
        tracing::debug!(%user_id, candidates = candidates.len(), "ranking search candidates");

        Ok(SearchResponse {
            results: envelope(rank(&query_vector, candidates, limit)),
        })
    }
}

fn envelope(records: Vec<MemoryRecord>) -> Vec<MemoryEnvelope> {
    records
        .into_iter()
        .map(|memory| MemoryEnvelope { memory })
        .collect()
}
