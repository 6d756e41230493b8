//! Core data model: messages, records, and the response envelopes shared by
//! both storage backends.

use serde::{Deserialize, Serialize};

use crate::memory::paginate::Pagination;

/// One conversational turn. Order within a record is significant and
/// preserved verbatim — messages are never deduplicated or reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A stored memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// UUID v7 (time-sortable) primary key; also the lookup key for the
    /// record's embedding.
    pub id: String,
    /// Partition key — every list/search call is scoped to one user.
    pub user_id: String,
    /// The source messages, verbatim.
    pub messages: Vec<Message>,
    /// The `content` fields of `messages` joined with newlines. Computed once
    /// at creation and stored redundantly; never recomputed.
    pub content: String,
    /// RFC 3339 creation timestamp; sort key for listing.
    pub created_at: String,
}

/// Join the content of each message with newline separators, in input order.
pub fn derive_content(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrapper around a record in a result list. Both `get_all` and `search`
/// return entries in this shape so callers handle one format.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEnvelope {
    pub memory: MemoryRecord,
}

/// Response from `get_all`.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub results: Vec<MemoryEnvelope>,
    pub pagination: Pagination,
}

/// Response from `search`. Similarity scores are used for ordering only and
/// are not exposed.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<MemoryEnvelope>,
}
