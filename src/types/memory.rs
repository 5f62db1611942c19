use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Default number of memories returned by a search.
pub const DEFAULT_MEMORY_LIMIT: u32 = 3;

/// A fact the service remembers about a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    /// Server-side identifier, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The remembered text.
    pub memory: String,

    /// When the memory was recorded.
    ///
    /// Timestamps the client cannot parse are treated as absent.
    #[serde(
        default,
        with = "crate::utils::time::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,

    /// Relevance score from semantic search, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Ownership metadata.
    #[serde(default)]
    pub metadata: MemoryMetadata,
}

/// Metadata attached to a [`Memory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryMetadata {
    /// The user the memory belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Body of `POST /api/memories/search`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemorySearchRequest {
    /// Whose memories to search.
    pub user_id: String,

    /// Free-text query.
    pub query: String,

    /// Maximum number of results.
    pub limit: u32,
}

impl MemorySearchRequest {
    /// Create a search request with the default limit.
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query: query.into(),
            limit: DEFAULT_MEMORY_LIMIT,
        }
    }

    /// Override the result limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}
