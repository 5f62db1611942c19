use serde::{Deserialize, Serialize};

/// Body returned by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Free-form status string; the service reports `"ok"` when healthy.
    pub status: String,
}

impl HealthStatus {
    /// Returns true if the service reported itself healthy.
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// Body returned by `DELETE /api/memories/{userId}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearMemoriesResponse {
    /// Whether the service deleted the memories.
    pub success: bool,
}
