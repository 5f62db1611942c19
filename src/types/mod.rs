// Public modules
pub mod chat_message;
pub mod chat_request;
pub mod health_status;
pub mod memory;
pub mod stored_message;
pub mod user_identity;

// Re-exports
pub use chat_message::{ChatMessage, Role};
pub use chat_request::{ChatRequest, ChatResponse};
pub use health_status::{ClearMemoriesResponse, HealthStatus};
pub use memory::{DEFAULT_MEMORY_LIMIT, Memory, MemoryMetadata, MemorySearchRequest};
pub use stored_message::{StoredMessage, StoredMessageBody, StoredMessageKind};
pub use user_identity::UserIdentity;
