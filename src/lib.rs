// Public modules
pub mod auth;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod credential;
pub mod error;
pub mod observability;
pub mod render;
pub mod types;
pub mod utils;

// Re-exports
pub use auth::{AuthProvider, AuthSession, SignUpOutcome, SupabaseAuth};
pub use client::MemChat;
pub use client_logger::ClientLogger;
pub use credential::{CredentialSource, NoSession, resolve_credential};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use types::*;
