//! Bearer credential resolution for outbound API calls.
//!
//! The chat service accepts either the identity provider's access token or a
//! statically configured token. The provider token wins whenever one is live.
//! Resolution happens on every request because provider tokens expire and
//! rotate while a conversation is in progress.

/// Something that can report the identity provider's current access token.
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync {
    /// The live session token, or `None` when there is no usable session.
    async fn session_token(&self) -> Option<String>;
}

/// A source that never has a session; every request uses the fallback token.
///
/// ```
/// # use memchat::{CredentialSource, NoSession};
/// # tokio_test::block_on(async {
/// assert!(NoSession.session_token().await.is_none());
/// # });
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSession;

#[async_trait::async_trait]
impl CredentialSource for NoSession {
    async fn session_token(&self) -> Option<String> {
        None
    }
}

/// Picks the bearer token for a single request.
///
/// ```
/// # use memchat::resolve_credential;
/// assert_eq!(resolve_credential(Some("jwt"), "static"), "jwt");
/// assert_eq!(resolve_credential(None, "static"), "static");
/// assert_eq!(resolve_credential(Some(""), "static"), "static");
/// ```
pub fn resolve_credential(session_token: Option<&str>, fallback: &str) -> String {
    match session_token {
        Some(token) if !token.trim().is_empty() => token.to_string(),
        _ => fallback.to_string(),
    }
}
