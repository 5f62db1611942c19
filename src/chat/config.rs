//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration used to build the auth provider and the API client. Values
//! left unset fall back to the `MEMCHAT_*` environment variables read by
//! [`MemChat`] and [`SupabaseAuth`].

use std::sync::Arc;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::auth::SupabaseAuth;
use crate::client::MemChat;
use crate::credential::CredentialSource;
use crate::error::Result;

/// Command-line arguments for the memchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the chat service.
    #[arrrg(optional, "Chat service URL (default: $MEMCHAT_API_URL or http://localhost:8000)", "URL")]
    pub api_url: Option<String>,

    /// Fallback bearer token.
    #[arrrg(optional, "Token used when not signed in (default: $MEMCHAT_API_TOKEN)", "TOKEN")]
    pub api_token: Option<String>,

    /// Base URL of the auth provider.
    #[arrrg(optional, "Auth provider URL (default: $MEMCHAT_AUTH_URL)", "URL")]
    pub auth_url: Option<String>,

    /// Public (anon) key of the auth provider.
    #[arrrg(optional, "Auth provider anon key (default: $MEMCHAT_AUTH_KEY)", "KEY")]
    pub auth_key: Option<String>,

    /// Request timeout for the chat service.
    #[arrrg(optional, "Chat request timeout in seconds (default: 60)", "SECONDS")]
    pub timeout: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat application.
///
/// `None` means "use the environment, then the built-in default".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Base URL of the chat service.
    pub api_url: Option<String>,

    /// Bearer token used when no provider session is live.
    pub api_token: Option<String>,

    /// Base URL of the auth provider.
    pub auth_url: Option<String>,

    /// Public (anon) key of the auth provider.
    pub auth_key: Option<String>,

    /// Timeout for chat service requests.
    pub timeout: Option<Duration>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig that defers everything to the environment.
    pub fn new() -> Self {
        Self {
            api_url: None,
            api_token: None,
            auth_url: None,
            auth_key: None,
            timeout: None,
            use_color: true,
        }
    }

    /// Sets the chat service URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Sets the fallback bearer token.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the auth provider URL and anon key.
    pub fn with_auth(mut self, url: impl Into<String>, key: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self.auth_key = Some(key.into());
        self
    }

    /// Sets the chat request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Builds the auth provider.
    pub fn auth_provider(&self) -> Result<SupabaseAuth> {
        SupabaseAuth::new(self.auth_url.clone(), self.auth_key.clone())
    }

    /// Builds the chat service client on top of a credential source.
    pub fn client(&self, credentials: Arc<dyn CredentialSource>) -> Result<MemChat> {
        MemChat::with_options(
            self.api_url.clone(),
            self.api_token.clone(),
            self.timeout,
            credentials,
        )
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        ChatConfig {
            api_url: args.api_url,
            api_token: args.api_token,
            auth_url: args.auth_url,
            auth_key: args.auth_key,
            timeout: args.timeout.map(Duration::from_secs),
            use_color: !args.no_color,
        }
    }
}
