//! Glue between the identity provider and the chat session.
//!
//! `ChatApp` is what a front end drives: it decides between the sign-in view
//! and the chat view, and keeps the conversation in step with the provider's
//! login state.

use std::sync::Arc;

use crate::auth::{AuthProvider, SignUpOutcome};
use crate::chat::session::{ChatBackend, ChatSession};
use crate::error::Result;
use crate::types::UserIdentity;

/// A signed-in-or-not chat application.
pub struct ChatApp<P: AuthProvider, B: ChatBackend> {
    auth: Arc<P>,
    session: ChatSession<B>,
}

impl<P: AuthProvider, B: ChatBackend> ChatApp<P, B> {
    /// Creates a new application from a provider and a signed-out session.
    pub fn new(auth: Arc<P>, session: ChatSession<B>) -> Self {
        Self { auth, session }
    }

    /// The identity provider.
    pub fn auth(&self) -> &Arc<P> {
        &self.auth
    }

    /// The chat session.
    pub fn session(&self) -> &ChatSession<B> {
        &self.session
    }

    /// Resumes an existing provider session, if there is one.
    ///
    /// Call once at start-up to choose between the sign-in and chat views.
    pub async fn startup(&self) -> Option<UserIdentity> {
        let user = self.auth.current_user().await?;
        if self.session.snapshot().user.as_ref() != Some(&user) {
            self.session.login(user.clone());
        }
        Some(user)
    }

    /// Signs in and starts a fresh conversation.
    ///
    /// On failure the conversation state is left untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity> {
        let auth_session = self.auth.sign_in(email, password).await?;
        let user = match self.auth.current_user().await {
            Some(user) => user,
            None => auth_session.user,
        };
        self.session.login(user.clone());
        Ok(user)
    }

    /// Registers a new account.
    ///
    /// Never starts a conversation, even when the provider signs the new user
    /// in immediately; the caller signs in explicitly afterwards.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome> {
        self.auth.sign_up(email, password, full_name).await
    }

    /// Signs out and discards the conversation.
    ///
    /// If the provider refuses, the error is returned and the conversation
    /// stays as it was.
    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        self.session.logout();
        Ok(())
    }
}
