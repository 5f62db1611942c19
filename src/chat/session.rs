//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation
//! (session id, message list, input buffer, error banner) and sequences user
//! input through a [`ChatBackend`].
//!
//! The session moves between three states:
//!
//! ```text
//! Unauthenticated --login--> Idle --send--> Sending --reply/failure--> Idle
//!        ^                    |                |
//!        +-------logout-------+-------logout---+
//! ```
//!
//! Guards and mutations happen inside a single `watch` update, so at most one
//! send is in flight per session without any lock held across an `.await`.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::watch;

use crate::client::MemChat;
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_LOGINS, SESSION_SEND_FAILURES, SESSION_SENDS, SESSION_SENDS_IGNORED,
    SESSION_TURN_DURATION,
};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, HealthStatus, Memory, MemorySearchRequest,
    StoredMessage, UserIdentity,
};

/// The remote operations a chat session depends on.
///
/// [`MemChat`] is the production implementation. Every call is a single
/// attempt; implementations must not retry.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one chat turn and wait for the reply.
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// List a user's server-side conversation session ids.
    async fn get_sessions(&self, user_id: &str) -> Result<Vec<String>>;

    /// Fetch the persisted messages of a conversation session.
    async fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>>;

    /// Semantic search over a user's memories.
    async fn search_memories(&self, request: &MemorySearchRequest) -> Result<Vec<Memory>>;

    /// Delete all of a user's memories.
    async fn clear_memories(&self, user_id: &str) -> Result<bool>;

    /// Check service health.
    async fn health_check(&self) -> Result<HealthStatus>;
}

#[async_trait::async_trait]
impl ChatBackend for MemChat {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse> {
        MemChat::send_message(self, request).await
    }

    async fn get_sessions(&self, user_id: &str) -> Result<Vec<String>> {
        MemChat::get_sessions(self, user_id).await
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        MemChat::get_messages(self, session_id).await
    }

    async fn search_memories(&self, request: &MemorySearchRequest) -> Result<Vec<Memory>> {
        MemChat::search_memories(self, request).await
    }

    async fn clear_memories(&self, user_id: &str) -> Result<bool> {
        MemChat::clear_memories(self, user_id).await
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        MemChat::health_check(self).await
    }
}

/// Coarse state of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No user is signed in.
    Unauthenticated,
    /// Signed in, ready to send.
    Idle,
    /// Signed in, waiting for a reply.
    Sending,
}

/// Everything a UI needs to draw the chat view.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// The signed-in user.
    pub user: Option<UserIdentity>,
    /// The current conversation session id; present exactly when signed in.
    pub session_id: Option<String>,
    /// The conversation, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Text typed but not yet sent.
    pub input: String,
    /// True while a send is in flight.
    pub sending: bool,
    /// The last send failure, shown as a dismissible banner.
    pub error: Option<Error>,
}

impl SessionSnapshot {
    /// The coarse state this snapshot is in.
    pub fn state(&self) -> SessionState {
        match (&self.user, self.sending) {
            (None, _) => SessionState::Unauthenticated,
            (Some(_), false) => SessionState::Idle,
            (Some(_), true) => SessionState::Sending,
        }
    }

    /// Returns true if a user is signed in.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Why a send request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// The input was empty or whitespace only.
    EmptyInput,
    /// No user is signed in.
    NotSignedIn,
    /// Another send is still waiting for its reply.
    AlreadySending,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            IgnoreReason::EmptyInput => "there is nothing to send",
            IgnoreReason::NotSignedIn => "you are not signed in",
            IgnoreReason::AlreadySending => "still waiting for the previous reply",
        };
        f.write_str(reason)
    }
}

/// What a send request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing was appended and no request was made.
    Ignored(IgnoreReason),
    /// The reply was appended to the conversation.
    Replied(ChatMessage),
    /// A reply arrived after the conversation it belonged to was discarded by
    /// a logout; it was dropped.
    Stale,
}

/// A chat session that manages conversation state and API interactions.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    state: watch::Sender<SessionSnapshot>,
    minted: Mutex<HashSet<String>>,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a new, signed-out chat session on top of a backend.
    pub fn new(backend: B) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            backend,
            state,
            minted: Mutex::new(HashSet::new()),
        }
    }

    /// The backend this session talks to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Subscribe to state changes.
    ///
    /// The receiver is notified after every change; read the new state with
    /// `borrow_and_update`.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// The current coarse state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().state()
    }

    /// The current conversation session id, if signed in.
    pub fn session_id(&self) -> Option<String> {
        self.state.borrow().session_id.clone()
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.state.borrow().messages.len()
    }

    /// Starts a fresh conversation for a newly signed-in user.
    ///
    /// Mints a session id never handed out before by this session, empties
    /// the conversation and returns the new id.
    pub fn login(&self, user: UserIdentity) -> String {
        let session_id = self.mint_session_id();
        tracing::info!(user_id = %user.id, session_id = %session_id, "conversation started");
        SESSION_LOGINS.click();
        self.state.send_modify(|state| {
            *state = SessionSnapshot {
                user: Some(user),
                session_id: Some(session_id.clone()),
                ..SessionSnapshot::default()
            };
        });
        session_id
    }

    /// Discards the conversation and returns to the signed-out state.
    ///
    /// Always succeeds, whatever the current state. A send still in flight
    /// completes in the background and its reply is dropped.
    pub fn logout(&self) {
        self.state.send_modify(|state| {
            if let Some(session_id) = &state.session_id {
                tracing::info!(session_id = %session_id, "conversation discarded");
            }
            *state = SessionSnapshot::default();
        });
    }

    /// Replaces the input buffer.
    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_if_modified(|state| {
            if state.input == text {
                return false;
            }
            state.input = text;
            true
        });
    }

    /// Hides the error banner.
    pub fn dismiss_error(&self) {
        self.state
            .send_if_modified(|state| state.error.take().is_some());
    }

    /// Sends the contents of the input buffer. See [`ChatSession::send`].
    pub async fn submit(&self) -> Result<SendOutcome> {
        let input = self.state.borrow().input.clone();
        self.send(&input).await
    }

    /// Sends one message and appends the reply.
    ///
    /// When signed in, idle and `text` is not blank, this appends the trimmed
    /// text as a user message, clears the input buffer, and issues exactly one
    /// request. On success the reply is appended. On failure the user message
    /// stays, the error banner is set and the error is returned. Either way
    /// the session is idle again afterwards.
    ///
    /// Otherwise nothing changes, nothing is sent, and the outcome says why.
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        let mut ignored = None;
        let mut request = None;
        self.state.send_if_modified(|state| {
            let (user, session_id) = match (&state.user, &state.session_id) {
                (Some(user), Some(session_id)) => (user, session_id),
                _ => {
                    ignored = Some(IgnoreReason::NotSignedIn);
                    return false;
                }
            };
            if state.sending {
                ignored = Some(IgnoreReason::AlreadySending);
                return false;
            }
            if text.is_empty() {
                ignored = Some(IgnoreReason::EmptyInput);
                return false;
            }
            request = Some(ChatRequest::new(text, user.id.clone(), session_id.clone()));
            state.messages.push(ChatMessage::user(text));
            state.input.clear();
            state.sending = true;
            state.error = None;
            true
        });

        let Some(request) = request else {
            let reason = ignored.unwrap_or(IgnoreReason::NotSignedIn);
            tracing::debug!(?reason, "send ignored");
            SESSION_SENDS_IGNORED.click();
            return Ok(SendOutcome::Ignored(reason));
        };

        SESSION_SENDS.click();
        let start = Instant::now();
        let result = self.backend.send_message(&request).await;
        SESSION_TURN_DURATION.add(start.elapsed().as_secs_f64());

        let mut outcome = Ok(SendOutcome::Stale);
        self.state.send_if_modified(|state| {
            if state.session_id != request.session_id || !state.sending {
                return false;
            }
            state.sending = false;
            match &result {
                Ok(response) => {
                    if request.session_id.as_deref() != Some(response.session_id.as_str()) {
                        tracing::debug!(
                            server_session_id = %response.session_id,
                            "service filed the turn under a different session id"
                        );
                    }
                    let reply = ChatMessage::assistant(response.response.clone());
                    state.messages.push(reply.clone());
                    outcome = Ok(SendOutcome::Replied(reply));
                }
                Err(err) => {
                    state.error = Some(err.clone());
                    outcome = Err(err.clone());
                }
            }
            true
        });

        match &outcome {
            Ok(SendOutcome::Stale) => {
                tracing::debug!("reply for a discarded conversation dropped");
            }
            Err(err) => {
                SESSION_SEND_FAILURES.click();
                tracing::warn!(error = %err, "send failed");
            }
            _ => {}
        }
        outcome
    }

    /// Loads the persisted messages of the current conversation.
    ///
    /// The stored history is adopted only if the local conversation is still
    /// empty and idle when it arrives. Returns the number of messages adopted.
    pub async fn load_history(&self) -> Result<usize> {
        let session_id = self.session_id().ok_or(Error::NotSignedIn)?;
        let stored = self.backend.get_messages(&session_id).await?;
        let history: Vec<ChatMessage> = stored
            .iter()
            .filter_map(StoredMessage::to_chat_message)
            .collect();

        let mut adopted = 0;
        self.state.send_if_modified(|state| {
            if state.session_id.as_deref() != Some(session_id.as_str())
                || state.sending
                || !state.messages.is_empty()
                || history.is_empty()
            {
                return false;
            }
            adopted = history.len();
            state.messages = history;
            true
        });
        Ok(adopted)
    }

    /// Lists the signed-in user's server-side conversation sessions.
    pub async fn sessions(&self) -> Result<Vec<String>> {
        let user_id = self.user_id()?;
        self.backend.get_sessions(&user_id).await
    }

    /// Searches the signed-in user's memories.
    pub async fn search_memories(&self, query: &str, limit: Option<u32>) -> Result<Vec<Memory>> {
        let user_id = self.user_id()?;
        let mut request = MemorySearchRequest::new(user_id, query.trim());
        if let Some(limit) = limit {
            request = request.with_limit(limit);
        }
        self.backend.search_memories(&request).await
    }

    /// Deletes every memory the service holds for the signed-in user.
    pub async fn clear_memories(&self) -> Result<bool> {
        let user_id = self.user_id()?;
        let success = self.backend.clear_memories(&user_id).await?;
        tracing::info!(user_id = %user_id, success, "memories cleared");
        Ok(success)
    }

    /// Checks service health.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.backend.health_check().await
    }

    fn user_id(&self) -> Result<String> {
        self.state
            .borrow()
            .user
            .as_ref()
            .map(|user| user.id.clone())
            .ok_or(Error::NotSignedIn)
    }

    fn mint_session_id(&self) -> String {
        let mut minted = self.minted.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if minted.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chat::testing::{FakeBackend, user};

    fn signed_in(backend: FakeBackend) -> ChatSession<FakeBackend> {
        let session = ChatSession::new(backend);
        session.login(user());
        session
    }

    #[tokio::test]
    async fn hello_round_trip() {
        let backend = FakeBackend::new();
        backend.reply("hi there", "s1");
        let session = signed_in(backend);

        let outcome = session.send("hello").await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Replied(ChatMessage::assistant("hi there"))
        );
        assert_eq!(
            session.snapshot().messages,
            vec![ChatMessage::user("hello"), ChatMessage::assistant("hi there")]
        );
        assert_eq!(session.state(), SessionState::Idle);

        let requests = session.backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].message, "hello");
        assert_eq!(requests[0].user_id, "u1");
        assert_eq!(requests[0].session_id, session.session_id());
    }

    #[test]
    fn ignore_reasons_read_as_prose() {
        assert_eq!(
            IgnoreReason::AlreadySending.to_string(),
            "still waiting for the previous reply"
        );
        assert_eq!(IgnoreReason::EmptyInput.to_string(), "there is nothing to send");
    }

    #[tokio::test]
    async fn whitespace_is_ignored() {
        let session = signed_in(FakeBackend::new());
        let mut rx = session.subscribe();
        rx.borrow_and_update();

        for text in ["", "  ", "\n\t "] {
            let outcome = session.send(text).await.unwrap();
            assert_eq!(outcome, SendOutcome::Ignored(IgnoreReason::EmptyInput));
        }
        assert_eq!(session.message_count(), 0);
        assert!(session.backend().requests().is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn signed_out_is_ignored() {
        let session = ChatSession::new(FakeBackend::new());
        let outcome = session.send("hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::Ignored(IgnoreReason::NotSignedIn));
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(session.message_count(), 0);
        assert!(session.backend().requests().is_empty());
    }

    #[tokio::test]
    async fn sent_text_is_trimmed() {
        let backend = FakeBackend::new();
        backend.reply("hi", "s1");
        let session = signed_in(backend);

        session.send("  hello \n").await.unwrap();
        assert_eq!(session.snapshot().messages[0], ChatMessage::user("hello"));
        assert_eq!(session.backend().requests()[0].message, "hello");
    }

    #[tokio::test]
    async fn failure_keeps_user_message() {
        let backend = FakeBackend::new();
        backend.fail(Error::connection("connection refused", None));
        backend.reply("second time lucky", "s1");
        let session = signed_in(backend);

        let err = session.send("hello").await.unwrap_err();
        assert!(err.is_network_error());

        let snapshot = session.snapshot();
        assert_eq!(snapshot.messages, vec![ChatMessage::user("hello")]);
        assert!(snapshot.error.as_ref().is_some_and(Error::is_connection));
        assert_eq!(snapshot.state(), SessionState::Idle);

        // The next send is allowed and clears the banner.
        let outcome = session.send("again").await.unwrap();
        assert!(matches!(outcome, SendOutcome::Replied(_)));
        let snapshot = session.snapshot();
        assert!(snapshot.error.is_none());
        assert_eq!(
            snapshot.messages,
            vec![
                ChatMessage::user("hello"),
                ChatMessage::user("again"),
                ChatMessage::assistant("second time lucky"),
            ]
        );
        assert_eq!(session.backend().requests().len(), 2);
    }

    #[tokio::test]
    async fn service_error_sets_banner_until_dismissed() {
        let backend = FakeBackend::new();
        backend.fail(Error::internal_server("Error processing request"));
        let session = signed_in(backend);

        assert!(session.send("hello").await.unwrap_err().is_service_error());
        assert!(session.snapshot().error.is_some());
        session.dismiss_error();
        assert!(session.snapshot().error.is_none());
        assert_eq!(session.message_count(), 1);
    }

    #[tokio::test]
    async fn single_flight() {
        let backend = FakeBackend::gated();
        backend.reply("hi there", "s1");
        let session = Arc::new(signed_in(backend));

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send("hello").await }
        });
        session.backend().wait_started().await;
        assert_eq!(session.state(), SessionState::Sending);

        let second = session.send("are you there?").await.unwrap();
        assert_eq!(second, SendOutcome::Ignored(IgnoreReason::AlreadySending));
        assert_eq!(session.message_count(), 1);

        session.backend().release();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, SendOutcome::Replied(ChatMessage::assistant("hi there")));
        assert_eq!(session.backend().requests().len(), 1);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn logout_during_send_drops_reply() {
        let backend = FakeBackend::gated();
        backend.reply("too late", "s1");
        let session = Arc::new(signed_in(backend));

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send("hello").await }
        });
        session.backend().wait_started().await;
        session.logout();
        assert_eq!(session.state(), SessionState::Unauthenticated);

        session.backend().release();
        assert_eq!(pending.await.unwrap().unwrap(), SendOutcome::Stale);
        let snapshot = session.snapshot();
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.session_id.is_none());
    }

    #[tokio::test]
    async fn logout_always_clears() {
        let session = ChatSession::new(FakeBackend::new());
        session.logout();
        assert_eq!(session.state(), SessionState::Unauthenticated);

        session.backend().reply("hi", "s1");
        session.login(user());
        session.set_input("draft");
        session.send("hello").await.unwrap();
        session.logout();

        let snapshot = session.snapshot();
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.session_id.is_none());
        assert!(snapshot.user.is_none());
        assert!(snapshot.input.is_empty());
    }

    #[test]
    fn logins_mint_distinct_session_ids() {
        let session = ChatSession::new(FakeBackend::new());
        let mut seen = HashSet::new();
        for _ in 0..256 {
            let id = session.login(user());
            assert_eq!(session.session_id().as_deref(), Some(id.as_str()));
            assert!(seen.insert(id));
            session.logout();
        }
    }

    #[tokio::test]
    async fn login_resets_conversation() {
        let backend = FakeBackend::new();
        backend.reply("hi", "s1");
        let session = signed_in(backend);
        session.send("hello").await.unwrap();
        let first = session.session_id();

        session.login(user());
        assert_eq!(session.message_count(), 0);
        assert_ne!(session.session_id(), first);
    }

    #[tokio::test]
    async fn submit_sends_and_clears_input() {
        let backend = FakeBackend::new();
        backend.reply("hi there", "s1");
        let session = signed_in(backend);

        session.set_input("  hello ");
        let outcome = session.submit().await.unwrap();
        assert!(matches!(outcome, SendOutcome::Replied(_)));
        let snapshot = session.snapshot();
        assert!(snapshot.input.is_empty());
        assert_eq!(snapshot.messages[0], ChatMessage::user("hello"));
    }

    #[tokio::test]
    async fn subscribers_see_each_step() {
        let backend = FakeBackend::gated();
        backend.reply("hi there", "s1");
        let session = Arc::new(ChatSession::new(backend));
        let mut rx = session.subscribe();

        session.login(user());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state(), SessionState::Idle);

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send("hello").await }
        });
        rx.changed().await.unwrap();
        {
            let snapshot = rx.borrow_and_update();
            assert_eq!(snapshot.state(), SessionState::Sending);
            assert_eq!(snapshot.messages, vec![ChatMessage::user("hello")]);
        }

        session.backend().release();
        pending.await.unwrap().unwrap();
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update();
        assert_eq!(snapshot.state(), SessionState::Idle);
        assert_eq!(snapshot.messages.len(), 2);
    }

    #[tokio::test]
    async fn history_adopted_into_empty_conversation() {
        let backend = FakeBackend::new();
        backend.history(vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi there"),
        ]);
        let session = signed_in(backend);

        assert_eq!(session.load_history().await.unwrap(), 2);
        assert_eq!(session.message_count(), 2);
        // A second load must not duplicate anything.
        assert_eq!(session.load_history().await.unwrap(), 0);
        assert_eq!(session.message_count(), 2);
    }

    #[tokio::test]
    async fn memory_operations_need_a_user() {
        let session = ChatSession::new(FakeBackend::new());
        assert!(matches!(
            session.clear_memories().await,
            Err(Error::NotSignedIn)
        ));
        assert!(matches!(
            session.search_memories("tea", None).await,
            Err(Error::NotSignedIn)
        ));
        assert!(matches!(session.sessions().await, Err(Error::NotSignedIn)));
        assert!(matches!(session.load_history().await, Err(Error::NotSignedIn)));
    }

    #[tokio::test]
    async fn memory_operations_use_signed_in_user() {
        let session = signed_in(FakeBackend::new());
        assert!(session.clear_memories().await.unwrap());
        session.search_memories(" tea ", None).await.unwrap();
        session.search_memories("tea", Some(10)).await.unwrap();

        let searches = session.backend().searches();
        assert_eq!(searches[0], MemorySearchRequest::new("u1", "tea"));
        assert_eq!(searches[1].limit, 10);
        assert_eq!(session.backend().cleared(), vec!["u1".to_string()]);
    }
}
