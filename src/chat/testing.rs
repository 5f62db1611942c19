//! In-memory stand-ins for the remote collaborators, used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::auth::{AuthProvider, AuthSession, SignUpOutcome, validate_sign_up};
use crate::chat::ChatBackend;
use crate::error::{Error, Result};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, HealthStatus, Memory, MemorySearchRequest, Role,
    StoredMessage, StoredMessageBody, StoredMessageKind, UserIdentity,
};

pub(crate) fn user() -> UserIdentity {
    UserIdentity::new("u1", "ada@example.com").with_full_name("Ada")
}

struct Gate {
    started: Notify,
    release: Notify,
}

/// Scripted [`ChatBackend`]. Replies are consumed in order; with no scripted
/// reply left, `send_message` fails with a service error.
#[derive(Default)]
pub(crate) struct FakeBackend {
    replies: Mutex<VecDeque<Result<ChatResponse>>>,
    requests: Mutex<Vec<ChatRequest>>,
    searches: Mutex<Vec<MemorySearchRequest>>,
    cleared: Mutex<Vec<String>>,
    history: Mutex<Vec<ChatMessage>>,
    gate: Option<Gate>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A backend whose `send_message` blocks until [`FakeBackend::release`].
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Gate {
                started: Notify::new(),
                release: Notify::new(),
            }),
            ..Self::default()
        }
    }

    pub(crate) fn reply(&self, response: &str, session_id: &str) {
        self.replies.lock().unwrap().push_back(Ok(ChatResponse {
            response: response.to_string(),
            session_id: session_id.to_string(),
        }));
    }

    pub(crate) fn fail(&self, error: Error) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn history(&self, messages: Vec<ChatMessage>) {
        *self.history.lock().unwrap() = messages;
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn searches(&self) -> Vec<MemorySearchRequest> {
        self.searches.lock().unwrap().clone()
    }

    pub(crate) fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }

    pub(crate) async fn wait_started(&self) {
        if let Some(gate) = &self.gate {
            gate.started.notified().await;
        }
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.release.notify_one();
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for FakeBackend {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| Err(Error::internal_server("no scripted reply")))
    }

    async fn get_sessions(&self, _user_id: &str) -> Result<Vec<String>> {
        Ok(vec!["s-old".to_string()])
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let history = self.history.lock().unwrap().clone();
        Ok(history
            .into_iter()
            .map(|message| StoredMessage {
                id: None,
                session_id: Some(session_id.to_string()),
                created_at: None,
                message: StoredMessageBody {
                    kind: match message.role {
                        Role::User => StoredMessageKind::Human,
                        Role::Assistant => StoredMessageKind::Ai,
                    },
                    content: message.content,
                },
            })
            .collect())
    }

    async fn search_memories(&self, request: &MemorySearchRequest) -> Result<Vec<Memory>> {
        self.searches.lock().unwrap().push(request.clone());
        Ok(Vec::new())
    }

    async fn clear_memories(&self, user_id: &str) -> Result<bool> {
        self.cleared.lock().unwrap().push(user_id.to_string());
        Ok(true)
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            status: "ok".to_string(),
        })
    }
}

/// [`AuthProvider`] that knows a single account.
pub(crate) struct FakeAuth {
    password: String,
    account: UserIdentity,
    session: Mutex<Option<AuthSession>>,
    pub(crate) fail_sign_out: bool,
}

impl FakeAuth {
    pub(crate) fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            account: user(),
            session: Mutex::new(None),
            fail_sign_out: false,
        }
    }

    pub(crate) fn signed_in(password: &str) -> Self {
        let auth = Self::new(password);
        *auth.session.lock().unwrap() = Some(auth.new_session());
        auth
    }

    fn new_session(&self) -> AuthSession {
        AuthSession {
            access_token: "jwt".to_string(),
            refresh_token: None,
            expires_at: None,
            user: self.account.clone(),
        }
    }
}

#[async_trait::async_trait]
impl AuthProvider for FakeAuth {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUpOutcome> {
        validate_sign_up(email, password, full_name)?;
        if email == self.account.email {
            return Err(Error::authentication("User already registered"));
        }
        Ok(SignUpOutcome::ConfirmationRequired(
            UserIdentity::new("u2", email).with_full_name(full_name),
        ))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        if email != self.account.email || password != self.password {
            return Err(Error::authentication("Invalid login credentials"));
        }
        let session = self.new_session();
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.fail_sign_out {
            return Err(Error::authentication("could not sign out"));
        }
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn current_user(&self) -> Option<UserIdentity> {
        self.session.lock().unwrap().as_ref().map(|s| s.user.clone())
    }

    async fn access_token(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.access_token.clone())
    }
}
