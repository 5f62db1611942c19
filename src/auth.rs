//! Authentication against the external identity provider.
//!
//! [`AuthProvider`] is the capability set the rest of the crate relies on.
//! [`SupabaseAuth`] implements it over the GoTrue REST API that Supabase
//! exposes under `/auth/v1`. The provider owns the login session (access and
//! refresh tokens); nothing else in the crate stores tokens.

use std::env;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use url::Url;

use crate::client::error_message;
use crate::credential::CredentialSource;
use crate::error::{Error, Result};
use crate::observability::{AUTH_FAILURES, AUTH_REFRESHES, AUTH_REQUESTS};
use crate::types::UserIdentity;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Tokens this close to expiry are treated as expired.
const EXPIRY_LEEWAY_SECS: i64 = 10;

/// A login session issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthSession {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token that can mint a new access token once this one expires.
    pub refresh_token: Option<String>,
    /// Expiry as a unix timestamp, when the provider reports one.
    pub expires_at: Option<i64>,
    /// The user the session belongs to.
    pub user: UserIdentity,
}

impl AuthSession {
    /// Returns true if the access token is expired (or about to be) at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        match self.expires_at {
            Some(expires_at) => now.unix_timestamp() + EXPIRY_LEEWAY_SECS >= expires_at,
            None => false,
        }
    }

    /// Returns true if the access token is expired (or about to be) right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}

/// Result of a successful sign-up.
///
/// Neither outcome leaves a session behind; the user signs in explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The account exists but must be confirmed (usually by email) before the
    /// user can sign in.
    ConfirmationRequired(UserIdentity),
    /// The provider confirmed the account immediately; signing in works now.
    Confirmed(UserIdentity),
}

impl SignUpOutcome {
    /// The identity that was registered.
    pub fn user(&self) -> &UserIdentity {
        match self {
            SignUpOutcome::ConfirmationRequired(user) | SignUpOutcome::Confirmed(user) => user,
        }
    }
}

/// Email/password identity provider.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register a new account.
    ///
    /// Success does not mean the user is signed in; see [`SignUpOutcome`].
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUpOutcome>;

    /// Sign in with email and password, establishing the provider session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Invalidate and forget the provider session.
    async fn sign_out(&self) -> Result<()>;

    /// The signed-in user, or `None`. Never fails.
    async fn current_user(&self) -> Option<UserIdentity>;

    /// The live access token, or `None` when there is no usable session.
    async fn access_token(&self) -> Option<String>;
}

/// Rejects sign-ups with a blank field before anything is sent.
pub fn validate_sign_up(email: &str, password: &str, full_name: &str) -> Result<()> {
    for (param, value) in [
        ("email", email),
        ("password", password),
        ("full_name", full_name),
    ] {
        if value.trim().is_empty() {
            return Err(Error::validation(
                "Please fill all fields",
                Some(param.to_string()),
            ));
        }
    }
    Ok(())
}

///////////////////////////////////////////// GoTrue ////////////////////////////////////////////

#[derive(Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<GoTrueUserMetadata>,
}

#[derive(Deserialize)]
struct GoTrueUserMetadata {
    #[serde(default)]
    full_name: Option<String>,
}

impl From<GoTrueUser> for UserIdentity {
    fn from(user: GoTrueUser) -> Self {
        UserIdentity {
            id: user.id,
            email: user.email.unwrap_or_default(),
            full_name: user.user_metadata.and_then(|m| m.full_name),
        }
    }
}

#[derive(Deserialize)]
struct GoTrueSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: GoTrueUser,
}

impl From<GoTrueSession> for AuthSession {
    fn from(session: GoTrueSession) -> Self {
        let expires_at = session.expires_at.or_else(|| {
            session
                .expires_in
                .map(|secs| OffsetDateTime::now_utc().unix_timestamp() + secs)
        });
        AuthSession {
            access_token: session.access_token,
            refresh_token: session.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
            user: session.user.into(),
        }
    }
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// [`AuthProvider`] backed by a Supabase (GoTrue) auth server.
pub struct SupabaseAuth {
    client: ReqwestClient,
    auth_url: Url,
    anon_key: String,
    session: Mutex<Option<AuthSession>>,
}

impl SupabaseAuth {
    /// Create a new provider.
    ///
    /// The project URL and anon key can be provided directly or read from the
    /// `MEMCHAT_AUTH_URL` and `MEMCHAT_AUTH_KEY` environment variables.
    pub fn new(auth_url: Option<String>, anon_key: Option<String>) -> Result<Self> {
        let auth_url = match auth_url {
            Some(url) => url,
            None => env::var("MEMCHAT_AUTH_URL").map_err(|_| {
                Error::authentication(
                    "auth URL not provided and MEMCHAT_AUTH_URL environment variable not set",
                )
            })?,
        };
        let anon_key = match anon_key {
            Some(key) => key,
            None => env::var("MEMCHAT_AUTH_KEY").map_err(|_| {
                Error::authentication(
                    "auth key not provided and MEMCHAT_AUTH_KEY environment variable not set",
                )
            })?,
        };
        let auth_url = Url::parse(&auth_url)?;
        if auth_url.cannot_be_a_base() {
            return Err(Error::url(
                format!("{auth_url} cannot be used as a base URL"),
                None,
            ));
        }

        let client = ReqwestClient::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            auth_url,
            anon_key,
            session: Mutex::new(None),
        })
    }

    /// A copy of the stored session, if any.
    pub fn session(&self) -> Option<AuthSession> {
        self.lock_session().clone()
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<AuthSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_session(&self, session: Option<AuthSession>) {
        *self.lock_session() = session;
    }

    /// Replaces the stored session only if it is still the one `still_current`
    /// recognizes. Returns false, leaving the store alone, when a sign-in or
    /// sign-out got there first.
    fn replace_session_if(
        &self,
        still_current: impl FnOnce(&AuthSession) -> bool,
        session: Option<AuthSession>,
    ) -> bool {
        let mut stored = self.lock_session();
        match stored.as_ref() {
            Some(current) if still_current(current) => {
                *stored = session;
                true
            }
            _ => false,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.auth_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::url(format!("{} cannot be a base", self.auth_url), None))?
            .pop_if_empty()
            .extend(["auth", "v1", path]);
        Ok(url)
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&self.anon_key).map_err(|_| {
            Error::validation(
                "auth key contains characters not allowed in a header",
                Some("apikey".to_string()),
            )
        })?;
        headers.insert("apikey", key);
        Ok(headers)
    }

    /// Send a request and return the JSON body, mapping every non-2xx status
    /// to an authentication error carrying the provider's message.
    async fn call(&self, request: RequestBuilder) -> Result<Value> {
        AUTH_REQUESTS.click();
        let response = request
            .headers(self.default_headers()?)
            .send()
            .await
            .map_err(|e| Error::from_transport(e, Some(DEFAULT_TIMEOUT.as_secs_f64())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::from_transport(e, None))?;
        if !status.is_success() {
            AUTH_FAILURES.click();
            return Err(Error::authentication(error_message(&body)));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn grant(&self, grant_type: &str, body: Value) -> Result<AuthSession> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let value = self.call(self.client.post(url).json(&body)).await?;
        let session: GoTrueSession = serde_json::from_value(value)?;
        Ok(session.into())
    }

    /// Exchanges `refresh_token` for a new session and stores it.
    ///
    /// Returns `Ok(None)` when the session the token belonged to was signed
    /// out or replaced while the exchange was in flight; the new session is
    /// discarded.
    async fn refresh(&self, refresh_token: &str) -> Result<Option<AuthSession>> {
        AUTH_REFRESHES.click();
        let session = self
            .grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        let same_login = |current: &AuthSession| {
            current.refresh_token.as_deref() == Some(refresh_token)
        };
        if self.replace_session_if(same_login, Some(session.clone())) {
            Ok(Some(session))
        } else {
            tracing::debug!("refreshed session discarded; the login it belonged to is gone");
            Ok(None)
        }
    }

    /// The stored session, refreshed first if its access token has expired.
    ///
    /// A session that cannot be refreshed is dropped.
    async fn live_session(&self) -> Option<AuthSession> {
        let session = self.session()?;
        if !session.is_expired() {
            return Some(session);
        }
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            tracing::info!(user_id = %session.user.id, "session expired without refresh token");
            self.replace_session_if(|current| *current == session, None);
            return None;
        };
        match self.refresh(refresh_token).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "session refresh failed");
                if err.is_auth_error() {
                    self.replace_session_if(
                        |current| current.refresh_token.as_deref() == Some(refresh_token),
                        None,
                    );
                }
                None
            }
        }
    }
}

impl fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseAuth")
            .field("auth_url", &self.auth_url.as_str())
            .field("signed_in", &self.lock_session().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUpOutcome> {
        validate_sign_up(email, password, full_name)?;
        let body = json!({
            "email": email,
            "password": password,
            "data": { "full_name": full_name },
        });
        let value = self
            .call(self.client.post(self.endpoint("signup")?).json(&body))
            .await?;

        // Auto-confirming projects answer with a session, everything else with
        // the bare user (older servers wrap it in `user`). The session is not
        // kept: signing up never signs in.
        if value.get("access_token").is_some() {
            let session: AuthSession = serde_json::from_value::<GoTrueSession>(value)?.into();
            tracing::info!(user_id = %session.user.id, "signed up; account confirmed");
            return Ok(SignUpOutcome::Confirmed(session.user));
        }
        let user = match value.get("user") {
            Some(user) => serde_json::from_value::<GoTrueUser>(user.clone())?,
            None => serde_json::from_value::<GoTrueUser>(value)?,
        };
        let user = UserIdentity::from(user);
        tracing::info!(user_id = %user.id, "signed up; confirmation required");
        Ok(SignUpOutcome::ConfirmationRequired(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let credentials = serde_json::to_value(PasswordCredentials { email, password })?;
        let session = self.grant("password", credentials).await?;
        self.store_session(Some(session.clone()));
        tracing::info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let result = self
            .call(
                self.client
                    .post(self.endpoint("logout")?)
                    .bearer_auth(&session.access_token),
            )
            .await;
        match result {
            Ok(_) => {}
            // The provider already considers the token dead.
            Err(Error::Authentication { message }) if is_dead_token(&message) => {
                tracing::debug!(%message, "logout of an already invalid session");
            }
            Err(err) => {
                tracing::warn!(error = %err, "sign-out failed");
                return Err(match err {
                    Error::Authentication { .. } => err,
                    other => Error::authentication(format!("could not sign out: {other}")),
                });
            }
        }
        self.store_session(None);
        tracing::info!(user_id = %session.user.id, "signed out");
        Ok(())
    }

    async fn current_user(&self) -> Option<UserIdentity> {
        let session = self.live_session().await?;
        let request = match self.endpoint("user") {
            Ok(url) => self.client.get(url).bearer_auth(&session.access_token),
            Err(err) => {
                tracing::warn!(error = %err, "cannot build user endpoint");
                return None;
            }
        };
        match self.call(request).await {
            Ok(value) => match serde_json::from_value::<GoTrueUser>(value) {
                Ok(user) => Some(user.into()),
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable user from provider");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "could not fetch current user");
                if err.is_auth_error() {
                    self.replace_session_if(
                        |current| current.access_token == session.access_token,
                        None,
                    );
                }
                None
            }
        }
    }

    async fn access_token(&self) -> Option<String> {
        self.live_session().await.map(|s| s.access_token)
    }
}

#[async_trait::async_trait]
impl CredentialSource for SupabaseAuth {
    async fn session_token(&self) -> Option<String> {
        self.access_token().await
    }
}

/// GoTrue answers a logout with a dead token with one of these messages.
fn is_dead_token(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["invalid jwt", "token is expired", "session not found", "user not found"]
        .iter()
        .any(|needle| message.contains(needle))
}
