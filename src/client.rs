use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::credential::{CredentialSource, NoSession, resolve_credential};
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::types::{
    ChatRequest, ChatResponse, ClearMemoriesResponse, HealthStatus, Memory, MemorySearchRequest,
    StoredMessage,
};

/// Base URL used when neither an explicit URL nor `MEMCHAT_API_URL` is given.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
/// Bearer token used when no provider session is live.
pub const DEFAULT_API_TOKEN: &str = "mem0-fullstack-token";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the chat/memory service.
///
/// Every request carries `Authorization: Bearer <token>`. The token is looked
/// up from the [`CredentialSource`] when the request is built, so a session
/// that expires or rotates mid-conversation is picked up immediately. No call
/// is ever retried.
#[derive(Clone)]
pub struct MemChat {
    client: ReqwestClient,
    base_url: Url,
    fallback_token: String,
    timeout: Duration,
    credentials: Arc<dyn CredentialSource>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl MemChat {
    /// Create a new client.
    ///
    /// The base URL and fallback token are read from `MEMCHAT_API_URL` and
    /// `MEMCHAT_API_TOKEN`, defaulting to [`DEFAULT_API_URL`] and
    /// [`DEFAULT_API_TOKEN`].
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        Self::with_options(None, None, None, credentials)
    }

    /// Create a client that always uses the fallback token.
    pub fn without_session(
        base_url: Option<String>,
        fallback_token: Option<String>,
    ) -> Result<Self> {
        Self::with_options(base_url, fallback_token, None, Arc::new(NoSession))
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: Option<String>,
        fallback_token: Option<String>,
        timeout: Option<Duration>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self> {
        let base_url = base_url
            .or_else(|| env::var("MEMCHAT_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let fallback_token = fallback_token
            .or_else(|| env::var("MEMCHAT_API_TOKEN").ok())
            .unwrap_or_else(|| DEFAULT_API_TOKEN.to_string());
        let base_url = Url::parse(&base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::url(
                format!("{base_url} cannot be used as a base URL"),
                None,
            ));
        }

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            fallback_token,
            timeout,
            credentials,
            logger: None,
        })
    }

    /// Attach a logger that observes every call.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The service base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send one chat turn.
    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.execute(Method::POST, &["api", "chat"], Some(request))
            .await
    }

    /// List the conversation session ids the service holds for a user.
    pub async fn get_sessions(&self, user_id: &str) -> Result<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct SessionsResponse {
            #[serde(default)]
            sessions: Vec<String>,
        }

        let response: SessionsResponse = self
            .execute(Method::GET, &["api", "sessions", user_id], None::<&()>)
            .await?;
        Ok(response.sessions)
    }

    /// Fetch the persisted messages of a conversation session, oldest first.
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        #[derive(serde::Deserialize)]
        struct MessagesResponse {
            #[serde(default)]
            messages: Vec<StoredMessage>,
        }

        let response: MessagesResponse = self
            .execute(Method::GET, &["api", "messages", session_id], None::<&()>)
            .await?;
        Ok(response.messages)
    }

    /// Semantic search over a user's memories.
    pub async fn search_memories(&self, request: &MemorySearchRequest) -> Result<Vec<Memory>> {
        #[derive(serde::Deserialize)]
        struct MemoriesResponse {
            #[serde(default)]
            memories: Vec<Memory>,
        }

        let response: MemoriesResponse = self
            .execute(Method::POST, &["api", "memories", "search"], Some(request))
            .await?;
        Ok(response.memories)
    }

    /// Delete every memory the service holds for a user.
    ///
    /// Returns the service's `success` flag.
    pub async fn clear_memories(&self, user_id: &str) -> Result<bool> {
        let response: ClearMemoriesResponse = self
            .execute(Method::DELETE, &["api", "memories", user_id], None::<&()>)
            .await?;
        Ok(response.success)
    }

    /// Ask the service whether it is up.
    pub async fn health_check(&self) -> Result<HealthStatus> {
        self.execute(Method::GET, &["health"], None::<&()>).await
    }

    /// Build the URL for a path below the base URL.
    ///
    /// Each segment is percent-encoded, so ids containing `/` or `?` cannot
    /// escape their path position.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::url(format!("{} cannot be a base", self.base_url), None))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Create the headers for one request, resolving the bearer token now.
    async fn request_headers(&self) -> Result<HeaderMap> {
        let session_token = self.credentials.session_token().await;
        let token = resolve_credential(session_token.as_deref(), &self.fallback_token);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let authorization = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            Error::validation(
                "bearer token contains characters not allowed in a header",
                Some("authorization".to_string()),
            )
        })?;
        headers.insert(header::AUTHORIZATION, authorization);
        Ok(headers)
    }

    async fn execute<B, T>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let endpoint = url.path().to_string();
        CLIENT_REQUESTS.click();
        let start = Instant::now();

        let result = self.execute_inner(method.clone(), url, body).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let result = result.and_then(|value| {
            if let Some(logger) = &self.logger {
                logger.log_response(&endpoint, &value);
            }
            serde_json::from_value::<T>(value).map_err(|e| {
                Error::serialization(
                    format!("Failed to parse response: {}", e),
                    Some(Box::new(e)),
                )
            })
        });

        match &result {
            Ok(_) => {
                tracing::debug!(%method, endpoint = %endpoint, "request succeeded");
            }
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                tracing::debug!(%method, endpoint = %endpoint, error = %err, "request failed");
                if let Some(logger) = &self.logger {
                    logger.log_error(&endpoint, err);
                }
            }
        }
        result
    }

    async fn execute_inner<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self
            .client
            .request(method, url)
            .headers(self.request_headers().await?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::from_transport(e, Some(self.timeout.as_secs_f64())))?;

        if !response.status().is_success() {
            return Err(process_error_response(response).await);
        }

        response.json::<Value>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }
}

impl fmt::Debug for MemChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemChat")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

/// Process API response errors and convert to our Error type.
///
/// The body is only mined for a human-readable message; the status code
/// decides the error kind.
pub(crate) async fn process_error_response(response: Response) -> Error {
    let status_code = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::from_transport(e, None);
        }
    };

    Error::from_status(status_code, error_message(&error_body), retry_after)
}

/// Pulls a message out of the common JSON error shapes, else returns the body.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    let candidates = [
        value.get("detail"),
        value.get("error_description"),
        value.get("msg"),
        value.get("message"),
        value.get("error").and_then(|e| e.get("message")),
        value.get("error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = MemChat::without_session(
            Some("http://chat.example.com:8000".to_string()),
            Some("static-token".to_string()),
        )
        .unwrap();
        assert_eq!(client.base_url.as_str(), "http://chat.example.com:8000/");
        assert_eq!(client.fallback_token, "static-token");
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);

        let client = MemChat::with_options(
            Some("https://custom.example.com/".to_string()),
            Some("static-token".to_string()),
            Some(Duration::from_secs(5)),
            Arc::new(NoSession),
        )
        .unwrap();
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = MemChat::without_session(Some("not a url".to_string()), None).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
        let err =
            MemChat::without_session(Some("mailto:chat@example.com".to_string()), None).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn endpoints_join_below_base() {
        let client = MemChat::without_session(
            Some("http://localhost:8000/prefix/".to_string()),
            Some("t".to_string()),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(&["api", "chat"]).unwrap().as_str(),
            "http://localhost:8000/prefix/api/chat"
        );
        assert_eq!(
            client
                .endpoint(&["api", "sessions", "a/b?c"])
                .unwrap()
                .as_str(),
            "http://localhost:8000/prefix/api/sessions/a%2Fb%3Fc"
        );

        let client = MemChat::without_session(
            Some("http://localhost:8000".to_string()),
            Some("t".to_string()),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(&["health"]).unwrap().as_str(),
            "http://localhost:8000/health"
        );
    }

    #[test]
    fn error_messages_from_bodies() {
        assert_eq!(error_message(r#"{"detail": "Invalid token"}"#), "Invalid token");
        assert_eq!(
            error_message(r#"{"error": {"message": "nope"}}"#),
            "nope"
        );
        assert_eq!(
            error_message(r#"{"error": "invalid_grant", "error_description": "Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[tokio::test]
    async fn headers_use_fallback_without_session() {
        let client =
            MemChat::without_session(Some(DEFAULT_API_URL.to_string()), Some("static".into()))
                .unwrap();
        let headers = client.request_headers().await.unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer static");
    }
}
