use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's message, already trimmed.
    pub message: String,

    /// Provider-assigned id of the signed-in user.
    pub user_id: String,

    /// Conversation session the message belongs to.
    ///
    /// The server mints one when this is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    /// Create a new `ChatRequest` for an existing conversation session.
    pub fn new(
        message: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.into(),
            session_id: Some(session_id.into()),
        }
    }
}

/// Body returned by `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    /// The assistant's reply.
    pub response: String,

    /// The session the server filed the turn under.
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn chat_request_serialization() {
        let request = ChatRequest::new("hello", "u1", "s1");
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "message": "hello",
                "user_id": "u1",
                "session_id": "s1"
            })
        );
    }

    #[test]
    fn chat_request_without_session() {
        let request = ChatRequest {
            message: "hello".to_string(),
            user_id: "u1".to_string(),
            session_id: None,
        };
        assert_eq!(
            to_value(&request).unwrap(),
            json!({"message": "hello", "user_id": "u1"})
        );
    }
}
