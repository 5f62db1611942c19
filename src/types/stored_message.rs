use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Author tag used by the service's message store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredMessageKind {
    /// Written by the user.
    Human,

    /// Written by the assistant.
    Ai,

    /// Any tag this client does not know.
    #[serde(other)]
    Unknown,
}

/// The `message` column of a persisted row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessageBody {
    /// Author tag.
    #[serde(rename = "type")]
    pub kind: StoredMessageKind,

    /// The message text.
    #[serde(default)]
    pub content: String,
}

/// A message row as returned by `GET /api/messages/{sessionId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    /// Row identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,

    /// The session the row belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Insertion timestamp as stored by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// The message itself.
    pub message: StoredMessageBody,
}

impl StoredMessage {
    /// Converts the row into a conversation entry.
    ///
    /// Returns `None` for rows whose author tag is unknown.
    pub fn to_chat_message(&self) -> Option<ChatMessage> {
        match self.message.kind {
            StoredMessageKind::Human => Some(ChatMessage::user(self.message.content.clone())),
            StoredMessageKind::Ai => Some(ChatMessage::assistant(self.message.content.clone())),
            StoredMessageKind::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_rows_convert_in_order() {
        let rows: Vec<StoredMessage> = serde_json::from_value(json!([
            {"id": 1, "session_id": "s1", "created_at": "2024-07-20T01:42:48Z",
             "message": {"type": "human", "content": "hello"}},
            {"id": 2, "session_id": "s1", "message": {"type": "ai", "content": "hi there"}},
            {"id": 3, "session_id": "s1", "message": {"type": "system", "content": "ignored"}}
        ]))
        .unwrap();

        let messages: Vec<ChatMessage> = rows.iter().filter_map(|r| r.to_chat_message()).collect();
        assert_eq!(
            messages,
            vec![ChatMessage::user("hello"), ChatMessage::assistant("hi there")]
        );
    }
}
