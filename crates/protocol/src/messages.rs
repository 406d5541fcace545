//! Telegram Bot API message definitions.
//!
//! Only the fields the bridge needs are modelled. Unknown fields in responses
//! are ignored by serde, and optional fields default to `None`.

use serde::{Deserialize, Serialize};

/// Update kinds requested from `getUpdates`.
pub const ALLOWED_UPDATES: &[&str] = &["message"];

/// Generic Bot API response wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub result: Option<T>,
}

/// A single update returned by `getUpdates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Server-assigned, monotonically increasing identifier.
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl Update {
    /// Builds an update carrying a plain text message from `chat_id`.
    pub fn text_message(update_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            update_id,
            message: Some(Message {
                message_id: update_id,
                chat: Chat { id: chat_id },
                text: Some(text.into()),
            }),
        }
    }

    /// Chat the update originates from, if it carries a message.
    pub fn sender_id(&self) -> Option<i64> {
        self.message.as_ref().map(|m| m.chat.id)
    }

    /// Text of the carried message, if any.
    pub fn text(&self) -> Option<&str> {
        self.message.as_ref().and_then(|m| m.text.as_deref())
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A chat. Only the identifier is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Body of a `getUpdates` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetUpdatesRequest {
    /// First update to return; everything below is acknowledged.
    pub offset: i64,
    /// Long-poll timeout in seconds.
    pub timeout: u64,
    pub allowed_updates: Vec<String>,
}

impl GetUpdatesRequest {
    pub fn new(offset: i64, timeout: u64) -> Self {
        Self {
            offset,
            timeout,
            allowed_updates: ALLOWED_UPDATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Body of a `sendMessage` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_update_with_message() {
        let json = r#"{
            "update_id": 123,
            "message": {
                "message_id": 456,
                "from": {"id": 789, "first_name": "Alice", "is_bot": false},
                "chat": {"id": -100123, "type": "private"},
                "date": 1700000000,
                "text": "$ uptime"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_id, 123);
        assert_eq!(update.sender_id(), Some(-100123));
        assert_eq!(update.text(), Some("$ uptime"));
    }

    #[test]
    fn test_deserialize_update_without_message() {
        let json = r#"{"update_id": 7, "edited_message": {"chat": {"id": 1}}}"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert!(update.message.is_none());
        assert_eq!(update.sender_id(), None);
        assert_eq!(update.text(), None);
    }

    #[test]
    fn test_deserialize_message_without_text() {
        let json = r#"{"update_id": 8, "message": {"message_id": 1, "chat": {"id": 5}, "sticker": {}}}"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.sender_id(), Some(5));
        assert_eq!(update.text(), None);
    }

    #[test]
    fn test_deserialize_api_response_ok() {
        let json = r#"{"ok": true, "result": [{"update_id": 1}, {"update_id": 2}]}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.result.unwrap().len(), 2);
    }

    #[test]
    fn test_deserialize_api_response_error() {
        let json = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.description.as_deref(), Some("Unauthorized"));
        assert!(resp.result.is_none());
    }

    #[test]
    fn test_serialize_get_updates_request() {
        let request = GetUpdatesRequest::new(42, 60);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["offset"], 42);
        assert_eq!(value["timeout"], 60);
        assert_eq!(value["allowed_updates"], serde_json::json!(["message"]));
    }

    #[test]
    fn test_serialize_send_message_request() {
        let request = SendMessageRequest {
            chat_id: -5,
            text: "hi",
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"chat_id":-5,"text":"hi"}"#);
    }

    #[test]
    fn test_text_message_builder() {
        let update = Update::text_message(10, 99, "$ ls");
        assert_eq!(update.update_id, 10);
        assert_eq!(update.sender_id(), Some(99));
        assert_eq!(update.text(), Some("$ ls"));
    }
}
