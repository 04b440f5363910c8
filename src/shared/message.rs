/**
 * Message Data Structures
 *
 * This module defines the conversation message and the presence projection
 * that travel over the relay's event stream.
 *
 * Field names follow the wire format consumed by the web client: ids are
 * serialized as `_id`, everything else in camelCase.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display fields of a message's sender, resolved from the user store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderProfile {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A single message in a community or calendar-event conversation
///
/// Messages are immutable once created. The only mutation a conversation
/// sees is appending a message or removing one as a whole.
///
/// # Example
/// ```rust
/// use community_relay::shared::Message;
/// use uuid::Uuid;
///
/// let sender = Uuid::new_v4();
/// let message = Message::new(sender, "Welcome to the community!");
///
/// assert_eq!(message.sender_id, sender);
/// assert!(message.sender.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message id
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Id of the user that sent the message
    pub sender_id: Uuid,
    /// Resolved sender display fields
    ///
    /// Present on every message read back from a store; `None` only for
    /// messages built locally before they are persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderProfile>,
    /// Message text
    pub content: String,
    /// Creation time (RFC3339 on the wire)
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message with a fresh id and the current timestamp
    pub fn new(sender_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            sender: None,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Attach resolved sender display fields
    pub fn with_sender(mut self, sender: SenderProfile) -> Self {
        self.sender = Some(sender);
        self
    }
}

/// Projection of an online community member
///
/// This is what `initial.onlineUsers` and `onlineUsers` events carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PresenceUser {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_new() {
        let sender = Uuid::new_v4();
        let message = Message::new(sender, "Hello");
        assert_eq!(message.sender_id, sender);
        assert_eq!(message.content, "Hello");
        assert!(message.sender.is_none());
    }

    #[test]
    fn test_message_wire_field_names() {
        let sender = SenderProfile {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            avatar: Some("https://cdn.example.com/ada.png".to_string()),
        };
        let message = Message::new(sender.id, "Hi").with_sender(sender.clone());
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["_id"], message.id.to_string());
        assert_eq!(json["senderId"], sender.id.to_string());
        assert_eq!(json["sender"]["name"], "Ada");
        assert_eq!(json["sender"]["_id"], sender.id.to_string());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_unresolved_sender_is_omitted() {
        let message = Message::new(Uuid::new_v4(), "Hi");
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("sender").is_none());
    }

    #[test]
    fn test_presence_user_serialization() {
        let user = PresenceUser {
            id: Uuid::new_v4(),
            name: "Grace".to_string(),
            avatar: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["name"], "Grace");
        assert!(json["avatar"].is_null());
    }
}
