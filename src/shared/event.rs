/**
 * Relay Event System
 *
 * This module defines the named events a relay subscription pushes to its
 * client. Each event becomes one Server-Sent Events frame:
 *
 * ```text
 * id: <conversation revision>
 * event: <name>
 * data: <json payload>
 * ```
 *
 * | Event           | Payload                                    |
 * |-----------------|--------------------------------------------|
 * | `initial`       | `{ messages, onlineUsers }`                |
 * | `newMessage`    | a single `Message`, sender resolved        |
 * | `deleteMessage` | `{ _id }`                                  |
 * | `onlineUsers`   | `[{ id, name, avatar }]`                   |
 * | `statusChange`  | `{ status }` (calendar-event streams only) |
 * | `error`         | `{ message }`                              |
 */
use serde::Serialize;
use uuid::Uuid;

use super::error::SharedError;
use super::message::{Message, PresenceUser};

/// One event pushed to a relay subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Snapshot sent exactly once when the stream opens
    Initial {
        messages: Vec<Message>,
        online_users: Vec<PresenceUser>,
    },
    /// A message appended since the last diff
    NewMessage(Message),
    /// A message removed since the last diff
    DeleteMessage { id: Uuid },
    /// The online member set changed
    OnlineUsers(Vec<PresenceUser>),
    /// The calendar event's status changed
    StatusChange { status: String },
    /// Message updates stopped being live
    Error { message: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitialPayload<'a> {
    messages: &'a [Message],
    online_users: &'a [PresenceUser],
}

#[derive(Serialize)]
struct DeletePayload {
    #[serde(rename = "_id")]
    id: Uuid,
}

#[derive(Serialize)]
struct StatusPayload<'a> {
    status: &'a str,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    message: &'a str,
}

impl RelayEvent {
    /// Wire name of the event (the SSE `event:` field)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial { .. } => "initial",
            Self::NewMessage(_) => "newMessage",
            Self::DeleteMessage { .. } => "deleteMessage",
            Self::OnlineUsers(_) => "onlineUsers",
            Self::StatusChange { .. } => "statusChange",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize the payload (the SSE `data:` field)
    pub fn payload_json(&self) -> Result<String, SharedError> {
        let encoded = match self {
            Self::Initial {
                messages,
                online_users,
            } => serde_json::to_string(&InitialPayload {
                messages,
                online_users,
            }),
            Self::NewMessage(message) => serde_json::to_string(message),
            Self::DeleteMessage { id } => serde_json::to_string(&DeletePayload { id: *id }),
            Self::OnlineUsers(users) => serde_json::to_string(users),
            Self::StatusChange { status } => serde_json::to_string(&StatusPayload { status }),
            Self::Error { message } => serde_json::to_string(&ErrorPayload { message }),
        };
        encoded.map_err(|e| SharedError::payload_encoding(self.name(), e))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// A relay event tagged with the conversation revision it was computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    pub revision: u64,
    pub event: RelayEvent,
}

impl RelayFrame {
    pub fn new(revision: u64, event: RelayEvent) -> Self {
        Self { revision, event }
    }

    /// Render the frame as raw `text/event-stream` bytes
    ///
    /// The HTTP layer hands frames to axum's SSE encoder instead; this is
    /// the same framing for consumers that write to a plain byte sink.
    pub fn to_sse_string(&self) -> Result<String, SharedError> {
        Ok(format!(
            "id: {}\nevent: {}\ndata: {}\n\n",
            self.revision,
            self.event.name(),
            self.event.payload_json()?
        ))
    }
}
