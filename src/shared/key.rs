//! Parent Keys
//!
//! A parent key selects which conversation a subscription or a write
//! targets: a community's chat, or the discussion thread of one calendar
//! event inside that community.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier tuple of a conversation's parent resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ParentKey {
    pub community_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

impl ParentKey {
    /// Key of a community's chat
    pub fn community(community_id: Uuid) -> Self {
        Self {
            community_id,
            event_id: None,
        }
    }

    /// Key of a calendar event's discussion thread
    pub fn calendar_event(community_id: Uuid, event_id: Uuid) -> Self {
        Self {
            community_id,
            event_id: Some(event_id),
        }
    }

    pub fn is_calendar_event(&self) -> bool {
        self.event_id.is_some()
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event_id {
            Some(event_id) => write!(f, "community:{}/event:{}", self.community_id, event_id),
            None => write!(f, "community:{}", self.community_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_community_and_event_keys_differ() {
        let community_id = Uuid::new_v4();
        let event_id = Uuid::new_v4();
        let chat = ParentKey::community(community_id);
        let thread = ParentKey::calendar_event(community_id, event_id);

        assert_ne!(chat, thread);
        assert!(!chat.is_calendar_event());
        assert!(thread.is_calendar_event());
    }

    #[test]
    fn test_display() {
        let community_id = Uuid::nil();
        let key = ParentKey::community(community_id);
        assert_eq!(key.to_string(), format!("community:{}", community_id));
    }

    #[test]
    fn test_notification_payload_shape() {
        let community_id = Uuid::new_v4();
        let json = format!(r#"{{"communityId":"{}"}}"#, community_id);
        let key: ParentKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, ParentKey::community(community_id));
    }
}
