//! Store Module
//!
//! Boundary contracts between the relay and the persistent store, plus the
//! two implementations the server can run against.
//!
//! # Architecture
//!
//! - **`ConversationStore`** - conversation lookup, create-if-missing and a
//!   change-subscription primitive (`watch`)
//! - **`MembershipSource`** - community members with their presence flag
//! - **`ConversationWriter`** - the write side (send/delete message,
//!   presence toggle, event status), which publishes change notifications
//!
//! # Module Structure
//!
//! ```text
//! store/
//! ├── mod.rs      - Traits, records and StoreError
//! ├── memory.rs   - In-process store (broadcast change notifications)
//! └── postgres.rs - PostgreSQL store (LISTEN/NOTIFY change notifications)
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::shared::{Message, ParentKey, PresenceUser};

/// In-process store
pub mod memory;

/// PostgreSQL store
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("change listener failed: {0}")]
    Listener(String),

    #[error("change listener closed")]
    ListenerClosed,

    #[error("failed to decode change notification: {0}")]
    Decode(String),

    #[error("write rejected: {0}")]
    Write(String),

    #[error("{0} not found")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A community as seen by existence and authorization checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Community {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub member_ids: Vec<Uuid>,
}

impl Community {
    /// Caller may view the community iff they are a member or its creator
    pub fn is_member_or_creator(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id || self.member_ids.contains(&user_id)
    }
}

/// A calendar event nested inside a community
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub community_id: Uuid,
    pub status: String,
}

/// Full conversation document, re-read on every change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationDoc {
    pub key: ParentKey,
    /// Messages in document order, senders resolved
    pub messages: Vec<Message>,
    /// Calendar event status; `None` for community chats
    pub status: Option<String>,
    /// Monotonic write counter
    pub revision: u64,
}

impl ConversationDoc {
    pub fn empty(key: ParentKey) -> Self {
        Self {
            key,
            messages: Vec::new(),
            status: None,
            revision: 0,
        }
    }
}

/// A community member with the presence flag the relay reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
    pub online: bool,
}

impl Member {
    pub fn to_presence_user(&self) -> PresenceUser {
        PresenceUser {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Kind of write that produced a change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    Delete,
    Update,
}

/// Signal that the conversation under `key` changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub operation: OperationType,
    pub key: ParentKey,
}

impl ChangeNotification {
    /// Stand-in for signals a listener may have missed
    ///
    /// The relay re-reads the whole conversation on every notification, so
    /// one of these is enough to catch up after a gap.
    pub fn resync(key: ParentKey) -> Self {
        Self {
            operation: OperationType::Update,
            key,
        }
    }
}

/// Handle to a live change subscription
///
/// Dropping the handle also stops the subscription; `close` exists so the
/// owner can release it at a precise point and so implementations can
/// account for it. `close` is idempotent.
#[async_trait]
pub trait ChangeListener: Send {
    /// Wait for the next notification
    ///
    /// `None` means the underlying feed ended.
    async fn next(&mut self) -> Option<StoreResult<ChangeNotification>>;

    fn close(&mut self);
}

/// Read side the relay depends on
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_community(&self, community_id: Uuid) -> StoreResult<Option<Community>>;

    async fn find_calendar_event(
        &self,
        community_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<CalendarEvent>>;

    async fn find_conversation(&self, key: &ParentKey) -> StoreResult<Option<ConversationDoc>>;

    /// Create the conversation if it does not exist yet and return it
    ///
    /// Must behave as an upsert: concurrent callers for the same key end up
    /// with one document.
    async fn create_conversation(&self, key: &ParentKey) -> StoreResult<ConversationDoc>;

    /// Subscribe to changes of the conversation under `key`
    async fn watch(&self, key: &ParentKey) -> StoreResult<Box<dyn ChangeListener>>;
}

/// Member list with presence flags for a community
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn members(&self, community_id: Uuid) -> StoreResult<Vec<Member>>;
}

/// Write side; every write publishes a change notification
#[async_trait]
pub trait ConversationWriter: Send + Sync {
    async fn append_message(
        &self,
        key: &ParentKey,
        sender_id: Uuid,
        content: &str,
    ) -> StoreResult<Message>;

    /// Returns `false` if no message with that id existed
    async fn delete_message(&self, key: &ParentKey, message_id: Uuid) -> StoreResult<bool>;

    async fn set_presence(&self, community_id: Uuid, user_id: Uuid, online: bool) -> StoreResult<()>;

    async fn set_event_status(
        &self,
        community_id: Uuid,
        event_id: Uuid,
        status: &str,
    ) -> StoreResult<()>;
}

/// Everything the server needs from one backing store
pub trait RelayStore: ConversationStore + MembershipSource + ConversationWriter {}

impl<T> RelayStore for T where T: ConversationStore + MembershipSource + ConversationWriter {}
