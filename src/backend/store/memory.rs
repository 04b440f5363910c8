/**
 * In-Memory Store
 *
 * A complete store kept in process memory. The server falls back to it when
 * `DATABASE_URL` is not configured, and tests drive the relay through it.
 *
 * # Change Notifications
 *
 * Every conversation write publishes a signal on a `tokio::sync::broadcast`
 * channel. Each `watch` call subscribes a receiver and filters signals by
 * parent key. A receiver that lags is told its conversation changed, which
 * is always safe because the relay re-reads the full document anyway.
 *
 * # Thread Safety
 *
 * All state lives behind one `Arc<RwLock<>>`; the store is cheap to clone.
 */
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{
    CalendarEvent, ChangeListener, ChangeNotification, Community, ConversationDoc,
    ConversationStore, ConversationWriter, Member, MembershipSource, OperationType, StoreError,
    StoreResult,
};
use crate::shared::{Message, ParentKey, SenderProfile};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum ChangeSignal {
    Changed(ChangeNotification),
    Failed(String),
}

#[derive(Debug, Clone)]
struct UserRecord {
    name: String,
    avatar: Option<String>,
}

#[derive(Debug, Clone)]
struct CommunityRecord {
    creator_id: Uuid,
    /// (user id, presence flag) in join order
    members: Vec<(Uuid, bool)>,
}

#[derive(Debug, Clone, Default)]
struct StoredConversation {
    messages: Vec<Message>,
    revision: u64,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    communities: HashMap<Uuid, CommunityRecord>,
    events: HashMap<Uuid, CalendarEvent>,
    conversations: HashMap<ParentKey, StoredConversation>,
    /// Set by `fail_conversation_creates`
    create_failure: Option<String>,
}

impl Inner {
    fn resolve_sender(&self, message: &Message) -> Message {
        match self.users.get(&message.sender_id) {
            Some(user) => message.clone().with_sender(SenderProfile {
                id: message.sender_id,
                name: user.name.clone(),
                avatar: user.avatar.clone(),
            }),
            None => message.clone(),
        }
    }

    fn event_status(&self, key: &ParentKey) -> Option<String> {
        key.event_id
            .and_then(|event_id| self.events.get(&event_id))
            .map(|event| event.status.clone())
    }

    fn to_doc(&self, key: &ParentKey, stored: &StoredConversation) -> ConversationDoc {
        ConversationDoc {
            key: *key,
            messages: stored
                .messages
                .iter()
                .map(|message| self.resolve_sender(message))
                .collect(),
            status: self.event_status(key),
            revision: stored.revision,
        }
    }
}

/// Bookkeeping for watch handles, used to verify cleanup
#[derive(Debug, Default)]
struct ListenerStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Store kept entirely in process memory
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    changes: broadcast::Sender<ChangeSignal>,
    stats: Arc<ListenerStats>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            changes,
            stats: Arc::new(ListenerStats::default()),
        }
    }

    /// Register a user profile and return its id
    pub async fn add_user(&self, name: impl Into<String>, avatar: Option<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.users.insert(
            id,
            UserRecord {
                name: name.into(),
                avatar,
            },
        );
        id
    }

    /// Register a community owned by `creator_id` and return its id
    pub async fn add_community(&self, creator_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.communities.insert(
            id,
            CommunityRecord {
                creator_id,
                members: Vec::new(),
            },
        );
        id
    }

    /// Add a member to a community (or update their presence if present)
    pub async fn add_member(&self, community_id: Uuid, user_id: Uuid, online: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let community = inner
            .communities
            .get_mut(&community_id)
            .ok_or_else(|| StoreError::NotFound(format!("community {}", community_id)))?;
        match community.members.iter_mut().find(|(id, _)| *id == user_id) {
            Some(entry) => entry.1 = online,
            None => community.members.push((user_id, online)),
        }
        Ok(())
    }

    /// Add a calendar event to a community and return its id
    pub async fn add_calendar_event(&self, community_id: Uuid, status: impl Into<String>) -> StoreResult<Uuid> {
        let mut inner = self.inner.write().await;
        if !inner.communities.contains_key(&community_id) {
            return Err(StoreError::NotFound(format!("community {}", community_id)));
        }
        let id = Uuid::new_v4();
        inner.events.insert(
            id,
            CalendarEvent {
                id,
                community_id,
                status: status.into(),
            },
        );
        Ok(id)
    }

    /// Make every live change listener report a failure
    pub fn fail_listeners(&self, message: impl Into<String>) {
        let _ = self.changes.send(ChangeSignal::Failed(message.into()));
    }

    /// Make every later `create_conversation` call fail with `message`
    pub async fn fail_conversation_creates(&self, message: impl Into<String>) {
        self.inner.write().await.create_failure = Some(message.into());
    }

    /// Number of watch handles handed out so far
    pub fn opened_listener_count(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    /// Number of watch handles explicitly closed so far
    pub fn closed_listener_count(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    fn publish(&self, operation: OperationType, key: ParentKey) {
        match self.changes.send(ChangeSignal::Changed(ChangeNotification { operation, key })) {
            Ok(receivers) => {
                tracing::debug!("[Store] {:?} on {} delivered to {} listeners", operation, key, receivers);
            }
            Err(_) => {
                tracing::trace!("[Store] {:?} on {} had no listeners", operation, key);
            }
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_community(&self, community_id: Uuid) -> StoreResult<Option<Community>> {
        let inner = self.inner.read().await;
        Ok(inner.communities.get(&community_id).map(|record| Community {
            id: community_id,
            creator_id: record.creator_id,
            member_ids: record.members.iter().map(|(id, _)| *id).collect(),
        }))
    }

    async fn find_calendar_event(
        &self,
        community_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<CalendarEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .get(&event_id)
            .filter(|event| event.community_id == community_id)
            .cloned())
    }

    async fn find_conversation(&self, key: &ParentKey) -> StoreResult<Option<ConversationDoc>> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .get(key)
            .map(|stored| inner.to_doc(key, stored)))
    }

    async fn create_conversation(&self, key: &ParentKey) -> StoreResult<ConversationDoc> {
        let mut inner = self.inner.write().await;
        if let Some(message) = &inner.create_failure {
            return Err(StoreError::Write(message.clone()));
        }
        let stored = inner.conversations.entry(*key).or_default().clone();
        Ok(inner.to_doc(key, &stored))
    }

    async fn watch(&self, key: &ParentKey) -> StoreResult<Box<dyn ChangeListener>> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryListener {
            key: *key,
            receiver: Some(self.changes.subscribe()),
            stats: self.stats.clone(),
        }))
    }
}

#[async_trait]
impl MembershipSource for MemoryStore {
    async fn members(&self, community_id: Uuid) -> StoreResult<Vec<Member>> {
        let inner = self.inner.read().await;
        let community = inner
            .communities
            .get(&community_id)
            .ok_or_else(|| StoreError::NotFound(format!("community {}", community_id)))?;

        Ok(community
            .members
            .iter()
            .filter_map(|(user_id, online)| {
                inner.users.get(user_id).map(|user| Member {
                    id: *user_id,
                    name: user.name.clone(),
                    avatar: user.avatar.clone(),
                    online: *online,
                })
            })
            .collect())
    }
}

#[async_trait]
impl ConversationWriter for MemoryStore {
    async fn append_message(
        &self,
        key: &ParentKey,
        sender_id: Uuid,
        content: &str,
    ) -> StoreResult<Message> {
        let resolved = {
            let mut inner = self.inner.write().await;
            let message = Message {
                id: Uuid::new_v4(),
                sender_id,
                sender: None,
                content: content.to_string(),
                created_at: Utc::now(),
            };
            let stored = inner.conversations.entry(*key).or_default();
            stored.messages.push(message.clone());
            stored.revision += 1;
            inner.resolve_sender(&message)
        };
        self.publish(OperationType::Insert, *key);
        Ok(resolved)
    }

    async fn delete_message(&self, key: &ParentKey, message_id: Uuid) -> StoreResult<bool> {
        let removed = {
            let mut inner = self.inner.write().await;
            match inner.conversations.get_mut(key) {
                Some(stored) => {
                    let before = stored.messages.len();
                    stored.messages.retain(|message| message.id != message_id);
                    let removed = stored.messages.len() < before;
                    if removed {
                        stored.revision += 1;
                    }
                    removed
                }
                None => false,
            }
        };
        if removed {
            self.publish(OperationType::Delete, *key);
        }
        Ok(removed)
    }

    async fn set_presence(&self, community_id: Uuid, user_id: Uuid, online: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let community = inner
            .communities
            .get_mut(&community_id)
            .ok_or_else(|| StoreError::NotFound(format!("community {}", community_id)))?;
        let entry = community
            .members
            .iter_mut()
            .find(|(id, _)| *id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("membership of {} in {}", user_id, community_id)))?;
        // Presence is a plain field write; nothing is published for it.
        entry.1 = online;
        Ok(())
    }

    async fn set_event_status(
        &self,
        community_id: Uuid,
        event_id: Uuid,
        status: &str,
    ) -> StoreResult<()> {
        let key = ParentKey::calendar_event(community_id, event_id);
        {
            let mut inner = self.inner.write().await;
            let event = inner
                .events
                .get_mut(&event_id)
                .filter(|event| event.community_id == community_id)
                .ok_or_else(|| StoreError::NotFound(format!("calendar event {}", event_id)))?;
            event.status = status.to_string();
            if let Some(stored) = inner.conversations.get_mut(&key) {
                stored.revision += 1;
            }
        }
        self.publish(OperationType::Update, key);
        Ok(())
    }
}

struct MemoryListener {
    key: ParentKey,
    receiver: Option<broadcast::Receiver<ChangeSignal>>,
    stats: Arc<ListenerStats>,
}

#[async_trait]
impl ChangeListener for MemoryListener {
    async fn next(&mut self) -> Option<StoreResult<ChangeNotification>> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(ChangeSignal::Changed(notification)) if notification.key == self.key => {
                    return Some(Ok(notification));
                }
                Ok(ChangeSignal::Changed(_)) => continue,
                Ok(ChangeSignal::Failed(message)) => {
                    return Some(Err(StoreError::Listener(message)));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("[Store] Listener for {} lagged, skipped {} signals", self.key, skipped);
                    return Some(Ok(ChangeNotification::resync(self.key)));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn close(&mut self) {
        if self.receiver.take().is_some() {
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
