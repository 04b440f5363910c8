/**
 * Event Relay Service
 *
 * Entry point of the relay. `subscribe` validates the parent key, registers
 * the change listener, loads (or lazily creates) the conversation, samples
 * presence and hands all of it to a freshly spawned `RelaySession`. Every
 * failure here is returned before the first stream byte.
 *
 * # Ordering
 *
 * The listener is registered before the conversation is read. A write that
 * lands between the two is then seen twice (once in the snapshot, once as a
 * notification whose re-read diffs to nothing) instead of not at all.
 */
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::presence::presence_snapshot;
use super::session::{RelaySession, SessionSeed, SessionState};
use crate::backend::error::BackendError;
use crate::backend::server::config::RelayConfig;
use crate::backend::store::{
    ChangeListener, Community, ConversationDoc, ConversationStore, MembershipSource, RelayStore,
};
use crate::shared::{ParentKey, PresenceUser, RelayFrame};

/// Process-wide relay; cheap to clone
#[derive(Clone)]
pub struct EventRelay {
    store: Arc<dyn ConversationStore>,
    members: Arc<dyn MembershipSource>,
    config: RelayConfig,
    active: Arc<AtomicUsize>,
}

/// Receiving side of one subscription
///
/// Dropping it disconnects the client: the session notices, closes its
/// listener and exits.
pub struct RelaySubscription {
    key: ParentKey,
    frames: mpsc::Receiver<RelayFrame>,
    state: watch::Receiver<SessionState>,
}

impl RelaySubscription {
    pub fn key(&self) -> ParentKey {
        self.key
    }

    /// Next frame, or `None` once the session has ended
    pub async fn next_frame(&mut self) -> Option<RelayFrame> {
        self.frames.recv().await
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions of the session
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

impl EventRelay {
    pub fn new<S>(store: Arc<S>, config: RelayConfig) -> Self
    where
        S: RelayStore + 'static,
    {
        Self {
            store: store.clone(),
            members: store,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Sessions whose task has not finished yet
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Member-or-creator check for a community
    ///
    /// Used as the route guard of the community chat stream and inline by
    /// `subscribe` for calendar-event streams.
    pub async fn authorize_community(
        &self,
        community_id: Uuid,
        caller: Uuid,
    ) -> Result<Community, BackendError> {
        let community = self
            .store
            .find_community(community_id)
            .await?
            .ok_or_else(|| BackendError::not_found("Community"))?;

        if !community.is_member_or_creator(caller) {
            tracing::info!(
                "[Relay] Caller {} is not a member of community {}",
                caller,
                community_id
            );
            return Err(BackendError::forbidden(
                "You must be a member of this community to view it",
            ));
        }
        Ok(community)
    }

    /// Open a relay stream for `key` on behalf of `caller`
    ///
    /// For community keys the caller is expected to have passed
    /// `authorize_community` already; calendar-event keys are checked here.
    pub async fn subscribe(
        &self,
        key: ParentKey,
        caller: Uuid,
    ) -> Result<RelaySubscription, BackendError> {
        match key.event_id {
            None => {
                if self.store.find_community(key.community_id).await?.is_none() {
                    return Err(BackendError::not_found("Community"));
                }
            }
            Some(event_id) => {
                let community = self
                    .store
                    .find_community(key.community_id)
                    .await?
                    .ok_or_else(|| BackendError::not_found("Community"))?;
                if self
                    .store
                    .find_calendar_event(key.community_id, event_id)
                    .await?
                    .is_none()
                {
                    return Err(BackendError::not_found("Calendar event"));
                }
                if !community.is_member_or_creator(caller) {
                    tracing::info!("[Relay] Caller {} rejected for {}", caller, key);
                    return Err(BackendError::forbidden(
                        "You must be a member of this community to view its events",
                    ));
                }
            }
        }

        let mut listener = self.store.watch(&key).await.map_err(|e| {
            tracing::error!("[Relay] Failed to register change listener for {}: {}", key, e);
            BackendError::from(e)
        })?;

        let (conversation, online_users) = match self.load_initial(&key).await {
            Ok(initial) => initial,
            Err(e) => {
                listener.close();
                return Err(e);
            }
        };

        let (tx, frames) = mpsc::channel(self.config.channel_capacity());
        let (state_tx, state) = watch::channel(SessionState::Connecting);

        tracing::info!(
            "[Relay] {} subscribed by {} ({} messages, {} online)",
            key,
            caller,
            conversation.messages.len(),
            online_users.len()
        );

        let session = RelaySession::new(
            SessionSeed {
                key,
                listener,
                conversation,
                online_users,
            },
            self.store.clone(),
            self.members.clone(),
            self.config.clone(),
            tx,
            state_tx,
            self.active.clone(),
        );
        tokio::spawn(session.run());

        Ok(RelaySubscription { key, frames, state })
    }

    async fn load_initial(
        &self,
        key: &ParentKey,
    ) -> Result<(ConversationDoc, Vec<PresenceUser>), BackendError> {
        let conversation = match self.store.find_conversation(key).await? {
            Some(doc) => doc,
            None => self.store.create_conversation(key).await.map_err(|e| {
                tracing::error!("[Relay] Failed to create conversation for {}: {}", key, e);
                BackendError::transient_write(format!("Failed to create conversation: {}", e))
            })?,
        };

        let online_users = presence_snapshot(self.members.as_ref(), key.community_id).await?;
        Ok((conversation, online_users))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::store::MemoryStore;
    use axum::http::StatusCode;

    async fn seeded() -> (MemoryStore, Uuid, Uuid, Uuid) {
        let store = MemoryStore::new();
        let creator = store.add_user("Creator", None).await;
        let member = store.add_user("Member", None).await;
        let community = store.add_community(creator).await;
        store.add_member(community, member, true).await.unwrap();
        (store, community, creator, member)
    }

    #[tokio::test]
    async fn test_authorize_community() {
        let (store, community, creator, member) = seeded().await;
        let relay = EventRelay::new(Arc::new(store), RelayConfig::default());

        assert!(relay.authorize_community(community, creator).await.is_ok());
        assert!(relay.authorize_community(community, member).await.is_ok());

        let err = relay.authorize_community(community, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = relay.authorize_community(Uuid::new_v4(), creator).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let (store, community, creator, _) = seeded().await;
        let relay = EventRelay::new(Arc::new(store), RelayConfig::default());

        let key = ParentKey::calendar_event(community, Uuid::new_v4());
        let err = relay.subscribe(key, creator).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejected_subscribe_opens_no_listener() {
        let (store, community, _, _) = seeded().await;
        let event = store.add_calendar_event(community, "scheduled").await.unwrap();
        let relay = EventRelay::new(Arc::new(store.clone()), RelayConfig::default());

        let key = ParentKey::calendar_event(community, event);
        let err = relay.subscribe(key, Uuid::new_v4()).await.err().unwrap();

        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(store.opened_listener_count(), 0);
        assert_eq!(relay.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_creates_conversation_lazily() {
        let (store, community, creator, _) = seeded().await;
        let relay = EventRelay::new(Arc::new(store.clone()), RelayConfig::default());
        let key = ParentKey::community(community);

        assert!(store.find_conversation(&key).await.unwrap().is_none());

        let mut subscription = relay.subscribe(key, creator).await.unwrap();
        let frame = subscription.next_frame().await.unwrap();

        assert_eq!(frame.event.name(), "initial");
        assert!(store.find_conversation(&key).await.unwrap().is_some());
        assert_eq!(subscription.key(), key);
    }
}
