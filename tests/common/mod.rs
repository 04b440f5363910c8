//! Common test utilities and helpers
//!
//! - `Fixture` seeds an in-memory community with a creator, an online member
//!   and an offline member, and builds an `EventRelay` over it
//! - `next_event` / `expect_silence` read a subscription with a timeout
//!   (tests run on tokio's paused clock, so timeouts cost no wall time)

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use community_relay::backend::relay::{EventRelay, RelaySubscription};
use community_relay::backend::server::config::RelayConfig;
use community_relay::backend::store::{ConversationWriter, MemoryStore};
use community_relay::shared::{Message, ParentKey, RelayEvent};
use uuid::Uuid;

/// Long enough for several presence ticks at the default interval
pub const SILENCE: Duration = Duration::from_secs(30);

pub struct Fixture {
    pub store: MemoryStore,
    pub relay: EventRelay,
    pub community: Uuid,
    pub creator: Uuid,
    /// Member that starts online
    pub u1: Uuid,
    /// Member that starts offline
    pub u2: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(RelayConfig::default()).await
    }

    pub async fn with_config(config: RelayConfig) -> Self {
        let store = MemoryStore::new();
        let creator = store.add_user("Creator", None).await;
        let u1 = store.add_user("U1", Some("u1.png".to_string())).await;
        let u2 = store.add_user("U2", None).await;

        let community = store.add_community(creator).await;
        store.add_member(community, u1, true).await.unwrap();
        store.add_member(community, u2, false).await.unwrap();

        let relay = EventRelay::new(Arc::new(store.clone()), config);
        Self {
            store,
            relay,
            community,
            creator,
            u1,
            u2,
        }
    }

    pub fn chat(&self) -> ParentKey {
        ParentKey::community(self.community)
    }

    pub async fn post(&self, key: &ParentKey, sender: Uuid, content: &str) -> Message {
        self.store.append_message(key, sender, content).await.unwrap()
    }

    pub async fn subscribe(&self, key: ParentKey) -> RelaySubscription {
        self.relay.subscribe(key, self.u1).await.unwrap()
    }

    /// Wait until every session task has finished
    pub async fn wait_for_sessions_to_end(&self) {
        for _ in 0..100 {
            if self.relay.active_sessions() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} relay sessions still active", self.relay.active_sessions());
    }
}

/// Next event, failing the test if none arrives within `SILENCE`
pub async fn next_event(subscription: &mut RelaySubscription) -> RelayEvent {
    match tokio::time::timeout(SILENCE, subscription.next_frame()).await {
        Ok(Some(frame)) => frame.event,
        Ok(None) => panic!("subscription ended"),
        Err(_) => panic!("no event within {:?}", SILENCE),
    }
}

/// Assert that nothing is emitted for `duration`
pub async fn expect_silence(subscription: &mut RelaySubscription, duration: Duration) {
    if let Ok(Some(frame)) = tokio::time::timeout(duration, subscription.next_frame()).await {
        panic!("unexpected {} event: {:?}", frame.event.name(), frame.event);
    }
}

pub fn contents(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.content.as_str()).collect()
}
