/**
 * Relay Session
 *
 * One spawned task per connected client. The task owns everything the
 * subscription needs: the change listener handle, the presence poll timer,
 * the last-known conversation state and the sending half of the client's
 * event channel. Because a single task `select!`s over every input, change
 * notifications are processed strictly one after another: a notification is
 * re-read, diffed and emitted before the next one is taken.
 *
 * # State Machine
 *
 * ```text
 * Connecting ──initial sent──▶ Streaming ──listener error──▶ Degraded
 *      │                           │                            │
 *      └───────────────────────────┴──disconnect / deadline─────┴──▶ Closed
 * ```
 *
 * `Degraded` keeps the presence poll (unless configured otherwise) but never
 * returns to `Streaming`. `Closed` is reached exactly once; teardown closes
 * the listener handle and drops the poll timer.
 */
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::diff::{diff_snapshots, ConversationSnapshot};
use super::presence::{presence_snapshot, PresenceTracker};
use crate::backend::server::config::RelayConfig;
use crate::backend::store::{
    ChangeListener, ChangeNotification, ConversationDoc, ConversationStore, MembershipSource,
    StoreResult,
};
use crate::shared::{ParentKey, PresenceUser, RelayEvent, RelayFrame};

/// Text of the in-band `error` event
pub const CHANGE_STREAM_ERROR: &str = "Change stream error";

/// Lifecycle of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Degraded,
    Closed,
}

pub(crate) struct RelaySession {
    key: ParentKey,
    store: Arc<dyn ConversationStore>,
    members: Arc<dyn MembershipSource>,
    config: RelayConfig,
    tx: mpsc::Sender<RelayFrame>,
    state_tx: watch::Sender<SessionState>,
    listener: Option<Box<dyn ChangeListener>>,
    last: ConversationSnapshot,
    presence: PresenceTracker,
    initial_online: Vec<PresenceUser>,
    active: Arc<AtomicUsize>,
    state: SessionState,
}

/// Inputs a session starts from, gathered before the stream opens
pub(crate) struct SessionSeed {
    pub key: ParentKey,
    pub listener: Box<dyn ChangeListener>,
    pub conversation: ConversationDoc,
    pub online_users: Vec<PresenceUser>,
}

async fn next_change(
    listener: &mut Option<Box<dyn ChangeListener>>,
) -> Option<StoreResult<ChangeNotification>> {
    match listener.as_mut() {
        Some(listener) => listener.next().await,
        None => std::future::pending().await,
    }
}

/// Returns `false` once the client is gone
async fn send_frame(
    tx: &mpsc::Sender<RelayFrame>,
    key: &ParentKey,
    revision: u64,
    event: RelayEvent,
) -> bool {
    tracing::trace!("[Relay] {} emitting {}", key, event.name());
    tx.send(RelayFrame::new(revision, event)).await.is_ok()
}

impl RelaySession {
    pub(crate) fn new(
        seed: SessionSeed,
        store: Arc<dyn ConversationStore>,
        members: Arc<dyn MembershipSource>,
        config: RelayConfig,
        tx: mpsc::Sender<RelayFrame>,
        state_tx: watch::Sender<SessionState>,
        active: Arc<AtomicUsize>,
    ) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            key: seed.key,
            store,
            members,
            config,
            tx,
            state_tx,
            listener: Some(seed.listener),
            last: seed.conversation.into(),
            presence: PresenceTracker::new(&seed.online_users),
            initial_online: seed.online_users,
            active,
            state: SessionState::Connecting,
        }
    }

    /// Drive the subscription until the client goes away or the deadline hits
    pub(crate) async fn run(mut self) {
        let initial = RelayEvent::Initial {
            messages: self.last.messages.clone(),
            online_users: std::mem::take(&mut self.initial_online),
        };
        if !self.emit(initial).await {
            self.shutdown("client disconnected before the snapshot was sent");
            return;
        }
        self.transition(SessionState::Streaming);

        let period = self.config.presence_interval();
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let max_duration = self.config.max_session_duration();
        let deadline = async move {
            match max_duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let reason = loop {
            let presence_active = self.presence_active();
            tokio::select! {
                _ = self.tx.closed() => break "client disconnected",
                _ = &mut deadline => break "maximum session duration reached",
                change = next_change(&mut self.listener) => {
                    if !self.on_change(change).await {
                        break "client disconnected";
                    }
                }
                _ = poll.tick(), if presence_active => {
                    if !self.on_presence_tick().await {
                        break "client disconnected";
                    }
                }
            }
        };

        self.shutdown(reason);
    }

    fn presence_active(&self) -> bool {
        !(self.state == SessionState::Degraded && self.config.stop_presence_when_degraded)
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("[Relay] {} {:?} -> {:?}", self.key, self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
    }

    async fn emit(&mut self, event: RelayEvent) -> bool {
        send_frame(&self.tx, &self.key, self.last.revision, event).await
    }

    async fn on_change(&mut self, change: Option<StoreResult<ChangeNotification>>) -> bool {
        match change {
            Some(Ok(notification)) if notification.key == self.key => self.refresh().await,
            Some(Ok(notification)) => {
                tracing::debug!("[Relay] {} ignoring change for {}", self.key, notification.key);
                true
            }
            Some(Err(e)) => self.degrade(&e.to_string()).await,
            None => self.degrade("change feed ended").await,
        }
    }

    /// Re-read the conversation and emit whatever changed since the last read
    async fn refresh(&mut self) -> bool {
        let doc = match self.store.find_conversation(&self.key).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                tracing::warn!("[Relay] {} conversation disappeared, treating it as empty", self.key);
                ConversationDoc::empty(self.key)
            }
            Err(e) => return self.degrade(&format!("re-read failed: {}", e)).await,
        };

        let next = ConversationSnapshot::from(doc);
        let events = diff_snapshots(
            &self.last,
            &next,
            self.config.diff_strategy,
            self.key.is_calendar_event(),
        );
        self.last = next;

        if !events.is_empty() {
            tracing::debug!(
                "[Relay] {} revision {} produced {} events",
                self.key,
                self.last.revision,
                events.len()
            );
        }
        for event in events {
            if !self.emit(event).await {
                return false;
            }
        }
        true
    }

    async fn degrade(&mut self, cause: &str) -> bool {
        tracing::warn!("[Relay] {} change listener failed ({}), message updates stop", self.key, cause);
        if let Some(mut listener) = self.listener.take() {
            listener.close();
        }
        self.transition(SessionState::Degraded);
        self.emit(RelayEvent::error(CHANGE_STREAM_ERROR)).await
    }

    async fn on_presence_tick(&mut self) -> bool {
        match presence_snapshot(self.members.as_ref(), self.key.community_id).await {
            Ok(users) => match self.presence.observe(users) {
                Some(changed) => {
                    tracing::debug!("[Relay] {} presence changed, {} online", self.key, changed.len());
                    self.emit(RelayEvent::OnlineUsers(changed)).await
                }
                None => true,
            },
            Err(e) => {
                tracing::warn!("[Relay] {} presence sample failed: {}", self.key, e);
                true
            }
        }
    }

    fn shutdown(&mut self, reason: &str) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut listener) = self.listener.take() {
            listener.close();
        }
        self.transition(SessionState::Closed);
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::info!("[Relay] {} subscription closed: {}", self.key, reason);
    }
}
