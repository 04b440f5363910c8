//! Change-Event Translation
//!
//! Turns two successive reads of a conversation into the relay events a
//! subscriber needs to move from the first to the second.
//!
//! Two strategies are available:
//!
//! - [`DiffStrategy::MessageCount`] compares message counts. Growth emits the
//!   trailing surplus by position; shrinkage emits the ids in old minus new.
//!   A delete and an append between two reads cancel out and emit nothing.
//! - [`DiffStrategy::IdSet`] compares id sets on every read and reports
//!   removals and additions independently.

use std::collections::HashSet;

use serde::Deserialize;
use uuid::Uuid;

use crate::backend::store::ConversationDoc;
use crate::shared::{Message, RelayEvent};

/// How successive conversation reads are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategy {
    /// Length-based detection
    #[default]
    MessageCount,
    /// Full id-set comparison
    IdSet,
}

impl std::str::FromStr for DiffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "message_count" | "count" => Ok(Self::MessageCount),
            "id_set" | "ids" => Ok(Self::IdSet),
            other => Err(format!("unknown diff strategy: {}", other)),
        }
    }
}

/// Last-known conversation state of one subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub status: Option<String>,
    pub revision: u64,
}

impl From<ConversationDoc> for ConversationSnapshot {
    fn from(doc: ConversationDoc) -> Self {
        Self {
            messages: doc.messages,
            status: doc.status,
            revision: doc.revision,
        }
    }
}

impl ConversationSnapshot {
    fn ids(&self) -> HashSet<Uuid> {
        self.messages.iter().map(|message| message.id).collect()
    }
}

/// Events that take a subscriber from `previous` to `next`
///
/// `track_status` is set for calendar-event subscriptions only.
pub fn diff_snapshots(
    previous: &ConversationSnapshot,
    next: &ConversationSnapshot,
    strategy: DiffStrategy,
    track_status: bool,
) -> Vec<RelayEvent> {
    let mut events = match strategy {
        DiffStrategy::MessageCount => diff_by_count(previous, next),
        DiffStrategy::IdSet => diff_by_ids(previous, next),
    };

    if track_status && next.status != previous.status {
        if let Some(status) = &next.status {
            events.push(RelayEvent::StatusChange {
                status: status.clone(),
            });
        }
    }

    events
}

fn diff_by_count(previous: &ConversationSnapshot, next: &ConversationSnapshot) -> Vec<RelayEvent> {
    let old_len = previous.messages.len();
    let new_len = next.messages.len();

    if new_len > old_len {
        next.messages[old_len..]
            .iter()
            .cloned()
            .map(RelayEvent::NewMessage)
            .collect()
    } else if new_len < old_len {
        removed_ids(previous, &next.ids())
    } else {
        Vec::new()
    }
}

fn diff_by_ids(previous: &ConversationSnapshot, next: &ConversationSnapshot) -> Vec<RelayEvent> {
    let mut events = removed_ids(previous, &next.ids());
    let old_ids = previous.ids();
    events.extend(
        next.messages
            .iter()
            .filter(|message| !old_ids.contains(&message.id))
            .cloned()
            .map(RelayEvent::NewMessage),
    );
    events
}

fn removed_ids(previous: &ConversationSnapshot, current: &HashSet<Uuid>) -> Vec<RelayEvent> {
    previous
        .messages
        .iter()
        .filter(|message| !current.contains(&message.id))
        .map(|message| RelayEvent::DeleteMessage { id: message.id })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message(content: &str) -> Message {
        Message::new(Uuid::nil(), content)
    }

    fn snapshot(messages: &[Message]) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: messages.to_vec(),
            status: None,
            revision: 0,
        }
    }

    fn new_contents(events: &[RelayEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                RelayEvent::NewMessage(m) => Some(m.content.clone()),
                _ => None,
            })
            .collect()
    }

    fn deleted_ids(events: &[RelayEvent]) -> HashSet<Uuid> {
        events
            .iter()
            .filter_map(|event| match event {
                RelayEvent::DeleteMessage { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_append_emits_trailing_messages_in_order() {
        let (a, b, c, d) = (message("A"), message("B"), message("C"), message("D"));
        let events = diff_snapshots(
            &snapshot(&[a.clone(), b.clone()]),
            &snapshot(&[a, b, c, d]),
            DiffStrategy::MessageCount,
            false,
        );

        assert_eq!(events.len(), 2);
        assert_eq!(new_contents(&events), vec!["C", "D"]);
    }

    #[test]
    fn test_delete_emits_set_difference() {
        let (a, b, c) = (message("A"), message("B"), message("C"));
        let events = diff_snapshots(
            &snapshot(&[a.clone(), b.clone(), c.clone()]),
            &snapshot(&[b]),
            DiffStrategy::MessageCount,
            false,
        );

        assert_eq!(events.len(), 2);
        assert_eq!(deleted_ids(&events), HashSet::from([a.id, c.id]));
    }

    #[test]
    fn test_net_zero_change_is_invisible_to_count_strategy() {
        let (a, b, c) = (message("A"), message("B"), message("C"));
        let events = diff_snapshots(
            &snapshot(&[a, b.clone()]),
            &snapshot(&[b, c]),
            DiffStrategy::MessageCount,
            false,
        );

        assert!(events.is_empty());
    }

    #[test]
    fn test_net_zero_change_is_reported_by_id_set_strategy() {
        let (a, b, c) = (message("A"), message("B"), message("C"));
        let events = diff_snapshots(
            &snapshot(&[a.clone(), b.clone()]),
            &snapshot(&[b, c]),
            DiffStrategy::IdSet,
            false,
        );

        assert_eq!(deleted_ids(&events), HashSet::from([a.id]));
        assert_eq!(new_contents(&events), vec!["C"]);
    }

    #[test]
    fn test_status_change_only_when_tracked() {
        let mut before = snapshot(&[]);
        before.status = Some("scheduled".into());
        let mut after = snapshot(&[]);
        after.status = Some("live".into());

        assert!(diff_snapshots(&before, &after, DiffStrategy::MessageCount, false).is_empty());
        assert_eq!(
            diff_snapshots(&before, &after, DiffStrategy::MessageCount, true),
            vec![RelayEvent::StatusChange {
                status: "live".into()
            }]
        );
        assert!(diff_snapshots(&after, &after, DiffStrategy::MessageCount, true).is_empty());
    }

    #[test]
    fn test_unchanged_read_emits_nothing() {
        let a = message("A");
        let s = snapshot(&[a]);
        assert!(diff_snapshots(&s, &s, DiffStrategy::IdSet, true).is_empty());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("id_set".parse::<DiffStrategy>().unwrap(), DiffStrategy::IdSet);
        assert_eq!("COUNT".parse::<DiffStrategy>().unwrap(), DiffStrategy::MessageCount);
        assert!("bogus".parse::<DiffStrategy>().is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn append_emits_exactly_k_new_messages(n in 0usize..20, k in 0usize..20) {
                let all: Vec<Message> = (0..n + k).map(|i| message(&i.to_string())).collect();
                let events = diff_snapshots(
                    &snapshot(&all[..n]),
                    &snapshot(&all),
                    DiffStrategy::MessageCount,
                    false,
                );
                let expected: Vec<String> = all[n..].iter().map(|m| m.content.clone()).collect();
                prop_assert_eq!(events.len(), k);
                prop_assert_eq!(new_contents(&events), expected);
            }

            #[test]
            fn removal_emits_exactly_the_removed_ids(
                keep in proptest::collection::vec(any::<bool>(), 1..30)
            ) {
                let all: Vec<Message> = keep.iter().enumerate().map(|(i, _)| message(&i.to_string())).collect();
                let kept: Vec<Message> = all.iter().zip(&keep).filter(|(_, k)| **k).map(|(m, _)| m.clone()).collect();
                let removed: HashSet<Uuid> = all.iter().zip(&keep).filter(|(_, k)| !**k).map(|(m, _)| m.id).collect();

                let events = diff_snapshots(&snapshot(&all), &snapshot(&kept), DiffStrategy::MessageCount, false);
                prop_assert_eq!(events.len(), removed.len());
                prop_assert_eq!(deleted_ids(&events), removed);
            }
        }
    }
}
