//! Presence Reconciliation
//!
//! Presence toggles are plain field writes with no change feed, so each
//! subscription samples the member list on a fixed interval and only emits
//! when the online set actually changed. Comparison is by value and ignores
//! member order.

use uuid::Uuid;

use crate::backend::store::{Member, MembershipSource, StoreResult};
use crate::shared::PresenceUser;

/// Online members of a community, projected to `{ id, name, avatar }`
pub async fn presence_snapshot(
    members: &dyn MembershipSource,
    community_id: Uuid,
) -> StoreResult<Vec<PresenceUser>> {
    Ok(online_users(&members.members(community_id).await?))
}

/// Keep the online members, in membership order
pub fn online_users(members: &[Member]) -> Vec<PresenceUser> {
    members
        .iter()
        .filter(|member| member.online)
        .map(Member::to_presence_user)
        .collect()
}

/// Order-independent signature of a presence snapshot
fn signature(users: &[PresenceUser]) -> Vec<PresenceUser> {
    let mut sorted = users.to_vec();
    sorted.sort();
    sorted
}

/// Remembers the last emitted presence snapshot of one subscription
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    last: Vec<PresenceUser>,
}

impl PresenceTracker {
    /// Start from the snapshot already sent in `initial`
    pub fn new(initial: &[PresenceUser]) -> Self {
        Self {
            last: signature(initial),
        }
    }

    /// Record a fresh sample
    ///
    /// Returns the snapshot to emit, or `None` if it equals the last one.
    pub fn observe(&mut self, current: Vec<PresenceUser>) -> Option<Vec<PresenceUser>> {
        let next = signature(&current);
        if next == self.last {
            return None;
        }
        self.last = next;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, online: bool) -> Member {
        Member {
            id: Uuid::new_v4(),
            name: name.to_string(),
            avatar: None,
            online,
        }
    }

    #[test]
    fn test_online_users_filters_and_projects() {
        let members = vec![member("U1", true), member("U2", false), member("U3", true)];
        let users = online_users(&members);

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "U1");
        assert_eq!(users[1].name, "U3");
    }

    #[test]
    fn test_identical_snapshot_is_not_reemitted() {
        let users = online_users(&[member("U1", true)]);
        let mut tracker = PresenceTracker::new(&users);

        assert!(tracker.observe(users.clone()).is_none());
    }

    #[test]
    fn test_reordered_snapshot_is_not_reemitted() {
        let users = online_users(&[member("U1", true), member("U2", true)]);
        let mut tracker = PresenceTracker::new(&users);

        let mut reversed = users.clone();
        reversed.reverse();
        assert!(tracker.observe(reversed).is_none());
    }

    #[test]
    fn test_changed_snapshot_is_emitted_once() {
        let u1 = member("U1", true);
        let u2 = member("U2", true);
        let mut tracker = PresenceTracker::new(&online_users(&[u1.clone()]));

        let both = online_users(&[u1, u2]);
        assert_eq!(tracker.observe(both.clone()), Some(both.clone()));
        assert!(tracker.observe(both).is_none());
    }

    #[test]
    fn test_profile_change_counts_as_change() {
        let mut u1 = member("U1", true);
        let mut tracker = PresenceTracker::new(&online_users(&[u1.clone()]));

        u1.avatar = Some("new.png".to_string());
        assert!(tracker.observe(online_users(&[u1])).is_some());
    }

    #[test]
    fn test_everyone_going_offline_is_a_change() {
        let u1 = member("U1", true);
        let mut tracker = PresenceTracker::new(&online_users(&[u1]));

        assert_eq!(tracker.observe(Vec::new()), Some(Vec::new()));
    }
}
