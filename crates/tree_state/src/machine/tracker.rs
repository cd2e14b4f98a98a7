//! ActivityTracker - Per-node in-flight bookkeeping
//!
//! Each completion call holds an `ActivityGuard` for the node it will
//! mutate. At most one guard exists per node; the guard releases its entry
//! when dropped. `forget` drops an entry early (node deleted), after which
//! the guard reports itself as no longer current and its result is stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tree_core::NodeId;

use super::states::NodeActivity;

#[derive(Debug, Clone, Copy)]
struct Activity {
    ticket: u64,
    state: NodeActivity,
}

#[derive(Debug, Default)]
struct Inner {
    active: DashMap<NodeId, Activity>,
    next_ticket: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    inner: Arc<Inner>,
}

/// Claim on a node for the duration of one completion call
#[derive(Debug)]
pub struct ActivityGuard {
    inner: Arc<Inner>,
    node_id: NodeId,
    ticket: u64,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `node_id`, or `None` if something is already in flight for it
    pub fn begin(&self, node_id: &NodeId, state: NodeActivity) -> Option<ActivityGuard> {
        match self.inner.active.entry(node_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst);
                slot.insert(Activity { ticket, state });
                Some(ActivityGuard {
                    inner: Arc::clone(&self.inner),
                    node_id: node_id.clone(),
                    ticket,
                })
            }
        }
    }

    pub fn is_busy(&self, node_id: &str) -> bool {
        self.inner.active.contains_key(node_id)
    }

    pub fn state(&self, node_id: &str) -> Option<NodeActivity> {
        self.inner.active.get(node_id).map(|a| a.state)
    }

    /// Drop the claim on `node_id`; its guard's result becomes stale
    pub fn forget(&self, node_id: &str) -> bool {
        self.inner.active.remove(node_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.active.is_empty()
    }

    /// In-flight nodes, oldest claim first
    pub fn active_nodes(&self) -> Vec<NodeId> {
        let mut active: Vec<(u64, NodeId)> = self
            .inner
            .active
            .iter()
            .map(|entry| (entry.value().ticket, entry.key().clone()))
            .collect();
        active.sort_by_key(|(ticket, _)| *ticket);
        active.into_iter().map(|(_, id)| id).collect()
    }

    /// Most recently claimed in-flight node
    pub fn latest(&self) -> Option<NodeId> {
        self.inner
            .active
            .iter()
            .max_by_key(|entry| entry.value().ticket)
            .map(|entry| entry.key().clone())
    }
}

impl ActivityGuard {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// False once the claim was forgotten
    pub fn is_current(&self) -> bool {
        self.inner
            .active
            .get(self.node_id.as_str())
            .is_some_and(|a| a.ticket == self.ticket)
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let ticket = self.ticket;
        self.inner
            .active
            .remove_if(self.node_id.as_str(), |_, a| a.ticket == ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_rejected() {
        let tracker = ActivityTracker::new();
        let id = NodeId::from("n1");

        let guard = tracker.begin(&id, NodeActivity::Asking).unwrap();
        assert!(tracker.begin(&id, NodeActivity::Asking).is_none());
        assert_eq!(tracker.state("n1"), Some(NodeActivity::Asking));

        drop(guard);
        assert!(!tracker.is_busy("n1"));
        assert!(tracker.begin(&id, NodeActivity::Asking).is_some());
    }

    #[test]
    fn test_forget_makes_guard_stale() {
        let tracker = ActivityTracker::new();
        let id = NodeId::from("n1");
        let guard = tracker.begin(&id, NodeActivity::Branching).unwrap();

        assert!(guard.is_current());
        assert!(tracker.forget("n1"));
        assert!(!guard.is_current());
    }

    #[test]
    fn test_stale_guard_does_not_release_newer_claim() {
        let tracker = ActivityTracker::new();
        let id = NodeId::from("n1");
        let old = tracker.begin(&id, NodeActivity::Asking).unwrap();
        tracker.forget("n1");

        let new = tracker.begin(&id, NodeActivity::Asking).unwrap();
        drop(old);
        assert!(new.is_current());
        assert!(tracker.is_busy("n1"));
    }

    #[test]
    fn test_latest_and_ordering() {
        let tracker = ActivityTracker::new();
        let _a = tracker.begin(&NodeId::from("a"), NodeActivity::Asking).unwrap();
        let _b = tracker.begin(&NodeId::from("b"), NodeActivity::ReAsking).unwrap();

        assert_eq!(tracker.latest(), Some(NodeId::from("b")));
        assert_eq!(tracker.active_nodes(), vec![NodeId::from("a"), NodeId::from("b")]);
        assert_eq!(NodeActivity::ReAsking.description(), "Starting new topic");
    }
}
