//! Ring set - per-peer ring queue registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ring::{OverflowPolicy, RingQueue};
use crate::transport::PeerId;

/// Mapping from peer identity to its outbound ring queue
///
/// Queues are created lazily on first use and shared between the
/// publisher-side flush paths and the peer's drain task.
pub struct RingSet {
    capacity: usize,
    policy: OverflowPolicy,
    queues: RwLock<HashMap<PeerId, Arc<RingQueue>>>,
}

impl RingSet {
    /// Create an empty set; every queue gets the same capacity and policy
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            policy,
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Get the queue for a peer, creating it if absent
    pub fn queue_for(&self, peer: &PeerId) -> Arc<RingQueue> {
        if let Some(queue) = self.queues.read().get(peer) {
            return Arc::clone(queue);
        }
        let mut queues = self.queues.write();
        Arc::clone(
            queues
                .entry(peer.clone())
                .or_insert_with(|| Arc::new(RingQueue::new(self.capacity, self.policy))),
        )
    }

    /// Get the queue for a peer without creating it
    pub fn get(&self, peer: &PeerId) -> Option<Arc<RingQueue>> {
        self.queues.read().get(peer).cloned()
    }

    /// All current (peer, queue) pairs
    pub fn queues(&self) -> Vec<(PeerId, Arc<RingQueue>)> {
        self.queues
            .read()
            .iter()
            .map(|(p, q)| (p.clone(), Arc::clone(q)))
            .collect()
    }

    /// Invalidate queued frames for a destroyed publication on every queue
    ///
    /// Returns the total number of discarded frames.
    pub fn discard_pub(&self, guid: u64) -> usize {
        self.queues
            .read()
            .values()
            .map(|q| q.discard_pub(guid))
            .sum()
    }

    /// Seal every queue; used by teardown
    pub fn seal_all(&self) {
        for queue in self.queues.read().values() {
            queue.seal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_created_once_per_peer() {
        let set = RingSet::new(8, OverflowPolicy::default());
        let peer = PeerId::from("daemon:0");
        let a = set.queue_for(&peer);
        let b = set.queue_for(&peer);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(set.queues().len(), 1);
    }

    #[test]
    fn test_get_does_not_create() {
        let set = RingSet::new(8, OverflowPolicy::default());
        assert!(set.get(&PeerId::from("nobody")).is_none());
    }
}
