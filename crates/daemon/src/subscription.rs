//! Subscription matching and fan-out
//!
//! A subscription is a filter over announced publications plus a
//! delivery channel. Match sets are seeded against the current mirror
//! table when the subscription is created and re-evaluated on every
//! schema frame; value frames fan out to every subscription whose match
//! set holds the guid.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use beacon_protocol::{Frame, Layer, Nature, Publication, Scope};

use crate::mirror::MirrorTable;

/// Filter over announced publications
///
/// All present fields must match (AND); an empty pattern matches
/// everything. The metadata fields match if any element of the
/// publication carries the value.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    /// Substring of the publication title
    pub title_contains: Option<String>,
    /// At least one element from this layer
    pub layer: Option<Layer>,
    /// At least one element with this nature
    pub nature: Option<Nature>,
    /// At least one element with this scope
    pub scope: Option<Scope>,
}

impl Pattern {
    /// Match everything
    pub fn any() -> Self {
        Self::default()
    }

    /// Builder-style title filter
    pub fn title(mut self, needle: impl Into<String>) -> Self {
        self.title_contains = Some(needle.into());
        self
    }

    /// Builder-style layer filter
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Builder-style nature filter
    pub fn nature(mut self, nature: Nature) -> Self {
        self.nature = Some(nature);
        self
    }

    /// Builder-style scope filter
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Evaluate against a publication's title and element metadata
    pub fn matches(&self, publication: &Publication) -> bool {
        if let Some(needle) = &self.title_contains {
            if !publication.title().contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(layer) = self.layer {
            if !publication.elements().iter().any(|e| e.meta().layer == layer) {
                return false;
            }
        }
        if let Some(nature) = self.nature {
            if !publication.elements().iter().any(|e| e.meta().nature == nature) {
                return false;
            }
        }
        if let Some(scope) = self.scope {
            if !publication.elements().iter().any(|e| e.meta().scope == scope) {
                return false;
            }
        }
        true
    }
}

struct Subscription {
    pattern: Pattern,
    delivery: mpsc::Sender<Arc<Frame>>,
    match_set: Mutex<HashSet<u64>>,
}

/// Caller's side of a subscription: its id and the frame stream
pub struct SubHandle {
    pub id: u64,
    pub frames: mpsc::Receiver<Arc<Frame>>,
}

/// Registry of active subscriptions
#[derive(Default)]
pub struct SubTable {
    subs: RwLock<HashMap<u64, Arc<Subscription>>>,
    next_id: AtomicU64,
}

impl SubTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active subscriptions
    pub fn len(&self) -> usize {
        self.subs.read().len()
    }

    /// Whether no subscriptions are registered
    pub fn is_empty(&self) -> bool {
        self.subs.read().is_empty()
    }

    /// Register a subscription and seed its match set from the mirrors
    ///
    /// `capacity` bounds the delivery channel; a slow subscriber loses
    /// frames rather than stalling the bus.
    pub fn subscribe(&self, pattern: Pattern, capacity: usize, mirrors: &MirrorTable) -> SubHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (delivery, frames) = mpsc::channel(capacity.max(1));

        let mut seeded = HashSet::new();
        mirrors.for_each(|guid, publication| {
            if pattern.matches(publication) {
                seeded.insert(guid);
            }
        });
        debug!(id, matched = seeded.len(), "subscription registered");

        self.subs.write().insert(
            id,
            Arc::new(Subscription {
                pattern,
                delivery,
                match_set: Mutex::new(seeded),
            }),
        );
        SubHandle { id, frames }
    }

    /// Remove a subscription; unknown ids are a no-op
    pub fn unsubscribe(&self, id: u64) {
        self.subs.write().remove(&id);
    }

    /// The guids a subscription currently matches
    pub fn match_set(&self, id: u64) -> Option<HashSet<u64>> {
        self.subs
            .read()
            .get(&id)
            .map(|sub| sub.match_set.lock().clone())
    }

    /// Re-evaluate every subscription after a schema change
    ///
    /// A re-announce can change metadata, so membership may be gained
    /// or lost; both directions update the match set.
    pub fn reevaluate(&self, guid: u64, publication: &Publication) {
        for sub in self.subs.read().values() {
            let matched = sub.pattern.matches(publication);
            let mut set = sub.match_set.lock();
            if matched {
                set.insert(guid);
            } else {
                set.remove(&guid);
            }
        }
    }

    /// Remove a destroyed publication from every match set
    pub fn drop_pub(&self, guid: u64) {
        for sub in self.subs.read().values() {
            sub.match_set.lock().remove(&guid);
        }
    }

    /// Fan a frame out to every subscription matching its guid
    ///
    /// Delivery is best-effort: a full or closed channel is skipped (a
    /// concurrently-unsubscribed subscription is a no-op, not an error).
    /// Returns how many subscribers received the frame.
    pub fn forward(&self, frame: &Arc<Frame>) -> usize {
        let guid = frame.header.pub_guid;
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, sub) in self.subs.read().iter() {
            if !sub.match_set.lock().contains(&guid) {
                continue;
            }
            match sub.delivery.try_send(Arc::clone(frame)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(sub = id, guid, "subscriber backlogged, frame skipped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
            }
        }

        if !dead.is_empty() {
            let mut subs = self.subs.write();
            for id in dead {
                subs.remove(&id);
            }
        }
        delivered
    }
}
