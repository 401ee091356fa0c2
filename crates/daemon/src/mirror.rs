//! Mirror table - remote publications rebuilt from announce frames
//!
//! The daemon's copy of every publication announced to it, keyed by
//! guid. Schema frames create or wholesale-replace mirrors (a
//! re-announce invalidates every index assumption from before it);
//! value frames are applied delta by delta.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use beacon_protocol::{decode_announce, repack, Frame, MsgType, Publication};

use crate::{DaemonError, Result};

/// What applying an announce did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First announce for this guid
    Created,
    /// Existing mirror replaced with a new schema version
    Replaced,
}

/// Guid-keyed table of mirrored publications
#[derive(Default)]
pub struct MirrorTable {
    mirrors: RwLock<HashMap<u64, Arc<Mutex<Publication>>>>,
}

impl MirrorTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mirrored publications
    pub fn len(&self) -> usize {
        self.mirrors.read().len()
    }

    /// Whether nothing is mirrored
    pub fn is_empty(&self) -> bool {
        self.mirrors.read().is_empty()
    }

    /// Look up a mirror by guid
    pub fn get(&self, guid: u64) -> Option<Arc<Mutex<Publication>>> {
        self.mirrors.read().get(&guid).cloned()
    }

    /// Apply an Announce or Reannounce frame
    ///
    /// Validates the payload completely before touching the table, then
    /// creates or replaces the mirror. Replacement never merges: the new
    /// schema list is the whole truth and the name index is rebuilt.
    pub fn apply_announce(&self, frame: &Frame) -> Result<ApplyOutcome> {
        debug_assert!(matches!(
            frame.header.msg_type,
            MsgType::Announce | MsgType::Reannounce
        ));
        let guid = frame.header.pub_guid;
        let version = frame.header.version;
        let body = decode_announce(&frame.payload)?;
        let element_count = body.elements.len();

        let mut mirrors = self.mirrors.write();
        let outcome = match mirrors.get(&guid) {
            Some(existing) => {
                body.replace_into(&mut existing.lock(), version);
                ApplyOutcome::Replaced
            }
            None => {
                mirrors.insert(guid, Arc::new(Mutex::new(body.into_mirror(guid, version))));
                ApplyOutcome::Created
            }
        };
        drop(mirrors);

        debug!(guid, version, element_count, ?outcome, "announce applied");
        Ok(outcome)
    }

    /// Apply a Value frame to the mirror it addresses
    ///
    /// Returns `UnknownPub` when no mirror exists (the sender is ahead
    /// of us; the service answers with an announce request), and
    /// propagates `SchemaMismatch`/`TypeMismatch` from the delta codec.
    pub fn apply_publish(&self, frame: &Frame) -> Result<usize> {
        let guid = frame.header.pub_guid;
        let mirror = self.get(guid).ok_or(DaemonError::UnknownPub(guid))?;
        let applied = repack(&mut mirror.lock(), frame)?;
        Ok(applied)
    }

    /// Drop a mirror (Unannounce), returning whether one existed
    pub fn remove(&self, guid: u64) -> bool {
        self.mirrors.write().remove(&guid).is_some()
    }

    /// Run a closure over every mirror (subscription seeding, display)
    pub fn for_each(&self, mut f: impl FnMut(u64, &Publication)) {
        for (guid, mirror) in self.mirrors.read().iter() {
            f(*guid, &mirror.lock());
        }
    }
}
