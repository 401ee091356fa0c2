//! Publication handle - the application-facing publish API
//!
//! A `PubHandle` is a cheap, cloneable reference to one publication in
//! the runtime's table. All methods that mutate values only touch memory
//! under the publication's lock; network I/O happens in the background
//! tasks (or in `publish_immediately`, which forces the pack-and-enqueue
//! step inline).

use std::sync::Arc;

use beacon_protocol::{Frame, Metadata, MsgType, Priority, ValueData, ValueType};

use crate::runtime::{PubEntry, Runtime};
use crate::Result;

/// Handle to one publication
#[derive(Clone)]
pub struct PubHandle {
    runtime: Arc<Runtime>,
    guid: u64,
    entry: PubEntry,
}

impl PubHandle {
    pub(crate) fn new(runtime: Arc<Runtime>, guid: u64, entry: PubEntry) -> Self {
        Self {
            runtime,
            guid,
            entry,
        }
    }

    /// Globally unique publication id
    #[inline]
    pub fn guid(&self) -> u64 {
        self.guid
    }

    /// Publication title
    pub fn title(&self) -> String {
        self.entry.publication.lock().title().to_owned()
    }

    /// Current schema version
    pub fn version(&self) -> u32 {
        self.entry.publication.lock().version()
    }

    /// Number of declared elements
    pub fn element_count(&self) -> usize {
        self.entry.publication.lock().element_count()
    }

    /// Declare a new element
    ///
    /// Appends at the next index and bumps the schema version; the
    /// runtime re-announces automatically before the next value frame.
    pub fn add_element(
        &self,
        name: impl Into<String>,
        value_type: ValueType,
        meta: Metadata,
    ) -> Result<usize> {
        self.runtime.ensure_running()?;
        Ok(self.entry.publication.lock().add_element(name, value_type, meta)?)
    }

    /// Send the schema now
    ///
    /// First call emits Announce, later calls Reannounce. Idempotent:
    /// announcing an unchanged schema just repeats it.
    pub fn announce(&self) -> Result<()> {
        self.runtime.announce_entry(&self.entry)
    }

    /// Ask peers to drop their mirrors; the local publication stays
    pub fn unannounce(&self) -> Result<()> {
        self.runtime.ensure_running()?;
        let version = self.entry.publication.lock().version();
        let frame = Frame::empty(
            MsgType::Unannounce,
            self.runtime.role(),
            self.guid,
            version,
        );
        self.runtime.enqueue_upstream(frame, Priority::Immediate)
    }

    /// Write a value and mark the element dirty
    ///
    /// Never performs I/O; the value travels on the next flush tick.
    pub fn publish(&self, name: &str, value: impl Into<ValueData>) -> Result<()> {
        self.runtime.ensure_running()?;
        self.entry.publication.lock().write(name, value.into())?;
        Ok(())
    }

    /// Write a value and flush this publication's frame now
    ///
    /// Bypasses batching for low-latency signals; the frame is queued at
    /// immediate priority, so on an overflowing ring it evicts rather
    /// than being dropped.
    pub fn publish_immediately(&self, name: &str, value: impl Into<ValueData>) -> Result<()> {
        self.runtime.ensure_running()?;
        self.entry.publication.lock().write(name, value.into())?;
        self.runtime
            .flush_entry(&self.entry, Some(Priority::Immediate))?;
        Ok(())
    }

    /// Pack and enqueue pending values now instead of waiting for a tick
    ///
    /// Returns whether a frame was enqueued.
    pub fn flush(&self) -> Result<bool> {
        self.runtime.flush_entry(&self.entry, None)
    }

    /// Whether any element has unsent writes
    pub fn has_pending(&self) -> bool {
        self.entry.publication.lock().has_pending()
    }

    /// Read the current value of a named element
    pub fn get_val(&self, name: &str) -> Result<Option<ValueData>> {
        let publication = self.entry.publication.lock();
        Ok(publication.get_val(name)?.cloned())
    }

    /// Pretty-printed table of elements for inspection tools
    pub fn display_pub(&self) -> String {
        self.entry.publication.lock().display_pub()
    }

    /// (name, value) pairs for every non-empty element
    pub fn expand_data(&self) -> Vec<(String, ValueData)> {
        self.entry
            .publication
            .lock()
            .expand_data()
            .into_iter()
            .map(|(name, data)| (name.to_owned(), data.clone()))
            .collect()
    }

    /// Destroy the publication
    ///
    /// Unregisters it and invalidates queued-but-undrained frames.
    pub fn free(self) -> Result<()> {
        self.runtime.free_pub(self.guid)
    }
}

impl std::fmt::Debug for PubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubHandle")
            .field("guid", &self.guid)
            .finish()
    }
}
