//! Ring queue - bounded buffer of outbound serialized frames
//!
//! One ring per outbound peer connection. Many publisher-side flush calls
//! may push concurrently; exactly one drain task pops. The ring never
//! reorders: priority decides what happens on overflow, not who goes first.
//!
//! Entry lifecycle: `Enqueued -> InFlight -> Acknowledged`, or `Dropped`
//! on overflow, or `Discarded` when the owning publication is destroyed
//! before the frame was sent.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use beacon_protocol::{Frame, MsgType, Priority};

use crate::metrics::RingMetrics;
use crate::{PipelineError, Result};

/// What to do when a frame arrives at a full ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Default/Low frames are rejected; Immediate frames evict the oldest
    #[default]
    EvictForImmediate,
    /// All overflow is rejected regardless of priority
    RejectAll,
    /// All overflow evicts the oldest entry
    EvictAll,
}

/// Queue entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Enqueued,
    InFlight,
    Acknowledged,
    Dropped,
    Discarded,
}

/// A serialized frame waiting in a ring
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    pub frame: Frame,
    pub priority: Priority,
    pub state: FrameState,
}

impl QueuedFrame {
    /// Wrap a frame for enqueueing
    pub fn new(frame: Frame, priority: Priority) -> Self {
        Self {
            frame,
            priority,
            state: FrameState::Enqueued,
        }
    }

    /// The publication this frame belongs to (0 for connection-scoped frames)
    #[inline]
    pub fn pub_guid(&self) -> u64 {
        self.frame.header.pub_guid
    }

    /// Message type shortcut
    #[inline]
    pub fn msg_type(&self) -> MsgType {
        self.frame.header.msg_type
    }
}

struct RingInner {
    buf: VecDeque<QueuedFrame>,
    sealed: bool,
}

/// Bounded circular buffer of outbound frames for one peer
///
/// # Invariants
///
/// - `len() <= capacity` always
/// - FIFO: frames leave in arrival order across all priority tiers
/// - Once sealed (a Shutdown frame accepted), all further pushes fail
pub struct RingQueue {
    capacity: usize,
    policy: OverflowPolicy,
    inner: Mutex<RingInner>,
    notify: Notify,
    metrics: Arc<RingMetrics>,
}

impl RingQueue {
    /// Create an empty ring with the given capacity and overflow policy
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            policy,
            inner: Mutex::new(RingInner {
                buf: VecDeque::with_capacity(capacity),
                sealed: false,
            }),
            notify: Notify::new(),
            metrics: Arc::new(RingMetrics::new()),
        }
    }

    /// Fixed capacity in frames
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued frames
    pub fn len(&self) -> usize {
        self.inner.lock().buf.len()
    }

    /// Whether the ring holds no frames
    pub fn is_empty(&self) -> bool {
        self.inner.lock().buf.is_empty()
    }

    /// Whether the ring stopped accepting frames
    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed
    }

    /// Shared metrics handle
    pub fn metrics(&self) -> Arc<RingMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Push a frame, applying the overflow policy when full
    ///
    /// A Shutdown frame is accepted like any other and then seals the
    /// ring: it is guaranteed to be the last frame this queue ever emits.
    pub fn push(&self, queued: QueuedFrame) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.sealed {
            return Err(PipelineError::QueueSealed);
        }

        if inner.buf.len() >= self.capacity {
            let evict = match self.policy {
                OverflowPolicy::EvictForImmediate => queued.priority == Priority::Immediate,
                OverflowPolicy::RejectAll => false,
                OverflowPolicy::EvictAll => true,
            };
            if !evict {
                self.metrics.record_overflow();
                return Err(PipelineError::QueueOverflow {
                    capacity: self.capacity,
                });
            }
            // evict exactly the oldest entry to make room
            if let Some(mut oldest) = inner.buf.pop_front() {
                oldest.state = FrameState::Dropped;
                self.metrics.record_evicted();
                tracing::debug!(
                    msg_type = %oldest.msg_type(),
                    pub_guid = oldest.pub_guid(),
                    "evicted oldest frame for immediate traffic"
                );
            }
        }

        let seals = queued.msg_type() == MsgType::Shutdown;
        inner.buf.push_back(queued);
        if seals {
            inner.sealed = true;
        }
        drop(inner);

        self.metrics.record_enqueued();
        self.notify.notify_one();
        Ok(())
    }

    /// Pop the oldest frame, marking it in flight
    pub fn pop(&self) -> Option<QueuedFrame> {
        let mut queued = self.inner.lock().buf.pop_front()?;
        queued.state = FrameState::InFlight;
        Some(queued)
    }

    /// Wait until a frame is available and pop it
    ///
    /// Returns `None` once the ring is sealed and fully drained. Only the
    /// single drain task may call this.
    pub async fn recv(&self) -> Option<QueuedFrame> {
        loop {
            // register for wakeup before checking, or a push between the
            // check and the await would be lost
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(mut queued) = inner.buf.pop_front() {
                    queued.state = FrameState::InFlight;
                    return Some(queued);
                }
                if inner.sealed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Invalidate all undrained frames belonging to a destroyed publication
    ///
    /// Returns how many frames were discarded.
    pub fn discard_pub(&self, guid: u64) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.buf.len();
        inner.buf.retain(|q| q.pub_guid() != guid);
        let removed = before - inner.buf.len();
        drop(inner);
        if removed > 0 {
            self.metrics.record_discarded(removed as u64);
        }
        removed
    }

    /// Seal the ring without a shutdown frame
    ///
    /// Used by teardown paths that discard rather than drain.
    pub fn seal(&self) {
        self.inner.lock().sealed = true;
        self.notify.notify_one();
    }

    /// Wake the drain task so it can observe a seal or cancellation
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}
