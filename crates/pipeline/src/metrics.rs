//! Ring queue metrics
//!
//! Atomic counters shared between enqueuers and the drain task. All
//! operations use relaxed ordering; values are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one ring queue
#[derive(Debug, Default)]
pub struct RingMetrics {
    /// Frames accepted into the ring
    enqueued: AtomicU64,

    /// Frames handed to the transport
    drained: AtomicU64,

    /// Frames rejected because the ring was full
    dropped_overflow: AtomicU64,

    /// Oldest frames evicted to make room for immediate traffic
    evicted: AtomicU64,

    /// Frames invalidated by publication destruction before send
    discarded: AtomicU64,

    /// Transport send failures observed by the drain task
    send_failures: AtomicU64,

    /// Acknowledge frames matched to a waiting send
    acks_received: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingMetricsSnapshot {
    pub enqueued: u64,
    pub drained: u64,
    pub dropped_overflow: u64,
    pub evicted: u64,
    pub discarded: u64,
    pub send_failures: u64,
    pub acks_received: u64,
}

impl RingMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            dropped_overflow: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            acks_received: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_drained(&self) {
        self.drained.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overflow(&self) {
        self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ack(&self) {
        self.acks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters
    pub fn snapshot(&self) -> RingMetricsSnapshot {
        RingMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
        }
    }
}
