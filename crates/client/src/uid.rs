//! Unique-id allocation
//!
//! Every allocator instance owns a half-open id range and hands out
//! strictly increasing ids from it. Ranges never overlap: a daemon carves
//! disjoint blocks off its own range and grants them to clients, so ids
//! stay collision-free across the cluster without coordination.
//!
//! Exhaustion is surfaced, never wrapped; a fresh range requires a fresh
//! grant.

use parking_lot::Mutex;

use crate::{ClientError, Result};

struct Range {
    next: u64,
    max: u64,
}

/// Issues process- or cluster-scoped unique ids
pub struct UidAllocator {
    range: Mutex<Range>,
}

impl UidAllocator {
    /// Create an allocator over the inclusive range `[next, max]`
    pub fn new(next: u64, max: u64) -> Self {
        Self {
            range: Mutex::new(Range { next, max }),
        }
    }

    /// Issue the next id
    ///
    /// Ids are strictly increasing per allocator and never reissued,
    /// even after the owning object is freed.
    pub fn next_id(&self) -> Result<u64> {
        let mut range = self.range.lock();
        if range.next > range.max {
            return Err(ClientError::AllocationExhausted { max: range.max });
        }
        let id = range.next;
        range.next += 1;
        Ok(id)
    }

    /// Carve a block of `count` ids off the front of this range
    ///
    /// The returned allocator owns the block exclusively; this allocator
    /// continues after it.
    pub fn split_block(&self, count: u64) -> Result<UidAllocator> {
        let (start, count) = self.split_range(count)?;
        Ok(UidAllocator::new(start, start + count - 1))
    }

    /// Like `split_block`, but returns the raw `(start, count)` range
    ///
    /// Daemons use this to grant guid blocks over the wire without
    /// keeping an allocator for the granted side.
    pub fn split_range(&self, count: u64) -> Result<(u64, u64)> {
        let mut range = self.range.lock();
        if count == 0 {
            return Err(ClientError::AllocationExhausted { max: range.max });
        }
        let start = range.next;
        let end = start
            .checked_add(count)
            .filter(|end| end.saturating_sub(1) <= range.max)
            .ok_or(ClientError::AllocationExhausted { max: range.max })?;
        range.next = end;
        Ok((start, count))
    }

    /// Ids still available in this range
    pub fn remaining(&self) -> u64 {
        let range = self.range.lock();
        if range.next > range.max {
            0
        } else {
            range.max - range.next + 1
        }
    }
}
