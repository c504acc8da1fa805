//! Aggregate allocation statistics maintained under the tracker's lock.

/// Point-in-time view of the tracker's statistics, captured atomically under the lock.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct Snapshot {
    /// Cumulative number of successful acquisitions since the tracker was created.
    /// Never decreases.
    pub total_allocations: u64,

    /// Number of currently live allocations (size of the tracking table).
    pub live_allocations: u64,

    /// Bytes currently outstanding, counted in originally-requested sizes.
    pub allocated_size: u64,

    /// High-water mark of [`allocated_size`][Self::allocated_size]. Never decreases.
    pub max_allocated_size: u64,
}

/// The monotone counters behind [`Snapshot`]. The live-allocation count is not stored here;
/// the tracking table itself is its source of truth.
#[derive(Debug)]
pub(crate) struct Counters {
    total_allocations: u64,
    allocated_size: u64,
    max_allocated_size: u64,
}

impl Counters {
    pub(crate) const fn new() -> Self {
        Self {
            total_allocations: 0,
            allocated_size: 0,
            max_allocated_size: 0,
        }
    }

    pub(crate) fn total_allocations(&self) -> u64 {
        self.total_allocations
    }

    pub(crate) fn allocated_size(&self) -> u64 {
        self.allocated_size
    }

    pub(crate) fn max_allocated_size(&self) -> u64 {
        self.max_allocated_size
    }

    /// Records one successful acquisition of `size` bytes, raising the high-water mark if the
    /// new outstanding total exceeds it.
    pub(crate) fn record_acquire(&mut self, size: u64) {
        self.total_allocations = self
            .total_allocations
            .checked_add(1)
            .expect("total allocation count overflows u64 - this indicates an unrealistic scenario");

        self.allocated_size = self
            .allocated_size
            .checked_add(size)
            .expect("outstanding bytes overflow u64 - this indicates an unrealistic scenario");

        self.max_allocated_size = self.max_allocated_size.max(self.allocated_size);
    }

    /// Records the release of an allocation of `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds the outstanding total: a release of bytes that were never
    /// acquired means the accounting is corrupted and must not be trusted further.
    pub(crate) fn record_release(&mut self, size: u64) {
        self.allocated_size = self
            .allocated_size
            .checked_sub(size)
            .expect("released more bytes than are outstanding - allocation accounting is corrupted");
    }
}
