//! The allocation-tracking and fault-injection engine.

use std::alloc::{GlobalAlloc, System};
use std::fmt;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::{LazyLock, Mutex};

use foldhash::{HashSet, HashSetExt};

use crate::constants::ERR_POISONED_LOCK;
use crate::fault::FaultState;
use crate::record::{AllocationRecord, PAYLOAD_ALIGN};
use crate::statistics::Counters;
use crate::{Error, Result, Snapshot, raw};

/// State shared by every operation, mutated as one atomic unit per operation under the lock.
#[derive(Debug)]
struct TrackerInner {
    /// The tracking table: addresses of all currently live payload pointers. The single source
    /// of truth for "is this pointer ours" and for the live-allocation count.
    /// We use foldhash for better performance with small hash tables.
    live: HashSet<NonZero<usize>>,

    counters: Counters,
    fault: FaultState,
}

/// Tracks every live allocation made through it and simulates out-of-memory conditions on
/// demand.
///
/// The tracker wraps any [`GlobalAlloc`] implementation. Every successful
/// [`acquire()`][Self::acquire] registers the returned payload pointer in a tracking table and
/// prefixes it with a tagged record, so that [`release()`][Self::release] can validate pointer
/// provenance and detect corruption, and so that statistics reflect originally-requested sizes
/// rather than allocator rounding.
///
/// # Fault injection
///
/// [`set_fault_countdown()`][Self::set_fault_countdown] arms a countdown that is consulted
/// before every real acquisition (and at every [`error_point()`][Self::error_point]). When it
/// reaches the trigger, that checkpoint fails and the outstanding-byte total at that moment
/// becomes a latched ceiling: from then on, every request that would grow usage beyond the
/// ceiling keeps failing, so retry loops only make progress by shrinking demand or releasing
/// memory. This models sustained memory pressure deterministically.
///
/// # Examples
///
/// ```
/// use alloc_sentinel::MemoryTracker;
///
/// let tracker = MemoryTracker::system();
///
/// let payload = tracker.acquire(64)?.expect("non-zero request yields a pointer");
/// assert_eq!(tracker.live_allocations(), 1);
/// assert_eq!(tracker.allocated_size(), 64);
///
/// tracker.release(Some(payload));
/// assert_eq!(tracker.live_allocations(), 0);
/// # Ok::<(), alloc_sentinel::Error>(())
/// ```
///
/// # Thread safety
///
/// All operations take one internal lock for their entire body, so concurrent calls from any
/// number of threads observe a consistent total order.
pub struct MemoryTracker<A: GlobalAlloc> {
    allocator: A,
    inner: Mutex<TrackerInner>,
}

impl<A: GlobalAlloc> fmt::Debug for MemoryTracker<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("allocator", &"<allocator>")
            .finish_non_exhaustive()
    }
}

static GLOBAL_TRACKER: LazyLock<MemoryTracker<System>> =
    LazyLock::new(|| MemoryTracker::new(System));

impl MemoryTracker<System> {
    /// Creates a tracker over the system's default allocator.
    ///
    /// This is a convenience method for the common case of wanting tracking and fault
    /// injection without changing the underlying allocation strategy.
    #[must_use]
    pub fn system() -> Self {
        Self::new(System)
    }

    /// Returns the process-wide tracker instance, created on first access and alive until
    /// process exit.
    ///
    /// This is the instance an allocation hook or a test harness shares with the code under
    /// test. Independent trackers created with [`new()`][Self::new] or
    /// [`system()`][Self::system] do not affect it.
    ///
    /// # Examples
    ///
    /// ```
    /// use alloc_sentinel::MemoryTracker;
    ///
    /// let before = MemoryTracker::global().total_allocations();
    /// let payload = MemoryTracker::global().acquire(16).expect("not under injection");
    /// MemoryTracker::global().release(payload);
    ///
    /// assert!(MemoryTracker::global().total_allocations() > before);
    /// ```
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_TRACKER
    }
}

impl<A: GlobalAlloc> MemoryTracker<A> {
    /// Creates a tracker that delegates raw memory acquisition and release to `allocator`.
    #[must_use]
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            inner: Mutex::new(TrackerInner {
                live: HashSet::new(),
                counters: Counters::new(),
                fault: FaultState::new(),
            }),
        }
    }

    /// Acquires `size` bytes, consulting the fault-injection state machine first.
    ///
    /// Returns `Ok(None)` for zero-size requests, which never touch the underlying allocator
    /// and register nothing. The state machine is still consulted for them: a zero-size
    /// request can be the strict countdown trigger, but once latched it always passes, since
    /// zero added bytes never exceed the latched ceiling.
    ///
    /// The returned payload pointer is aligned to `align_of::<usize>()` and remains valid
    /// until passed to [`release()`][Self::release].
    ///
    /// # Errors
    ///
    /// [`Error::ExhaustedMemory`] when the underlying allocator fails or the state machine
    /// simulates a failure; the two are indistinguishable by design.
    pub fn acquire(&self, size: usize) -> Result<Option<NonNull<u8>>> {
        let mut inner = self.inner.lock().expect(ERR_POISONED_LOCK);

        let outstanding = inner.counters.allocated_size();
        inner.fault.check(size, outstanding)?;

        if size == 0 {
            return Ok(None);
        }

        let layout = AllocationRecord::block_layout(size)
            .ok_or(Error::ExhaustedMemory { requested: size })?;

        let block = raw::acquire(&self.allocator, layout)
            .ok_or(Error::ExhaustedMemory { requested: size })?;

        // SAFETY: The block was freshly acquired with the layout computed for `size`.
        let payload = unsafe { AllocationRecord::initialize(block, size) };

        let inserted = inner.live.insert(payload.addr());
        assert!(
            inserted,
            "payload pointer already registered - the tracking table is corrupted"
        );

        let size_u64: u64 = size.try_into().expect("usize always fits into u64");
        inner.counters.record_acquire(size_u64);

        Ok(Some(payload))
    }

    /// Like [`acquire()`][Self::acquire], but collapses every failure into `None`.
    ///
    /// Zero-size requests and exhaustion are therefore indistinguishable here; use
    /// [`acquire()`][Self::acquire] where that distinction matters.
    #[must_use]
    pub fn acquire_nothrow(&self, size: usize) -> Option<NonNull<u8>> {
        self.acquire(size).ok().flatten()
    }

    /// Acquires space for `count` values of `T`, validating the byte count first.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSize`] when `count * size_of::<T>()` overflows `usize`, distinguishable
    /// from plain exhaustion so that callers can probe sizing bugs separately.
    ///
    /// # Panics
    ///
    /// Panics if `T` requires alignment above `align_of::<usize>()`, which the payload region
    /// does not provide.
    pub fn acquire_typed<T>(&self, count: usize) -> Result<Option<NonNull<T>>> {
        assert!(
            align_of::<T>() <= PAYLOAD_ALIGN,
            "payload region only guarantees usize alignment"
        );

        let bytes = count
            .checked_mul(size_of::<T>())
            .ok_or(Error::InvalidSize {
                count,
                element_size: size_of::<T>(),
            })?;

        Ok(self.acquire(bytes)?.map(NonNull::cast))
    }

    /// Releases a payload pointer previously returned by [`acquire()`][Self::acquire].
    ///
    /// A `None` or unrecognized pointer is silently ignored - the weak free-on-null guarantee
    /// of the underlying allocator, generalized to free-on-unknown. This makes double release
    /// through the public API harmless; the pointer leaves the tracking table on the first
    /// release.
    ///
    /// # Panics
    ///
    /// Panics if a tracked pointer's record tag is corrupted or the release would drive the
    /// outstanding-byte accounting below zero. Both indicate corrupted bookkeeping or raw
    /// memory misuse and are not recoverable.
    pub fn release(&self, ptr: Option<NonNull<u8>>) {
        let Some(payload) = ptr else {
            return;
        };

        let mut inner = self.inner.lock().expect(ERR_POISONED_LOCK);

        if !inner.live.remove(&payload.addr()) {
            return;
        }

        // SAFETY: The pointer was registered, so it was produced by `acquire` and its record
        // has not been retired yet.
        let (block, requested_size) = unsafe { AllocationRecord::retire(payload) };

        let size_u64: u64 = requested_size
            .try_into()
            .expect("usize always fits into u64");
        inner.counters.record_release(size_u64);

        let layout = AllocationRecord::block_layout(requested_size)
            .expect("layout was computable at acquire time, so it must be computable now");

        // SAFETY: The block was acquired from this allocator with this layout and is not
        // referenced anywhere after retirement.
        unsafe { raw::release(&self.allocator, block, layout) };
    }

    /// Whether `ptr` is currently registered in the tracking table.
    #[must_use]
    pub fn is_tracked(&self, ptr: NonNull<u8>) -> bool {
        let inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        inner.live.contains(&ptr.addr())
    }

    /// Asserts provenance of `ptr`, for callers that want a failure instead of a boolean.
    ///
    /// # Errors
    ///
    /// [`Error::ForeignPointer`] when the pointer is not currently registered. Provenance
    /// checks are explicitly safe to probe, so this is recoverable, unlike handing a foreign
    /// pointer to [`release()`][Self::release] after corrupting its surroundings.
    pub fn validate(&self, ptr: NonNull<u8>) -> Result<()> {
        if self.is_tracked(ptr) {
            Ok(())
        } else {
            Err(Error::ForeignPointer {
                address: ptr.addr().get(),
            })
        }
    }

    /// Cumulative number of successful acquisitions. Never decreases.
    #[must_use]
    pub fn total_allocations(&self) -> u64 {
        let inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        inner.counters.total_allocations()
    }

    /// Number of currently live allocations.
    #[must_use]
    pub fn live_allocations(&self) -> u64 {
        let inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        inner
            .live
            .len()
            .try_into()
            .expect("usize always fits into u64")
    }

    /// Bytes currently outstanding, in originally-requested sizes.
    #[must_use]
    pub fn allocated_size(&self) -> u64 {
        let inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        inner.counters.allocated_size()
    }

    /// High-water mark of [`allocated_size()`][Self::allocated_size]. Never decreases.
    #[must_use]
    pub fn max_allocated_size(&self) -> u64 {
        let inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        inner.counters.max_allocated_size()
    }

    /// Captures all four statistics in one lock acquisition, so the values are mutually
    /// consistent even under concurrent allocation.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        Snapshot {
            total_allocations: inner.counters.total_allocations(),
            live_allocations: inner
                .live
                .len()
                .try_into()
                .expect("usize always fits into u64"),
            allocated_size: inner.counters.allocated_size(),
            max_allocated_size: inner.counters.max_allocated_size(),
        }
    }

    /// Arms the fault-injection countdown and enables injection.
    ///
    /// The next `countdown`-th checkpoint (a real [`acquire()`][Self::acquire] or an
    /// [`error_point()`][Self::error_point]) fails; from that moment every request that would
    /// push outstanding bytes above the level recorded at the failure keeps failing until
    /// reconfigured. Passing `0` means "fail starting now": the ceiling is latched at the
    /// current outstanding size immediately.
    ///
    /// # Examples
    ///
    /// ```
    /// use alloc_sentinel::MemoryTracker;
    ///
    /// let tracker = MemoryTracker::system();
    /// tracker.set_fault_countdown(2);
    ///
    /// assert!(tracker.error_point().is_ok());
    /// assert!(tracker.error_point().is_err());
    /// ```
    pub fn set_fault_countdown(&self, countdown: u64) {
        let mut inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        let outstanding = inner.counters.allocated_size();
        inner.fault.configure(countdown, outstanding);
    }

    /// Current value of the fault-injection countdown. `0` means the latch has fired (or a
    /// zero countdown was configured directly).
    #[must_use]
    pub fn fault_countdown(&self) -> u64 {
        let inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        inner.fault.countdown()
    }

    /// Disables fault injection without touching the countdown or the latched ceiling.
    ///
    /// Used to let diagnostic code that itself allocates (say, formatting the error message
    /// for an injected failure) proceed without being caught by the very fault it is
    /// reporting.
    ///
    /// The flag is flat, not depth-counted: nested pause/resume pairs collapse to the last
    /// writer's state. Callers needing strict nesting should use
    /// [`run_without_injection()`][Self::run_without_injection], which saves and restores the
    /// prior state.
    pub fn pause_fault_injection(&self) {
        let _prior = self.set_injection_enabled(false);
    }

    /// Re-enables fault injection after [`pause_fault_injection()`][Self::pause_fault_injection].
    /// The countdown and latched ceiling resume exactly where they stopped.
    pub fn resume_fault_injection(&self) {
        let _prior = self.set_injection_enabled(true);
    }

    /// Marks a logical fault-injection checkpoint without performing a real allocation.
    ///
    /// # Errors
    ///
    /// Fails under exactly the same rule as an [`acquire()`][Self::acquire] of one byte.
    pub fn error_point(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        let outstanding = inner.counters.allocated_size();
        inner.fault.check(1, outstanding)
    }

    /// Runs `f` with fault injection enabled, restoring the prior enabled state on every exit
    /// path, including panic.
    pub fn run_under_injection<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.run_with_injection_enabled(true, f)
    }

    /// Runs `f` with fault injection disabled, restoring the prior enabled state on every exit
    /// path, including panic.
    ///
    /// # Examples
    ///
    /// ```
    /// use alloc_sentinel::MemoryTracker;
    ///
    /// let tracker = MemoryTracker::system();
    /// tracker.set_fault_countdown(1);
    ///
    /// // Bookkeeping that must not trip the armed fault.
    /// let payload = tracker.run_without_injection(|| tracker.acquire(32)).unwrap();
    /// tracker.release(payload);
    ///
    /// // The trigger is still pending.
    /// assert!(tracker.error_point().is_err());
    /// ```
    pub fn run_without_injection<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.run_with_injection_enabled(false, f)
    }

    fn run_with_injection_enabled<F, R>(&self, enabled: bool, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prior = self.set_injection_enabled(enabled);

        // Restores the prior state even if `f` panics. The lock is not held across `f`, so
        // there is no reentrancy hazard from calling back into the tracker inside `f`.
        let _restore = scopeguard::guard((), |()| {
            _ = self.set_injection_enabled(prior);
        });

        f()
    }

    /// Sets the injection enabled flag, returning its prior value.
    fn set_injection_enabled(&self, enabled: bool) -> bool {
        let mut inner = self.inner.lock().expect(ERR_POISONED_LOCK);
        inner.fault.set_enabled(enabled)
    }
}
