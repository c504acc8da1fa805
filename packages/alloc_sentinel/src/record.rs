//! Per-allocation metadata prefixed to every payload handed out by the tracker.
//!
//! Each successful acquisition produces one memory block holding an [`AllocationRecord`]
//! immediately followed by the caller-visible payload. The caller only ever sees the payload
//! pointer; the record is recovered from it by subtracting a fixed offset, never by scanning.

use std::alloc::Layout;
use std::ptr::NonNull;

/// Sentinel written into the header when the record is constructed.
const LIVE_TAG: u64 = 0x0123_ABCD_6789_CDEF;

/// Sentinel that overwrites [`LIVE_TAG`] when the record is retired. A retired tag reaching
/// [`AllocationRecord::retire`] again means a double release slipped past the tracking table,
/// which is a bookkeeping bug, not a caller error.
const DEAD_TAG: u64 = 0xABCD_0123_CDEF_6789;

/// Alignment guaranteed for the payload region that follows the record.
pub(crate) const PAYLOAD_ALIGN: usize = align_of::<usize>();

/// Fixed-layout header at the start of every tracked memory block.
#[derive(Debug)]
#[repr(C)]
pub(crate) struct AllocationRecord {
    /// Corruption-detection tag: [`LIVE_TAG`] while the allocation is live, [`DEAD_TAG`] after
    /// retirement. Anything else means something wrote through the header.
    tag: u64,

    /// Byte count originally requested by the caller, independent of any rounding applied by
    /// the underlying allocator. Used to decrement the outstanding-bytes total on release.
    requested_size: usize,
}

impl AllocationRecord {
    /// Byte offset from the start of a block to its payload.
    ///
    /// The header's alignment is at least [`PAYLOAD_ALIGN`], so extending the header layout
    /// with the payload layout never inserts padding and the offset is simply the header size.
    /// [`block_layout`][Self::block_layout] debug-asserts this equivalence.
    pub(crate) const fn payload_offset() -> usize {
        size_of::<Self>()
    }

    /// Calculates the combined record-plus-payload layout for a request of `requested_size`
    /// bytes. Returns `None` when the request is so large that the layout arithmetic overflows,
    /// which callers report as ordinary exhaustion.
    pub(crate) fn block_layout(requested_size: usize) -> Option<Layout> {
        assert!(
            requested_size > 0,
            "zero-size requests never reach the underlying allocator"
        );

        let header = Layout::new::<Self>();
        let payload = Layout::from_size_align(requested_size, PAYLOAD_ALIGN).ok()?;

        let (combined, payload_offset) = header.extend(payload).ok()?;
        debug_assert_eq!(payload_offset, Self::payload_offset());

        Some(combined.pad_to_align())
    }

    /// Writes a live record at the start of `block` and returns the payload pointer.
    ///
    /// # Safety
    ///
    /// `block` must be the start of a freshly acquired block laid out per
    /// [`block_layout(requested_size)`][Self::block_layout], not yet initialized.
    pub(crate) unsafe fn initialize(block: NonNull<u8>, requested_size: usize) -> NonNull<u8> {
        let record = block.cast::<Self>();

        // SAFETY: The block starts with space for the header per block_layout(), and the
        // block's alignment (at least align_of::<Self>()) makes the cast well-aligned.
        unsafe {
            record.write(Self {
                tag: LIVE_TAG,
                requested_size,
            });
        }

        // SAFETY: The payload region begins payload_offset() bytes into the same block.
        unsafe { block.byte_add(Self::payload_offset()) }
    }

    /// Recovers the record owning `payload`, marks it dead and returns the block start pointer
    /// together with the originally requested size.
    ///
    /// # Panics
    ///
    /// Panics if the record tag is not the live sentinel - either a foreign or double-released
    /// pointer made it past the tracking table, or the caller wrote through the header.
    ///
    /// # Safety
    ///
    /// `payload` must have been returned by [`initialize`][Self::initialize] for a block that
    /// has not been released yet.
    pub(crate) unsafe fn retire(payload: NonNull<u8>) -> (NonNull<u8>, usize) {
        // SAFETY: The payload sits payload_offset() bytes into its block, so walking back by
        // that fixed offset lands on the record header within the same allocation.
        let mut record = unsafe { payload.byte_sub(Self::payload_offset()) }.cast::<Self>();

        // SAFETY: The header was initialized by `initialize` and the block is still live, so
        // forming an exclusive reference to it is valid under the tracker's lock.
        let record = unsafe { record.as_mut() };

        assert_eq!(
            record.tag, LIVE_TAG,
            "allocation record tag is not the live sentinel - memory corruption \
            or a foreign pointer reached release"
        );

        record.tag = DEAD_TAG;

        let block = NonNull::from(&mut *record).cast::<u8>();
        (block, record.requested_size)
    }
}
