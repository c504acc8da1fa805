//! Thin adapter over the underlying allocator.
//!
//! The tracker delegates all real memory acquisition and release here. The adapter converts the
//! underlying allocator's null-on-failure convention into `Option` and guards the zero-size
//! requests that [`GlobalAlloc`] forbids; it performs no bookkeeping of its own.

use std::alloc::{GlobalAlloc, Layout};
use std::ptr::NonNull;

/// Acquires a block for `layout` from the underlying allocator.
///
/// Zero-size layouts never reach the allocator and yield `None` without constituting a failure;
/// the caller distinguishes that case before calling. On underlying failure, returns `None`.
pub(crate) fn acquire<A: GlobalAlloc>(allocator: &A, layout: Layout) -> Option<NonNull<u8>> {
    if layout.size() == 0 {
        return None;
    }

    // SAFETY: The layout has non-zero size, which is the only precondition of `alloc`.
    NonNull::new(unsafe { allocator.alloc(layout) })
}

/// Returns a block previously acquired with the same `layout` to the underlying allocator.
///
/// # Safety
///
/// `ptr` must have been returned by [`acquire`] on the same allocator with the same `layout`,
/// and must not be used after this call.
pub(crate) unsafe fn release<A: GlobalAlloc>(allocator: &A, ptr: NonNull<u8>, layout: Layout) {
    // SAFETY: Caller guarantees the pointer came from this allocator with this layout.
    unsafe { allocator.dealloc(ptr.as_ptr(), layout) }
}

#[cfg(test)]
mod tests {
    use std::alloc::System;

    use super::*;

    #[test]
    fn zero_size_layout_never_touches_the_allocator() {
        let layout = Layout::from_size_align(0, 8).expect("valid zero-size layout");

        assert!(acquire(&System, layout).is_none());
    }

    #[test]
    fn acquire_and_release_round_trip() {
        let layout = Layout::from_size_align(64, 8).expect("valid layout");

        let ptr = acquire(&System, layout).expect("system allocator should satisfy 64 bytes");

        // SAFETY: `ptr` was just acquired with `layout` from the same allocator.
        unsafe { release(&System, ptr, layout) };
    }
}
