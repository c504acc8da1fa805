//! Instrumented memory-allocation layer with live-allocation tracking and deterministic
//! out-of-memory fault injection.
//!
//! This package transparently substitutes for a program's dynamic-allocation mechanism so
//! that unmodified code exercises its real allocation call sites while a test harness controls
//! exactly when and how often those calls fail.
//!
//! The core functionality includes:
//! - [`MemoryTracker`] - The engine: tracks every live allocation, validates pointer
//!   provenance, detects corruption through tagged per-allocation records and decides when to
//!   simulate exhaustion
//! - [`Snapshot`] - Mutually consistent point-in-time statistics
//! - [`Error`] - The recoverable failure taxonomy (exhaustion, invalid size, foreign pointer)
//!
//! This package is not meant for use in production, serving only as a development tool.
//!
//! # Simple usage
//!
//! ```
//! use alloc_sentinel::MemoryTracker;
//!
//! let tracker = MemoryTracker::system();
//!
//! let payload = tracker.acquire(128)?.expect("non-zero request yields a pointer");
//! assert_eq!(tracker.live_allocations(), 1);
//! assert_eq!(tracker.allocated_size(), 128);
//!
//! tracker.release(Some(payload));
//! assert_eq!(tracker.live_allocations(), 0);
//! # Ok::<(), alloc_sentinel::Error>(())
//! ```
//!
//! # Simulating memory exhaustion
//!
//! A countdown arms the fault injector: a fixed number of allocation checkpoints pass, then
//! one fails, and from that point on the tracker refuses any request that would grow total
//! usage beyond the level recorded at the failure. Retrying the identical request keeps
//! failing; shrinking demand or releasing memory makes progress. This exercises recovery
//! paths deterministically:
//!
//! ```
//! use alloc_sentinel::MemoryTracker;
//!
//! let tracker = MemoryTracker::system();
//! let held = tracker.acquire(64)?.expect("non-zero request yields a pointer");
//!
//! // One checkpoint passes, then the trigger fires and latches the ceiling
//! // at the outstanding size of that moment.
//! tracker.set_fault_countdown(2);
//! let first = tracker.acquire(16)?.expect("one checkpoint remains");
//! assert!(tracker.acquire(16).is_err());
//!
//! // The identical retry keeps failing until memory is freed first.
//! assert!(tracker.acquire(16).is_err());
//! tracker.release(Some(held));
//! let retry = tracker.acquire(16)?.expect("fits under the latched ceiling");
//!
//! tracker.release(Some(first));
//! tracker.release(Some(retry));
//! # Ok::<(), alloc_sentinel::Error>(())
//! ```
//!
//! # Scope
//!
//! The mechanism that redirects a host program's allocations here (for example a
//! `#[global_allocator]` hook forwarding to [`MemoryTracker::global()`]) is the host's
//! concern; this package only exposes the engine's operations. A forwarding hook must carry
//! its own reentrancy guard: the tracking table allocates through the process default
//! allocator, so a hook that routes those bookkeeping allocations back into the engine would
//! deadlock on the engine's lock.
//!
//! # Miri compatibility
//!
//! The tracker performs raw pointer arithmetic behind its record abstraction but stays within
//! a single allocation at all times, so the test suites run under Miri except where noted.

mod constants;
mod error;
mod fault;
mod raw;
mod record;
mod statistics;
mod tracker;

pub use error::{Error, Result};
pub use statistics::Snapshot;
pub use tracker::MemoryTracker;
