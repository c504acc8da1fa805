//! Demonstrates live-allocation tracking, pointer validation and the statistics surface.
//!
//! Run with: `cargo run --example tracking_stats`

use std::ptr::NonNull;

use alloc_sentinel::MemoryTracker;

fn main() {
    let tracker = MemoryTracker::system();

    let mut payloads = Vec::new();
    for size in [16_usize, 64, 256, 1024] {
        let payload = tracker
            .acquire(size)
            .expect("no fault injection armed")
            .expect("non-zero request yields a pointer");
        payloads.push(payload);
    }

    let snapshot = tracker.snapshot();
    println!("after acquiring 4 blocks:");
    println!("  total allocations: {}", snapshot.total_allocations);
    println!("  live allocations:  {}", snapshot.live_allocations);
    println!("  outstanding bytes: {}", snapshot.allocated_size);
    println!("  peak bytes:        {}", snapshot.max_allocated_size);

    // Every issued pointer validates; a stack pointer does not.
    for payload in &payloads {
        assert!(tracker.is_tracked(*payload));
    }
    let mut local = 0_u64;
    let foreign = NonNull::from(&mut local).cast();
    println!(
        "  foreign pointer validates: {:?}",
        tracker.validate(foreign).is_ok()
    );

    for payload in payloads {
        tracker.release(Some(payload));
    }

    let snapshot = tracker.snapshot();
    println!("after releasing everything:");
    println!("  live allocations:  {}", snapshot.live_allocations);
    println!("  outstanding bytes: {}", snapshot.allocated_size);
    println!("  peak bytes:        {}", snapshot.max_allocated_size);
}
