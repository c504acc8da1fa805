//! Demonstrates the fault-injection countdown and the latched out-of-memory ceiling.
//!
//! Run with: `cargo run --example fault_injection_basic`

use alloc_sentinel::MemoryTracker;

fn main() {
    let tracker = MemoryTracker::system();

    // Hold some memory so the latch has something to bind against.
    let held = tracker
        .acquire(256)
        .expect("nothing armed yet")
        .expect("non-zero request yields a pointer");
    println!("holding 256 bytes, outstanding = {}", tracker.allocated_size());

    // Fail the third allocation checkpoint from now.
    tracker.set_fault_countdown(3);
    println!("armed fault countdown at 3");

    let mut survivors = Vec::new();
    for attempt in 1.. {
        match tracker.acquire(64) {
            Ok(Some(payload)) => {
                println!("attempt {attempt}: acquired 64 bytes");
                survivors.push(payload);
            }
            Ok(None) => unreachable!("non-zero requests always yield a pointer"),
            Err(error) => {
                println!("attempt {attempt}: {error}");
                break;
            }
        }
    }

    // The ceiling latched at the moment of failure. Identical retries keep failing.
    println!(
        "latched: retrying 64 bytes -> {:?}",
        tracker.acquire(64).map(|_| "ok")
    );

    // Freeing memory first is what makes progress under sustained pressure.
    tracker.release(Some(held));
    match tracker.acquire(64) {
        Ok(Some(payload)) => {
            println!("after releasing 256 bytes, 64 bytes fit under the ceiling again");
            tracker.release(Some(payload));
        }
        Ok(None) | Err(_) => println!("still latched"),
    }

    for payload in survivors {
        tracker.release(Some(payload));
    }

    println!(
        "done: live = {}, peak = {} bytes",
        tracker.live_allocations(),
        tracker.max_allocated_size()
    );
}
