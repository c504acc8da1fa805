//! Integration tests for the fault-injection countdown, latch and pause/resume semantics.
//!
//! Each test arms its own tracker instance, so the countdown positions asserted here are
//! fully deterministic.

use std::panic::{AssertUnwindSafe, catch_unwind};

use alloc_sentinel::MemoryTracker;

#[test]
fn countdown_permits_checkpoints_until_the_trigger() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(3);

    // A countdown of N fails the N-th checkpoint: two pass, the third triggers.
    assert!(tracker.error_point().is_ok());
    assert!(tracker.error_point().is_ok());
    assert!(tracker.error_point().is_err());

    assert_eq!(tracker.fault_countdown(), 0);
}

#[test]
fn real_acquires_and_error_points_share_the_countdown() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(3);

    let payload = tracker
        .acquire(16)
        .expect("two checkpoints remain")
        .expect("non-zero request yields a pointer");
    assert!(tracker.error_point().is_ok());

    // Third checkpoint, regardless of which operation takes it.
    assert!(tracker.acquire(16).is_err());

    tracker.release(Some(payload));
}

#[test]
fn latch_refuses_growth_beyond_the_trigger_level() {
    let tracker = MemoryTracker::system();

    let held = tracker
        .acquire(64)
        .expect("not armed yet")
        .expect("non-zero request yields a pointer");

    // Trigger immediately; the ceiling latches at the 64 outstanding bytes.
    tracker.set_fault_countdown(1);
    assert!(tracker.acquire(16).is_err());

    // Identical retries keep failing: 64 + 16 > 64.
    assert!(tracker.acquire(16).is_err());

    // Releasing memory first makes room under the ceiling.
    tracker.release(Some(held));
    let retry = tracker
        .acquire(16)
        .expect("16 bytes fit under the latched 64")
        .expect("non-zero request yields a pointer");

    // And the ceiling still binds: 16 + 64 > 64.
    assert!(tracker.acquire(64).is_err());

    tracker.release(Some(retry));
}

#[test]
fn zero_countdown_fails_from_the_first_allocation() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(0);

    // Latched at the current outstanding size, which is zero.
    assert!(tracker.acquire(16).is_err());

    // Zero added bytes never exceed the ceiling once past the strict trigger.
    let empty = tracker.acquire(0).expect("zero-size request passes the latch");
    assert!(empty.is_none());
}

#[test]
fn latched_huge_request_reports_exhaustion_not_a_panic() {
    let tracker = MemoryTracker::system();

    let held = tracker
        .acquire(8)
        .expect("not armed yet")
        .expect("non-zero request yields a pointer");

    // Latched at 8 outstanding bytes. A near-usize::MAX request must surface as the same
    // recoverable exhaustion as any other over-ceiling request, not as an arithmetic panic.
    tracker.set_fault_countdown(0);
    assert!(matches!(
        tracker.acquire(usize::MAX),
        Err(alloc_sentinel::Error::ExhaustedMemory { .. })
    ));

    tracker.release(Some(held));
}

#[test]
fn zero_size_request_can_be_the_strict_trigger() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(1);

    // The countdown == 1 trigger fires on whatever checkpoint reaches it, even a zero-size
    // request that would never allocate.
    assert!(tracker.acquire(0).is_err());
    assert_eq!(tracker.fault_countdown(), 0);

    // Latched now; zero-size passes, growth fails.
    assert!(tracker.acquire(0).is_ok());
    assert!(tracker.acquire(1).is_err());
}

#[test]
fn reconfiguring_resets_the_countdown_and_ceiling() {
    let tracker = MemoryTracker::system();

    tracker.set_fault_countdown(1);
    assert!(tracker.acquire(16).is_err());

    // Re-arm with room to spare: allocations pass again until the new trigger.
    tracker.set_fault_countdown(5);
    let payload = tracker
        .acquire(16)
        .expect("new countdown permits checkpoints again")
        .expect("non-zero request yields a pointer");

    assert_eq!(tracker.fault_countdown(), 4);

    tracker.release(Some(payload));
}

#[test]
fn pause_lets_diagnostic_allocations_through() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(1);

    tracker.pause_fault_injection();

    // The pending trigger must not fire while paused, nor the countdown move.
    let payload = tracker
        .acquire(32)
        .expect("paused injection never simulates failures")
        .expect("non-zero request yields a pointer");
    assert_eq!(tracker.fault_countdown(), 1);
    tracker.release(Some(payload));

    tracker.resume_fault_injection();
    assert!(tracker.acquire(32).is_err());
}

#[test]
fn scoped_helpers_restore_the_prior_state() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(1);

    let payload = tracker.run_without_injection(|| tracker.acquire(16));
    let payload = payload.expect("injection disabled inside the scope");
    tracker.release(payload);

    // Prior state (enabled, trigger pending) is back.
    assert!(tracker.error_point().is_err());

    // The inverse scope re-enables injection while the surrounding code has it paused.
    tracker.set_fault_countdown(1);
    tracker.pause_fault_injection();
    tracker.run_under_injection(|| {
        assert!(tracker.error_point().is_err());
    });
    assert!(tracker.error_point().is_ok());
}

#[test]
fn scoped_helper_restores_state_when_the_closure_panics() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(1);

    let result = catch_unwind(AssertUnwindSafe(|| {
        tracker.run_without_injection(|| panic!("boom"));
    }));
    assert!(result.is_err());

    // Injection is enabled again and the trigger is still pending.
    assert!(tracker.error_point().is_err());
}

#[test]
fn nested_pause_resume_collapses_to_the_last_writer() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(1);

    // The flag is flat by design: the inner resume wins over the outer pause.
    tracker.pause_fault_injection();
    tracker.pause_fault_injection();
    tracker.resume_fault_injection();

    assert!(tracker.error_point().is_err());
}

#[test]
fn simulated_failure_does_not_disturb_statistics() {
    let tracker = MemoryTracker::system();
    tracker.set_fault_countdown(1);

    let snapshot_before = tracker.snapshot();
    assert!(tracker.acquire(16).is_err());
    assert_eq!(tracker.snapshot(), snapshot_before);
}
