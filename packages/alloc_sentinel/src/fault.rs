//! Countdown-based fault-injection state machine.
//!
//! The state machine decides, before every real acquisition, whether to report simulated
//! exhaustion. A configured countdown permits a fixed number of checkpoints before the trigger
//! fires; from that moment on the machine is *latched*: any request that would push outstanding
//! bytes above the level recorded at the trigger keeps failing, so callers can only make
//! progress by shrinking demand or releasing memory first. This models sustained memory
//! pressure rather than a single spurious failure.

use std::mem;

use crate::{Error, Result};

/// State of the fault-injection countdown and latch. Pure bookkeeping: the surrounding tracker
/// feeds in the requested size and the current outstanding total while holding its lock.
#[derive(Debug)]
pub(crate) struct FaultState {
    /// When false, checkpoints always pass, regardless of countdown or latch.
    enabled: bool,

    /// Checkpoints remaining until the trigger. Values above one decrement and pass, exactly
    /// one fails the current checkpoint and latches, zero means latched.
    countdown: u64,

    /// Outstanding-byte ceiling captured at the moment the trigger fired (or at configuration
    /// time when a zero countdown was configured directly). Only meaningful while latched.
    latched_threshold: u64,
}

impl FaultState {
    /// Injection starts disabled; the countdown and threshold hold sentinel maxima until the
    /// first configuration.
    pub(crate) const fn new() -> Self {
        Self {
            enabled: false,
            countdown: u64::MAX,
            latched_threshold: u64::MAX,
        }
    }

    /// Arms the countdown and enables injection. The threshold is captured now so that a
    /// countdown of zero means "fail starting immediately, at the current outstanding size".
    pub(crate) fn configure(&mut self, countdown: u64, outstanding: u64) {
        self.enabled = true;
        self.countdown = countdown;
        self.latched_threshold = outstanding;
    }

    pub(crate) fn countdown(&self) -> u64 {
        self.countdown
    }

    /// Sets the enabled flag and returns its prior value. The countdown and latched threshold
    /// are left untouched, so a paused latch resumes exactly where it stopped.
    pub(crate) fn set_enabled(&mut self, enabled: bool) -> bool {
        mem::replace(&mut self.enabled, enabled)
    }

    /// Decides the fate of one checkpoint for a request of `requested` bytes while `outstanding`
    /// bytes are currently allocated.
    pub(crate) fn check(&mut self, requested: usize, outstanding: u64) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.countdown > 1 {
            // Cannot underflow because countdown > 1.
            self.countdown = self.countdown.wrapping_sub(1);
            return Ok(());
        }

        if self.countdown == 1 {
            // The trigger: latch the ceiling at the current outstanding size and fail this
            // checkpoint.
            self.latched_threshold = outstanding;
            self.countdown = 0;
            return Err(Error::ExhaustedMemory { requested });
        }

        let requested_u64: u64 = requested.try_into().expect("usize always fits into u64");
        // A saturated projection necessarily exceeds any real threshold, so an absurdly large
        // request fails the checkpoint like any other exhaustion instead of panicking.
        let projected = outstanding.saturating_add(requested_u64);

        if projected > self.latched_threshold {
            return Err(Error::ExhaustedMemory { requested });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_state_always_passes() {
        let mut fault = FaultState::new();

        for _ in 0..100 {
            assert!(fault.check(1024, 0).is_ok());
        }
        assert_eq!(fault.countdown(), u64::MAX);
    }

    #[test]
    fn countdown_fails_on_the_countdown_th_checkpoint() {
        let mut fault = FaultState::new();
        fault.configure(3, 0);

        assert!(fault.check(1, 0).is_ok());
        assert!(fault.check(1, 0).is_ok());
        assert!(fault.check(1, 0).is_err());
        assert_eq!(fault.countdown(), 0);
    }

    #[test]
    fn countdown_of_one_fails_immediately() {
        let mut fault = FaultState::new();
        fault.configure(1, 0);

        assert!(fault.check(1, 0).is_err());
    }

    #[test]
    fn zero_countdown_latches_at_configuration_time() {
        let mut fault = FaultState::new();
        fault.configure(0, 100);

        // Anything above the captured threshold fails, anything within it passes.
        assert!(fault.check(1, 100).is_err());
        assert!(fault.check(50, 40).is_ok());
    }

    #[test]
    fn trigger_latches_threshold_at_current_outstanding() {
        let mut fault = FaultState::new();
        fault.configure(1, 0);

        assert!(fault.check(16, 64).is_err());

        // Latched at 64: identical retries keep failing until demand shrinks or memory frees.
        assert!(fault.check(16, 64).is_err());
        assert!(fault.check(16, 32).is_ok());
        assert!(fault.check(0, 64).is_ok());
    }

    #[test]
    fn latched_check_of_huge_request_fails_without_panicking() {
        let mut fault = FaultState::new();
        fault.configure(0, 8);

        // The projected total saturates rather than overflowing; the checkpoint simply fails.
        assert!(fault.check(usize::MAX, 8).is_err());
    }

    #[test]
    fn pause_and_resume_preserve_countdown_and_latch() {
        let mut fault = FaultState::new();
        fault.configure(2, 0);

        assert!(fault.check(1, 0).is_ok());
        assert_eq!(fault.countdown(), 1);

        let was_enabled = fault.set_enabled(false);
        assert!(was_enabled);

        // Paused: the pending trigger must not fire, nor the countdown move.
        assert!(fault.check(1, 0).is_ok());
        assert_eq!(fault.countdown(), 1);

        let was_enabled = fault.set_enabled(true);
        assert!(!was_enabled);
        assert!(fault.check(1, 0).is_err());
    }
}
