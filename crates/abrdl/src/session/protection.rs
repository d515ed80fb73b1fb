use super::events::ProtectionState;
use crate::config::RotationPolicy;

/// Consecutive-failure bookkeeping for one session.
#[derive(Debug, Clone)]
pub struct ProtectionTracker {
    state: ProtectionState,
    consecutive_failures: u32,
    policy: RotationPolicy,
}

/// Outcome of a failed rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationFailure {
    /// Counted, the session keeps streaming
    Counted,
    /// The counter was already at its cap
    Exhausted,
}

impl ProtectionTracker {
    pub fn new(policy: RotationPolicy) -> Self {
        Self {
            state: ProtectionState::Normal,
            consecutive_failures: 0,
            policy,
        }
    }

    pub fn state(&self) -> ProtectionState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn accept(&mut self) {
        self.consecutive_failures = 0;
        self.state = ProtectionState::Normal;
    }

    /// Records a soft rejection and returns whether the replacement mint
    /// should force a refresh of the minting subsystem.
    pub fn soft_reject(&mut self) -> bool {
        self.bump();
        self.state = ProtectionState::Retrying;
        self.consecutive_failures >= self.policy.force_refresh_threshold
    }

    pub fn hard_reject(&mut self) {
        self.state = ProtectionState::Rejected;
    }

    pub fn rotation_failed(&mut self) -> RotationFailure {
        if self.consecutive_failures >= self.policy.max_consecutive_failures {
            return RotationFailure::Exhausted;
        }
        self.bump();
        RotationFailure::Counted
    }

    fn bump(&mut self) {
        self.consecutive_failures =
            (self.consecutive_failures + 1).min(self.policy.max_consecutive_failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_refresh_from_third_soft_rejection() {
        let mut tracker = ProtectionTracker::new(RotationPolicy::default());
        assert!(!tracker.soft_reject());
        assert!(!tracker.soft_reject());
        assert!(tracker.soft_reject());
        assert_eq!(tracker.consecutive_failures(), 3);
        assert_eq!(tracker.state(), ProtectionState::Retrying);

        tracker.accept();
        assert_eq!(tracker.consecutive_failures(), 0);
        assert_eq!(tracker.state(), ProtectionState::Normal);
    }

    #[test]
    fn test_counter_is_capped() {
        let mut tracker = ProtectionTracker::new(RotationPolicy::default());
        for _ in 0..25 {
            tracker.soft_reject();
        }
        assert_eq!(tracker.consecutive_failures(), 10);
    }

    #[test]
    fn test_rotation_failure_exhausts_at_cap() {
        let mut tracker = ProtectionTracker::new(RotationPolicy {
            force_refresh_threshold: 1,
            max_consecutive_failures: 2,
        });
        assert_eq!(tracker.rotation_failed(), RotationFailure::Counted);
        assert_eq!(tracker.rotation_failed(), RotationFailure::Counted);
        assert_eq!(tracker.consecutive_failures(), 2);
        assert_eq!(tracker.rotation_failed(), RotationFailure::Exhausted);
    }

    #[test]
    fn test_hard_rejection_keeps_counter() {
        let mut tracker = ProtectionTracker::new(RotationPolicy::default());
        tracker.soft_reject();
        tracker.hard_reject();
        assert_eq!(tracker.state(), ProtectionState::Rejected);
        assert_eq!(tracker.consecutive_failures(), 1);
    }
}
