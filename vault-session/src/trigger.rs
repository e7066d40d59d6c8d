//! Refresh trigger: when to next look at a token or lease.

use std::time::Duration;
use tokio::time::Instant;

/// Added to the refresh timeout to form the valid TTL threshold.
const TTL_THRESHOLD_MARGIN: Duration = Duration::from_secs(2);

/// Refresh a fixed timeout before expiry.
///
/// Leases shorter than the timeout are already inside the danger window and
/// are re-checked almost immediately, never in the past.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTimeoutRefreshTrigger {
    timeout: Duration,
    min_delay: Duration,
}

impl FixedTimeoutRefreshTrigger {
    /// Trigger refreshing `timeout` before expiry.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            min_delay: Duration::from_secs(1),
        }
    }

    /// Upper bound for the immediate re-check delay.
    #[must_use]
    pub const fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Safety margin before expiry.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Next execution for a lease of `lease_duration` obtained at `now`.
    #[must_use]
    pub fn next_execution(&self, lease_duration: Duration, now: Instant) -> Instant {
        match lease_duration.checked_sub(self.timeout) {
            Some(delay) if !delay.is_zero() => now + delay,
            _ => now + self.min_delay.min(lease_duration),
        }
    }

    /// TTL at or below which a renewed token or lease counts as expiring.
    #[must_use]
    pub fn valid_ttl_threshold(&self) -> Duration {
        self.timeout + TTL_THRESHOLD_MARGIN
    }
}

impl Default for FixedTimeoutRefreshTrigger {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedules_timeout_before_expiry() {
        let trigger = FixedTimeoutRefreshTrigger::new(Duration::from_secs(5));
        let now = Instant::now();
        assert_eq!(
            trigger.next_execution(Duration::from_secs(60), now),
            now + Duration::from_secs(55)
        );
    }

    #[test]
    fn test_short_lease_rechecks_immediately() {
        let trigger = FixedTimeoutRefreshTrigger::new(Duration::from_secs(5));
        let now = Instant::now();

        let next = trigger.next_execution(Duration::from_secs(2), now);
        assert!(next >= now);
        assert!(next <= now + Duration::from_secs(1));

        assert_eq!(trigger.next_execution(Duration::from_secs(5), now), now + Duration::from_secs(1));
        assert_eq!(trigger.next_execution(Duration::ZERO, now), now);
    }

    #[test]
    fn test_min_delay_is_configurable() {
        let trigger = FixedTimeoutRefreshTrigger::new(Duration::from_secs(10))
            .with_min_delay(Duration::from_millis(100));
        let now = Instant::now();
        assert_eq!(
            trigger.next_execution(Duration::from_secs(3), now),
            now + Duration::from_millis(100)
        );
    }

    #[test]
    fn test_valid_ttl_threshold() {
        let trigger = FixedTimeoutRefreshTrigger::default();
        assert_eq!(trigger.valid_ttl_threshold(), Duration::from_secs(7));
    }
}
