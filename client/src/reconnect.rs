use std::time::Duration;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// What to do after a connection attempt failed or a live connection dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then make attempt number `attempt`
    Retry { attempt: u32, delay: Duration },
    /// The attempt budget is spent
    GiveUp { attempts: u32 },
}

/// Bounded retries at a fixed interval.
///
/// The budget counts consecutive failures and is restored by [`reset`] once a
/// connection opens.
///
/// [`reset`]: ReconnectPolicy::reset
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    interval: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            attempts: 0,
        }
    }

    pub fn next(&mut self) -> ReconnectDecision {
        if self.attempts >= self.max_attempts {
            return ReconnectDecision::GiveUp {
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: self.interval,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(MAX_RECONNECT_ATTEMPTS, RECONNECT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_gives_up_after_budget() {
        let mut policy = ReconnectPolicy::default();

        for expected in 1..=5 {
            assert_eq!(
                policy.next(),
                ReconnectDecision::Retry {
                    attempt: expected,
                    delay: Duration::from_secs(3)
                }
            );
        }

        assert_eq!(policy.next(), ReconnectDecision::GiveUp { attempts: 5 });
        assert_eq!(policy.next(), ReconnectDecision::GiveUp { attempts: 5 });
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut policy = ReconnectPolicy::new(2, Duration::from_millis(10));
        policy.next();
        policy.next();

        policy.reset();

        assert_eq!(policy.attempts(), 0);
        assert!(matches!(policy.next(), ReconnectDecision::Retry { attempt: 1, .. }));
    }

    #[test]
    fn test_zero_budget_gives_up_immediately() {
        let mut policy = ReconnectPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.next(), ReconnectDecision::GiveUp { attempts: 0 });
    }
}
